//! Deployment environments and their recorded state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::descriptor::{string_map, string_map_list};
use crate::error::{Result, StagehandError};
use crate::substitute::expand_placeholders;
use crate::tokens::TokenTable;

/// Promotion stage of an environment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Dev,
    Int,
    Stg,
    Prod,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Dev => "dev",
            Stage::Int => "int",
            Stage::Stg => "stg",
            Stage::Prod => "prod",
        }
    }
}

/// Environment identity, `<stage>-<partition>` (e.g. `prod-1a`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvironmentName {
    pub stage: Stage,
    pub partition: String,
}

impl EnvironmentName {
    /// Upper-cased form used in tag names, e.g. `PROD-1A`.
    pub fn tag_suffix(&self) -> String {
        self.to_string().to_uppercase()
    }
}

impl FromStr for EnvironmentName {
    type Err = StagehandError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || StagehandError::InvalidEnvironmentName(s.to_string());
        let (stage, partition) = s.split_once('-').ok_or_else(invalid)?;
        let stage = match stage {
            "dev" => Stage::Dev,
            "int" => Stage::Int,
            "stg" => Stage::Stg,
            "prod" => Stage::Prod,
            _ => return Err(invalid()),
        };
        if partition.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            stage,
            partition: partition.to_string(),
        })
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.stage.as_str(), self.partition)
    }
}

/// An environment as declared in the project descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentSpec {
    pub name: String,

    /// Tag whose release this environment deploys (e.g. `LAST_ASSEMBLED`).
    #[serde(default)]
    pub deploy_tag: Option<String>,

    /// Single-entry maps of package role to `<artifact>-<version>`.
    #[serde(default, deserialize_with = "string_map_list")]
    pub packages: Vec<BTreeMap<String, String>>,

    #[serde(default, deserialize_with = "string_map")]
    pub env_variables: BTreeMap<String, String>,
}

impl EnvironmentSpec {
    pub fn environment_name(&self) -> Result<EnvironmentName> {
        self.name.parse()
    }
}

/// Per-environment record written on assemble and read back on deploy/test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentState {
    pub release_version: String,
    pub git_revision: String,

    #[serde(default, deserialize_with = "string_map_list")]
    pub packages: Vec<BTreeMap<String, String>>,

    #[serde(default, deserialize_with = "string_map")]
    pub env_variables: BTreeMap<String, String>,
}

impl EnvironmentState {
    pub fn from_spec(spec: &EnvironmentSpec, release_version: &str, git_revision: &str) -> Self {
        Self {
            release_version: release_version.to_string(),
            git_revision: git_revision.to_string(),
            packages: spec.packages.clone(),
            env_variables: spec.env_variables.clone(),
        }
    }

    /// Expand `[TOKEN]` placeholders in package and variable values, e.g.
    /// `main: demo_app-[PACKAGE_VERSION]`.
    pub fn expand_tokens(&mut self, tokens: &TokenTable) {
        for entry in &mut self.packages {
            for value in entry.values_mut() {
                *value = expand_placeholders(value, tokens);
            }
        }
        for value in self.env_variables.values_mut() {
            *value = expand_placeholders(value, tokens);
        }
    }

    /// Value declared for package role `role` (first match wins).
    pub fn package(&self, role: &str) -> Result<&str> {
        self.packages
            .iter()
            .find_map(|entry| entry.get(role))
            .map(String::as_str)
            .ok_or_else(|| StagehandError::MissingPackage(role.to_string()))
    }

    /// Version of the `main` package: the text after its last `-`.
    pub fn main_package_version(&self) -> Result<String> {
        let main = self.package("main")?;
        main.rsplit('-')
            .next()
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StagehandError::InvalidVersion(main.to_string()))
    }
}
