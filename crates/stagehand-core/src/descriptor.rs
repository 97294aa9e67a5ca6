//! Project descriptor (`config.yml`).
//!
//! ```yaml
//! build_tokens:
//!   DOMAIN: diy
//!   PROJECT: demo_app
//!   RELEASE: "1.0"
//!   PROJECT_TYPE: maven_jar_app
//!   MAVEN_GROUP_ID: org.example
//!   MAVEN_ARTIFACT_ID: demo_app
//! envs:
//!   - name: dev-1
//!     deploy_tag: LAST_ASSEMBLED
//!     packages:
//!       - main: demo_app-1.0.5
//!     env_variables:
//!       PORT: 8080
//! substitute_files:
//!   - name: src/main/resources/app.properties
//!     env_tokens: [DB_PASSWORD]
//!   - pattern: src/*.xml
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use stagehand_store::scalar_to_string;

use crate::environment::EnvironmentSpec;
use crate::error::{Result, StagehandError};
use crate::tokens::{self, TokenTable};

/// A file (or set of files) whose `[TOKEN]` placeholders are replaced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubstitutionRule {
    /// A single file, relative to the project work dir.
    #[serde(default)]
    pub name: Option<String>,

    /// `dir/glob` or a bare glob searched from the work dir.
    #[serde(default)]
    pub pattern: Option<String>,

    /// Process environment variables exposed as extra tokens.
    #[serde(default)]
    pub env_tokens: Vec<String>,
}

/// Parsed project descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectDescriptor {
    #[serde(deserialize_with = "string_map")]
    pub build_tokens: BTreeMap<String, String>,

    #[serde(default)]
    pub envs: Option<Vec<EnvironmentSpec>>,

    #[serde(default)]
    pub substitute_files: Option<Vec<SubstitutionRule>>,

    /// Shell commands per task, used by the generic project type.
    #[serde(default)]
    pub commands: BTreeMap<String, Vec<String>>,
}

impl ProjectDescriptor {
    /// Load a descriptor file. A missing file is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(StagehandError::MissingFile(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Fresh token table seeded from `build_tokens`.
    pub fn tokens(&self) -> TokenTable {
        self.build_tokens
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn token(&self, name: &str) -> Result<&str> {
        self.build_tokens
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| StagehandError::MissingToken(name.to_string()))
    }

    pub fn domain(&self) -> Result<&str> {
        self.token(tokens::DOMAIN)
    }

    pub fn project(&self) -> Result<&str> {
        self.token(tokens::PROJECT)
    }

    pub fn release(&self) -> Result<&str> {
        self.token(tokens::RELEASE)
    }

    pub fn project_type(&self) -> Result<&str> {
        self.token(tokens::PROJECT_TYPE)
    }

    pub fn environments(&self) -> Result<&[EnvironmentSpec]> {
        self.envs
            .as_deref()
            .ok_or_else(|| StagehandError::MissingKey("envs".to_string()))
    }

    pub fn environment(&self, name: &str) -> Result<&EnvironmentSpec> {
        self.environments()?
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| StagehandError::UnknownEnvironment(name.to_string()))
    }

    /// Tag naming the release `env` may deploy.
    pub fn deploy_tag(&self, env: &str) -> Result<&str> {
        self.environment(env)?
            .deploy_tag
            .as_deref()
            .ok_or_else(|| StagehandError::MissingKey("deploy_tag".to_string()))
    }

    pub fn substitution_rules(&self) -> Result<&[SubstitutionRule]> {
        self.substitute_files
            .as_deref()
            .ok_or_else(|| StagehandError::MissingKey("substitute_files".to_string()))
    }

    pub fn commands_for(&self, task: &str) -> &[String] {
        self.commands.get(task).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Deserialize a mapping whose scalar values may be written unquoted
/// (`RELEASE: 1.0`, `PORT: 8080`) into strings.
pub(crate) fn string_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    stringify(raw)
}

/// As [`string_map`], for a list of mappings.
pub(crate) fn string_map_list<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?;
    raw.into_iter().map(stringify).collect()
}

fn stringify<E: serde::de::Error>(
    raw: BTreeMap<String, serde_yaml::Value>,
) -> std::result::Result<BTreeMap<String, String>, E> {
    raw.into_iter()
        .map(|(k, v)| match scalar_to_string(&v) {
            Some(s) => Ok((k, s)),
            None => Err(E::custom(format!("value of '{k}' must be a scalar"))),
        })
        .collect()
}
