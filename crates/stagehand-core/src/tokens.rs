//! Build tokens: the named string values every command is parameterised by.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{Result, StagehandError};

pub const DOMAIN: &str = "DOMAIN";
pub const PROJECT: &str = "PROJECT";
pub const RELEASE: &str = "RELEASE";
pub const PROJECT_TYPE: &str = "PROJECT_TYPE";
pub const TASK: &str = "TASK";
pub const ENVIRONMENT: &str = "ENVIRONMENT";
pub const PACKAGE_VERSION: &str = "PACKAGE_VERSION";
pub const RELEASE_VERSION: &str = "RELEASE_VERSION";
pub const GIT_REVISION: &str = "GIT_REVISION";
pub const MAVEN_GROUP_ID: &str = "MAVEN_GROUP_ID";
pub const MAVEN_ARTIFACT_ID: &str = "MAVEN_ARTIFACT_ID";

/// Mapping from token name to value, shared across the steps of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenTable {
    tokens: BTreeMap<String, String>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a required token.
    pub fn get(&self, name: &str) -> Result<&str> {
        self.tokens
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| StagehandError::MissingToken(name.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.tokens.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tokens.contains_key(name)
    }

    /// Set a token, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        debug!(token = %name, value = %value, "build token");
        self.tokens.insert(name, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tokens.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl FromIterator<(String, String)> for TokenTable {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_is_an_error() {
        let tokens = TokenTable::new();
        let err = tokens.get(PACKAGE_VERSION).unwrap_err();
        assert!(matches!(err, StagehandError::MissingToken(name) if name == PACKAGE_VERSION));
    }

    #[test]
    fn insert_overwrites() {
        let mut tokens = TokenTable::new();
        tokens.insert(MAVEN_ARTIFACT_ID, "demo");
        tokens.insert(MAVEN_ARTIFACT_ID, "demo_dev");
        assert_eq!(tokens.get(MAVEN_ARTIFACT_ID).unwrap(), "demo_dev");
        assert_eq!(tokens.len(), 1);
    }
}
