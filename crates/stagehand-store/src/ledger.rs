//! Release history ledger schema (`meta/relhist.yml`).
//!
//! An insertion-ordered YAML mapping from release version to the shared
//! store revision captured when that version was recorded:
//!
//! ```yaml
//! 1.0.0: 3f2a...
//! 1.0.1: 9c41...
//! ```
//!
//! The ledger is append-only. Its last entry drives the next allocation, so
//! the on-disk key order is part of the contract and is preserved on load
//! and save.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::StoreError;

/// One recorded release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub version: String,
    pub revision: String,
}

/// Append-only, insertion-ordered release history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseLedger {
    entries: Vec<LedgerEntry>,
}

impl ReleaseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Most recently inserted entry.
    pub fn last(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn revision_of(&self, version: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.version == version)
            .map(|e| e.revision.as_str())
    }

    /// Append a release. Versions are unique; re-recording one is an error.
    pub fn append(
        &mut self,
        version: impl Into<String>,
        revision: impl Into<String>,
    ) -> Result<(), StoreError> {
        let version = version.into();
        if self.revision_of(&version).is_some() {
            return Err(StoreError::InvalidLedger(format!(
                "release {version} is already recorded"
            )));
        }
        self.entries.push(LedgerEntry {
            version,
            revision: revision.into(),
        });
        Ok(())
    }
}

impl Serialize for ReleaseLedger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.version, &entry.revision)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ReleaseLedger {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(LedgerVisitor)
    }
}

struct LedgerVisitor;

impl<'de> Visitor<'de> for LedgerVisitor {
    type Value = ReleaseLedger;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping of release version to revision")
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(ReleaseLedger::new())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        use serde::de::Error;

        let mut ledger = ReleaseLedger::new();
        while let Some((key, value)) =
            access.next_entry::<serde_yaml::Value, serde_yaml::Value>()?
        {
            let version = scalar_to_string(&key)
                .ok_or_else(|| A::Error::custom("release version must be a scalar"))?;
            let revision = scalar_to_string(&value)
                .ok_or_else(|| A::Error::custom("revision must be a scalar"))?;
            ledger.append(version, revision).map_err(A::Error::custom)?;
        }
        Ok(ledger)
    }
}

/// Render a YAML scalar as the string it was written as.
///
/// Unquoted values such as `1.0` or an all-digit revision are parsed as
/// numbers by YAML; they are still strings to us.
pub fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order_through_yaml() {
        let mut ledger = ReleaseLedger::new();
        ledger.append("1.0.2", "ccc").unwrap();
        ledger.append("1.0.10", "aaa").unwrap();
        ledger.append("1.0.3", "bbb").unwrap();

        let yaml = serde_yaml::to_string(&ledger).unwrap();
        let loaded: ReleaseLedger = serde_yaml::from_str(&yaml).unwrap();

        let versions: Vec<&str> = loaded.entries().iter().map(|e| e.version.as_str()).collect();
        assert_eq!(versions, vec!["1.0.2", "1.0.10", "1.0.3"]);
        assert_eq!(loaded.last().unwrap().revision, "bbb");
    }

    #[test]
    fn loads_unquoted_numeric_revisions() {
        let loaded: ReleaseLedger = serde_yaml::from_str("1.0.0: 1234567\n").unwrap();
        assert_eq!(loaded.revision_of("1.0.0"), Some("1234567"));
    }

    #[test]
    fn duplicate_versions_are_rejected() {
        let mut ledger = ReleaseLedger::new();
        ledger.append("1.0.0", "aaa").unwrap();
        let err = ledger.append("1.0.0", "bbb").unwrap_err();
        assert!(err.to_string().contains("already recorded"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn empty_mapping_is_an_empty_ledger() {
        let loaded: ReleaseLedger = serde_yaml::from_str("{}").unwrap();
        assert!(loaded.is_empty());
        assert!(loaded.last().is_none());
    }
}
