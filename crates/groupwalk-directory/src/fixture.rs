//! JSON fixtures describing a directory.
//!
//! ```json
//! {
//!   "objects": [
//!     { "key": "u1", "dn": "CN=Ann,OU=Users,DC=contoso,DC=com", "kind": "user",
//!       "address": "ann@contoso.com", "attributes": { "Department": "Sales" } },
//!     { "key": "g1", "dn": "CN=Team,OU=Groups,DC=contoso,DC=com", "kind": "group",
//!       "members": ["u1"] },
//!     { "key": "d1", "dn": "CN=Sales,OU=Groups,DC=contoso,DC=com", "kind": "dynamic_group",
//!       "filter": "Department -eq 'Sales'", "scope": "OU=Users,DC=contoso,DC=com" }
//!   ],
//!   "faults": { "g1": "unavailable" }
//! }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use groupwalk_domain::routing::normalize_dn;
use groupwalk_domain::{MembershipFilter, ObjectKind};
use serde::Deserialize;
use tracing::info;

use crate::entry::DirectoryEntry;
use crate::error::{DirectoryError, DirectoryResult};
use crate::memory::{Fault, MemoryDirectory};

/// Kind of a fixture object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureKind {
    User,
    #[serde(alias = "static_group")]
    Group,
    DynamicGroup,
}

impl From<FixtureKind> for ObjectKind {
    fn from(kind: FixtureKind) -> Self {
        match kind {
            FixtureKind::User => ObjectKind::User,
            FixtureKind::Group => ObjectKind::StaticGroup,
            FixtureKind::DynamicGroup => ObjectKind::DynamicGroup,
        }
    }
}

/// One object of a fixture.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureObject {
    /// Generated when absent.
    #[serde(default)]
    pub key: Option<String>,
    pub dn: String,
    pub kind: FixtureKind,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Member references (key or DN); static groups only.
    #[serde(default)]
    pub members: Vec<String>,
    /// Recipient filter; dynamic groups only.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// A directory described as data.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    #[serde(default)]
    pub objects: Vec<FixtureObject>,
    /// Faults injected by group key.
    #[serde(default)]
    pub faults: HashMap<String, Fault>,
    /// Keep member references to unknown objects instead of rejecting them.
    #[serde(default)]
    pub allow_dangling: bool,
}

impl Fixture {
    pub fn from_json(json: &str) -> DirectoryResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> DirectoryResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| DirectoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Checks object kinds against their fields and, unless
    /// `allow_dangling` is set, that every member reference resolves.
    pub fn validate(&self) -> DirectoryResult<()> {
        let mut known = HashSet::new();
        for object in &self.objects {
            let name = object.key.as_deref().unwrap_or(&object.dn);
            match object.kind {
                FixtureKind::DynamicGroup if object.filter.is_none() => {
                    return Err(invalid(name, "dynamic group requires a filter"));
                }
                FixtureKind::DynamicGroup | FixtureKind::User if !object.members.is_empty() => {
                    return Err(invalid(name, "only static groups list members"));
                }
                FixtureKind::User | FixtureKind::Group if object.filter.is_some() => {
                    return Err(invalid(name, "only dynamic groups carry a filter"));
                }
                _ => {}
            }
            if let Some(key) = &object.key {
                known.insert(key.to_ascii_lowercase());
            }
            known.insert(normalize_dn(&object.dn));
        }

        if !self.allow_dangling {
            for object in &self.objects {
                for member in &object.members {
                    if !known.contains(&member.to_ascii_lowercase())
                        && !known.contains(&normalize_dn(member))
                    {
                        return Err(DirectoryError::DanglingReference {
                            group: object.key.clone().unwrap_or_else(|| object.dn.clone()),
                            member: member.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Validates the fixture and loads it into a new directory.
    pub fn into_directory(self) -> DirectoryResult<MemoryDirectory> {
        self.validate()?;
        let directory = MemoryDirectory::new();
        for object in self.objects {
            directory.insert(object.into_entry())?;
        }
        for (key, fault) in self.faults {
            directory.inject_fault(&key, fault);
        }
        info!(
            objects = directory.len(),
            domains = directory.domains().len(),
            "Loaded directory fixture"
        );
        Ok(directory)
    }
}

impl FixtureObject {
    fn into_entry(self) -> DirectoryEntry {
        let mut entry = match (self.kind, self.filter) {
            (FixtureKind::DynamicGroup, Some(filter)) => {
                let mut filter = MembershipFilter::new(filter);
                filter.scope_container = self.scope;
                DirectoryEntry::dynamic_group(self.dn, filter)
            }
            (kind, _) => DirectoryEntry::new(self.dn, kind.into()),
        };
        if let Some(key) = self.key {
            entry = entry.with_key(key);
        }
        if let Some(address) = self.address {
            entry = entry.with_address(address);
        }
        for (name, value) in self.attributes {
            entry = entry.with_attribute(&name, value);
        }
        entry.with_members(self.members)
    }
}

fn invalid(key: &str, message: &str) -> DirectoryError {
    DirectoryError::InvalidObject {
        key: key.to_string(),
        message: message.to_string(),
    }
}

impl MemoryDirectory {
    /// Loads a directory from a JSON fixture file.
    pub fn from_fixture_path(path: impl AsRef<Path>) -> DirectoryResult<Self> {
        Fixture::load(path)?.into_directory()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"{
        "objects": [
            { "key": "u1", "dn": "CN=Ann,OU=Users,DC=contoso,DC=com", "kind": "user",
              "attributes": { "Department": "Sales" } },
            { "key": "g1", "dn": "CN=Team,OU=Groups,DC=contoso,DC=com", "kind": "group",
              "members": ["u1", "CN=Sales,OU=Groups,DC=contoso,DC=com"] },
            { "key": "d1", "dn": "CN=Sales,OU=Groups,DC=contoso,DC=com", "kind": "dynamic_group",
              "filter": "Department -eq 'Sales'", "scope": "OU=Users,DC=contoso,DC=com" }
        ],
        "faults": { "g1": "unauthorized" }
    }"#;

    #[test]
    fn test_sample_fixture_loads() {
        let directory = Fixture::from_json(SAMPLE).unwrap().into_directory().unwrap();
        assert_eq!(directory.len(), 3);
        let dynamic = directory.get("d1").unwrap();
        let filter = dynamic.membership_filter.unwrap();
        assert_eq!(filter.scope_container.as_deref(), Some("OU=Users,DC=contoso,DC=com"));
    }

    #[test]
    fn test_missing_key_is_generated() {
        let fixture = Fixture::from_json(
            r#"{ "objects": [ { "dn": "CN=Ann,DC=contoso,DC=com", "kind": "user" } ] }"#,
        )
        .unwrap();
        let directory = fixture.into_directory().unwrap();
        let ann = directory.get("CN=Ann,DC=contoso,DC=com").unwrap();
        assert!(!ann.key.is_empty());
    }

    #[test]
    fn test_dangling_reference_is_rejected() {
        let fixture = Fixture::from_json(
            r#"{ "objects": [ { "key": "g1", "dn": "CN=G,DC=contoso,DC=com", "kind": "group",
                 "members": ["ghost"] } ] }"#,
        )
        .unwrap();
        let err = fixture.clone().into_directory().unwrap_err();
        assert!(matches!(err, DirectoryError::DanglingReference { .. }));

        let lenient = Fixture {
            allow_dangling: true,
            ..fixture
        };
        assert!(lenient.into_directory().is_ok());
    }

    #[test]
    fn test_dynamic_group_without_filter_is_rejected() {
        let fixture = Fixture::from_json(
            r#"{ "objects": [ { "key": "d1", "dn": "CN=D,DC=contoso,DC=com", "kind": "dynamic_group" } ] }"#,
        )
        .unwrap();
        assert!(matches!(
            fixture.validate(),
            Err(DirectoryError::InvalidObject { .. })
        ));
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let fixture = Fixture::from_json(
            r#"{ "objects": [
                { "key": "u1", "dn": "CN=A,DC=contoso,DC=com", "kind": "user" },
                { "key": "U1", "dn": "CN=B,DC=contoso,DC=com", "kind": "user" }
            ] }"#,
        )
        .unwrap();
        assert!(matches!(
            fixture.into_directory(),
            Err(DirectoryError::DuplicateObject { .. })
        ));
    }

    #[test]
    fn test_unknown_field_is_a_parse_error() {
        let err = Fixture::from_json(r#"{ "objects": [], "extra": 1 }"#).unwrap_err();
        assert!(matches!(err, DirectoryError::Parse { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let directory = MemoryDirectory::from_fixture_path(file.path()).unwrap();
        assert_eq!(directory.domains(), vec!["contoso.com"]);
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let err = Fixture::load("/nonexistent/fixture.json").unwrap_err();
        assert!(matches!(err, DirectoryError::Io { .. }));
    }
}
