//! Core type definitions for directory objects and membership edges.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Kind of a directory object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    User,
    StaticGroup,
    /// Group whose membership is computed from a stored recipient filter.
    DynamicGroup,
}

impl ObjectKind {
    /// Returns true for static and dynamic groups.
    pub fn is_group(self) -> bool {
        matches!(self, ObjectKind::StaticGroup | ObjectKind::DynamicGroup)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::User => "User",
            ObjectKind::StaticGroup => "StaticGroup",
            ObjectKind::DynamicGroup => "DynamicGroup",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored filter of a dynamic group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipFilter {
    /// Recipient filter expression (e.g. `Department -eq 'Sales'`).
    pub filter: String,
    /// Container the filter is applied to. When absent the group's own
    /// domain naming context is used.
    pub scope_container: Option<String>,
}

impl MembershipFilter {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            scope_container: None,
        }
    }

    pub fn with_scope(mut self, scope_container: impl Into<String>) -> Self {
        self.scope_container = Some(scope_container.into());
        self
    }
}

/// A resolved directory object.
///
/// Equality and hashing only consider `key`: two references to the same
/// object obtained from different partitions compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryObjectRef {
    /// Stable unique key (objectGUID or equivalent).
    pub key: String,
    /// Distinguished name, used for domain routing.
    pub distinguished_name: String,
    /// Primary SMTP address, when the object is mail-enabled.
    pub primary_address: Option<String>,
    pub kind: ObjectKind,
    /// Present for dynamic groups.
    pub membership_filter: Option<MembershipFilter>,
}

impl DirectoryObjectRef {
    pub fn new(
        key: impl Into<String>,
        distinguished_name: impl Into<String>,
        kind: ObjectKind,
    ) -> Self {
        Self {
            key: key.into(),
            distinguished_name: distinguished_name.into(),
            primary_address: None,
            kind,
            membership_filter: None,
        }
    }

    pub fn user(key: impl Into<String>, distinguished_name: impl Into<String>) -> Self {
        Self::new(key, distinguished_name, ObjectKind::User)
    }

    pub fn group(key: impl Into<String>, distinguished_name: impl Into<String>) -> Self {
        Self::new(key, distinguished_name, ObjectKind::StaticGroup)
    }

    pub fn dynamic_group(
        key: impl Into<String>,
        distinguished_name: impl Into<String>,
        filter: MembershipFilter,
    ) -> Self {
        Self {
            membership_filter: Some(filter),
            ..Self::new(key, distinguished_name, ObjectKind::DynamicGroup)
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.primary_address = Some(address.into());
        self
    }

    pub fn is_group(&self) -> bool {
        self.kind.is_group()
    }

    /// Address if mail-enabled, otherwise the distinguished name.
    pub fn display_identifier(&self) -> &str {
        self.primary_address
            .as_deref()
            .unwrap_or(&self.distinguished_name)
    }
}

impl PartialEq for DirectoryObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for DirectoryObjectRef {}

impl Hash for DirectoryObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for DirectoryObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.distinguished_name, self.key)
    }
}

/// Classification of a discovered parent → member relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MembershipKind {
    /// Member of the root (level 1).
    Direct,
    /// Member of a nested group, first time the member is seen.
    Nested,
    /// Member already recorded through another path.
    RedundantlyNested,
}

impl MembershipKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MembershipKind::Direct => "Direct",
            MembershipKind::Nested => "Nested",
            MembershipKind::RedundantlyNested => "RedundantlyNested",
        }
    }
}

impl fmt::Display for MembershipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered parent → member relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEdge {
    pub parent_group: DirectoryObjectRef,
    pub member: DirectoryObjectRef,
    pub level: u32,
    pub kind: MembershipKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refs_compare_by_key_only() {
        let a = DirectoryObjectRef::user("guid-1", "CN=Alice,DC=contoso,DC=com");
        let b = DirectoryObjectRef::user("guid-1", "CN=alice,OU=Moved,DC=contoso,DC=com");
        let c = DirectoryObjectRef::user("guid-2", "CN=Alice,DC=contoso,DC=com");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_display_identifier_prefers_address() {
        let plain = DirectoryObjectRef::group("g", "CN=Sales,DC=contoso,DC=com");
        assert_eq!(plain.display_identifier(), "CN=Sales,DC=contoso,DC=com");

        let mail = plain.with_address("sales@contoso.com");
        assert_eq!(mail.display_identifier(), "sales@contoso.com");
    }

    #[test]
    fn test_kind_group_classification() {
        assert!(!ObjectKind::User.is_group());
        assert!(ObjectKind::StaticGroup.is_group());
        assert!(ObjectKind::DynamicGroup.is_group());
    }

    #[test]
    fn test_dynamic_group_carries_filter() {
        let g = DirectoryObjectRef::dynamic_group(
            "d",
            "CN=AllSales,DC=contoso,DC=com",
            MembershipFilter::new("Department -eq 'Sales'").with_scope("OU=Staff,DC=contoso,DC=com"),
        );
        assert_eq!(g.kind, ObjectKind::DynamicGroup);
        let filter = g.membership_filter.as_ref().unwrap();
        assert_eq!(filter.scope_container.as_deref(), Some("OU=Staff,DC=contoso,DC=com"));
    }

    #[test]
    fn test_kinds_serialize_as_names() {
        assert_eq!(
            serde_json::to_string(&MembershipKind::RedundantlyNested).unwrap(),
            "\"RedundantlyNested\""
        );
        assert_eq!(serde_json::to_string(&ObjectKind::DynamicGroup).unwrap(), "\"DynamicGroup\"");
    }
}
