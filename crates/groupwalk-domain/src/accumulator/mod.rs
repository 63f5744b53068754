//! Output record shaping.
//!
//! Turns traversal results into the flat records consumed by exporters.
//! Performs no directory I/O.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{DirectoryObjectRef, MembershipKind, ObjectKind};
use crate::resolver::{ExpandedResult, FlatResult};

/// Which identifier to print for directory objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierPreference {
    /// Stable object key (objectGUID).
    #[default]
    Guid,
    DistinguishedName,
    /// Primary address, falling back to the distinguished name.
    PrimaryAddress,
}

impl IdentifierPreference {
    pub fn identify<'a>(&self, object: &'a DirectoryObjectRef) -> &'a str {
        match self {
            IdentifierPreference::Guid => &object.key,
            IdentifierPreference::DistinguishedName => &object.distinguished_name,
            IdentifierPreference::PrimaryAddress => object.display_identifier(),
        }
    }
}

impl FromStr for IdentifierPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "guid" | "key" => Ok(IdentifierPreference::Guid),
            "dn" | "distinguished_name" | "distinguishedname" => {
                Ok(IdentifierPreference::DistinguishedName)
            }
            "address" | "primary_address" | "primaryaddress" | "mail" => {
                Ok(IdentifierPreference::PrimaryAddress)
            }
            other => Err(format!(
                "unknown identifier preference '{other}' (expected guid, dn or address)"
            )),
        }
    }
}

/// One user reached from a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatRecord {
    pub root_group: String,
    pub member_key: String,
    pub member_type: ObjectKind,
}

/// All users of one root collapsed into a single record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollapsedRecord {
    pub root_group: String,
    /// Sorted, deduplicated, `;`-separated member identifiers.
    pub member_keys: String,
    pub member_count: usize,
}

/// One parent → member edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpandedRecord {
    pub parent_group: String,
    pub member_key: String,
    pub member_type: ObjectKind,
    pub level: u32,
    pub membership_kind: MembershipKind,
}

/// Flat records for one root, in discovery order, one per distinct member.
pub fn flat_records(result: &FlatResult, preference: IdentifierPreference) -> Vec<FlatRecord> {
    let root_group = preference.identify(&result.root).to_string();
    let mut seen = HashSet::new();
    result
        .members
        .iter()
        .filter(|m| seen.insert(m.member.key.as_str()))
        .map(|m| FlatRecord {
            root_group: root_group.clone(),
            member_key: preference.identify(&m.member).to_string(),
            member_type: m.member.kind,
        })
        .collect()
}

/// Compresses flat records into one record per root.
///
/// Roots keep the order in which they first appear.
pub fn collapse_flat(records: &[FlatRecord]) -> Vec<CollapsedRecord> {
    let mut order = Vec::new();
    let mut by_root: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for record in records {
        let members = by_root.entry(record.root_group.as_str()).or_insert_with(|| {
            order.push(record.root_group.as_str());
            BTreeSet::new()
        });
        members.insert(record.member_key.as_str());
    }

    order
        .into_iter()
        .filter_map(|root| {
            by_root.get(root).map(|members| CollapsedRecord {
                root_group: root.to_string(),
                member_keys: members.iter().copied().collect::<Vec<_>>().join(";"),
                member_count: members.len(),
            })
        })
        .collect()
}

/// Expanded records sorted by level, then parent, then member.
pub fn expanded_records(
    result: &ExpandedResult,
    preference: IdentifierPreference,
) -> Vec<ExpandedRecord> {
    let mut records: Vec<ExpandedRecord> = result
        .edges
        .iter()
        .map(|edge| ExpandedRecord {
            parent_group: preference.identify(&edge.parent_group).to_string(),
            member_key: preference.identify(&edge.member).to_string(),
            member_type: edge.member.kind,
            level: edge.level,
            membership_kind: edge.kind,
        })
        .collect();
    records.sort_by(|a, b| {
        a.level
            .cmp(&b.level)
            .then_with(|| a.parent_group.cmp(&b.parent_group))
            .then_with(|| a.member_key.cmp(&b.member_key))
    });
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MembershipEdge;
    use crate::resolver::{Completion, FlatMember, TraversalStatsSnapshot};

    fn group(key: &str) -> DirectoryObjectRef {
        DirectoryObjectRef::group(key, format!("CN={key},OU=Groups,DC=contoso,DC=com"))
    }

    fn user(key: &str) -> DirectoryObjectRef {
        DirectoryObjectRef::user(key, format!("CN={key},OU=Users,DC=contoso,DC=com"))
            .with_address(format!("{key}@contoso.com"))
    }

    fn flat_result(root: &str, users: &[&str]) -> FlatResult {
        let root = group(root);
        FlatResult {
            members: users
                .iter()
                .map(|u| FlatMember {
                    member: user(u),
                    path: vec![root.clone()],
                    level: 1,
                })
                .collect(),
            root,
            depth_limit_reached: false,
            completion: Completion::Complete,
            skipped: vec![],
            stats: TraversalStatsSnapshot::default(),
        }
    }

    fn edge(parent: &str, member: DirectoryObjectRef, level: u32, kind: MembershipKind) -> MembershipEdge {
        MembershipEdge {
            parent_group: group(parent),
            member,
            level,
            kind,
        }
    }

    #[test]
    fn test_flat_records_use_preferred_identifier() {
        let result = flat_result("g1", &["u1", "u2"]);

        let by_guid = flat_records(&result, IdentifierPreference::Guid);
        assert_eq!(by_guid[0].root_group, "g1");
        assert_eq!(by_guid[0].member_key, "u1");
        assert_eq!(by_guid[0].member_type, ObjectKind::User);

        let by_dn = flat_records(&result, IdentifierPreference::DistinguishedName);
        assert_eq!(by_dn[1].member_key, "CN=u2,OU=Users,DC=contoso,DC=com");

        let by_address = flat_records(&result, IdentifierPreference::PrimaryAddress);
        assert_eq!(by_address[1].member_key, "u2@contoso.com");
        // Groups without an address fall back to their DN.
        assert_eq!(by_address[1].root_group, "CN=g1,OU=Groups,DC=contoso,DC=com");
    }

    #[test]
    fn test_flat_records_are_deduplicated_per_root() {
        let result = flat_result("g1", &["u1", "u1", "u2"]);
        let records = flat_records(&result, IdentifierPreference::Guid);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_collapse_joins_sorted_unique_members_per_root() {
        let mut records = flat_records(&flat_result("g1", &["u3", "u1"]), IdentifierPreference::Guid);
        records.extend(flat_records(&flat_result("g0", &["u9"]), IdentifierPreference::Guid));
        records.extend(flat_records(&flat_result("g1", &["u1", "u2"]), IdentifierPreference::Guid));

        let collapsed = collapse_flat(&records);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].root_group, "g1");
        assert_eq!(collapsed[0].member_keys, "u1;u2;u3");
        assert_eq!(collapsed[0].member_count, 3);
        assert_eq!(collapsed[1].root_group, "g0");
        assert_eq!(collapsed[1].member_keys, "u9");
    }

    #[test]
    fn test_collapse_of_nothing_is_empty() {
        assert!(collapse_flat(&[]).is_empty());
    }

    #[test]
    fn test_expanded_records_sorted_by_level_parent_member() {
        let result = ExpandedResult {
            root: group("g1"),
            edges: vec![
                edge("g2", user("u2"), 2, MembershipKind::Nested),
                edge("g1", user("u1"), 1, MembershipKind::Direct),
                edge("g2", user("u1"), 2, MembershipKind::RedundantlyNested),
                edge("g1", group("g2"), 1, MembershipKind::Direct),
            ],
            unexpanded_frontier: vec![],
            resume_level: None,
            completion: Completion::Complete,
            skipped: vec![],
            stats: TraversalStatsSnapshot::default(),
        };

        let records = expanded_records(&result, IdentifierPreference::Guid);
        let rows: Vec<_> = records
            .iter()
            .map(|r| (r.parent_group.as_str(), r.member_key.as_str(), r.level, r.membership_kind))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("g1", "g2", 1, MembershipKind::Direct),
                ("g1", "u1", 1, MembershipKind::Direct),
                ("g2", "u1", 2, MembershipKind::RedundantlyNested),
                ("g2", "u2", 2, MembershipKind::Nested),
            ]
        );
        assert_eq!(records[0].member_type, ObjectKind::StaticGroup);
    }

    #[test]
    fn test_identifier_preference_parsing() {
        assert_eq!("GUID".parse::<IdentifierPreference>(), Ok(IdentifierPreference::Guid));
        assert_eq!(
            "dn".parse::<IdentifierPreference>(),
            Ok(IdentifierPreference::DistinguishedName)
        );
        assert_eq!(
            "address".parse::<IdentifierPreference>(),
            Ok(IdentifierPreference::PrimaryAddress)
        );
        assert!("sid".parse::<IdentifierPreference>().is_err());
    }
}
