//! Traversal Integration Tests.
//!
//! These tests run the traversal engine against fixture-loaded in-memory
//! directories, covering the reference scenarios end to end: fixture
//! parsing, routing, filter evaluation and output shaping.
//!
//! Run with: cargo test -p groupwalk-directory --test traversal_integration

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use groupwalk_directory::{Fault, MemoryDirectory};
use groupwalk_domain::{
    collapse_flat, expanded_records, flat_records, Completion, DirectoryClient,
    DirectoryObjectRef, DomainResult, IdentifierPreference, MemberStream, MembershipKind,
    RoutingHint, TraversalConfig, TraversalEngine, TraversalOptions,
};
use groupwalk_domain::resolver::IncompleteReason;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Load a fixture into a shared directory.
fn load(name: &str) -> Arc<MemoryDirectory> {
    Arc::new(MemoryDirectory::from_fixture_path(fixture_path(name)).expect("fixture should load"))
}

fn create_engine(directory: &Arc<MemoryDirectory>) -> TraversalEngine<MemoryDirectory> {
    TraversalEngine::with_config(
        Arc::clone(directory),
        TraversalConfig::default().with_max_concurrency(4),
    )
}

fn member_set(keys: impl IntoIterator<Item = String>) -> BTreeSet<String> {
    keys.into_iter().collect()
}

// ========== Scenario A: Diamond with a Redundant User ==========

#[tokio::test]
async fn test_scenario_a_flat() {
    let directory = load("scenario_a.json");
    let engine = create_engine(&directory);

    let result = engine
        .expand_flat("g1@contoso.com", &TraversalOptions::flat())
        .await
        .unwrap();
    let records = flat_records(&result, IdentifierPreference::Guid);

    assert_eq!(
        member_set(records.iter().map(|r| r.member_key.clone())),
        member_set(["u1".to_string(), "u2".to_string()])
    );
    assert!(records.iter().all(|r| r.root_group == "g1"));
    assert_eq!(directory.calls_for("g2"), 1);
}

#[tokio::test]
async fn test_scenario_a_expanded() {
    let directory = load("scenario_a.json");
    let engine = create_engine(&directory);

    let result = engine
        .expand_levels("CN=G1,OU=Groups,DC=contoso,DC=com", &TraversalOptions::expanded())
        .await
        .unwrap();
    let rows: Vec<_> = expanded_records(&result, IdentifierPreference::Guid)
        .into_iter()
        .map(|r| (r.parent_group, r.member_key, r.level, r.membership_kind))
        .collect();

    assert_eq!(
        rows,
        vec![
            ("g1".to_string(), "g2".to_string(), 1, MembershipKind::Direct),
            ("g1".to_string(), "u1".to_string(), 1, MembershipKind::Direct),
            ("g2".to_string(), "u1".to_string(), 2, MembershipKind::RedundantlyNested),
            ("g2".to_string(), "u2".to_string(), 2, MembershipKind::Nested),
        ]
    );
}

#[tokio::test]
async fn test_scenario_a_collapsed_by_address() {
    let directory = load("scenario_a.json");
    let engine = create_engine(&directory);

    let result = engine
        .expand_flat("g1", &TraversalOptions::flat())
        .await
        .unwrap();
    let collapsed = collapse_flat(&flat_records(&result, IdentifierPreference::PrimaryAddress));

    assert_eq!(collapsed.len(), 1);
    assert_eq!(collapsed[0].root_group, "g1@contoso.com");
    assert_eq!(collapsed[0].member_keys, "u1@contoso.com;u2@contoso.com");
    assert_eq!(collapsed[0].member_count, 2);
}

// ========== Scenario B: Self-Membership ==========

#[tokio::test]
async fn test_scenario_b_terminates_without_self_edge() {
    let directory = load("scenario_b.json");
    let engine = create_engine(&directory);

    let flat = engine
        .expand_flat("g3", &TraversalOptions::flat())
        .await
        .unwrap();
    assert_eq!(flat.members.len(), 1);
    assert_eq!(flat.members[0].member.key, "u1");

    let expanded = engine
        .expand_levels("g3", &TraversalOptions::expanded())
        .await
        .unwrap();
    assert!(expanded
        .edges
        .iter()
        .all(|e| e.parent_group.key != e.member.key));
    assert_eq!(expanded.edges.len(), 1);
    // One listing per traversal.
    assert_eq!(directory.calls_for("g3"), 2);
}

// ========== Scenario C: Depth Bound ==========

#[tokio::test]
async fn test_scenario_c_depth_bound_and_resume() {
    let directory = load("scenario_c.json");
    let engine = create_engine(&directory);

    let options = TraversalOptions::expanded().with_levels_deep_to_go(3);
    let first = engine.expand_levels("c1", &options).await.unwrap();

    assert!(first.completion.is_complete());
    assert!(first.edges.iter().all(|e| e.level <= 3));
    assert_eq!(first.resume_level, Some(4));
    assert_eq!(first.unexpanded_frontier.len(), 1);

    // Resume from the frontier with the recorded level.
    let frontier = &first.unexpanded_frontier[0];
    let resume = TraversalOptions::expanded()
        .with_starting_level(first.resume_level.unwrap())
        .with_levels_deep_to_go(10);
    let rest = engine.expand_levels(&frontier.key, &resume).await.unwrap();

    let levels: BTreeSet<u32> = rest.edges.iter().map(|e| e.level).collect();
    assert_eq!(levels, BTreeSet::from([4, 5]));
    let users: BTreeSet<String> = first
        .edges
        .iter()
        .chain(rest.edges.iter())
        .filter(|e| !e.member.is_group())
        .map(|e| e.member.key.clone())
        .collect();
    assert_eq!(users.len(), 5);
}

// ========== Scenario D: Dynamic Group ==========

#[tokio::test]
async fn test_scenario_d_dynamic_members_expand_like_direct_members() {
    let directory = load("scenario_d.json");
    let engine = create_engine(&directory);

    let result = engine
        .expand_flat("sales-dyn", &TraversalOptions::flat())
        .await
        .unwrap();

    assert_eq!(
        member_set(result.members.iter().map(|m| m.member.key.clone())),
        member_set(["alice".to_string(), "bob".to_string(), "carol".to_string()])
    );
    assert_eq!(directory.calls_for("sales-partners"), 1);

    let expanded = engine
        .expand_levels("sales-dyn", &TraversalOptions::expanded())
        .await
        .unwrap();
    let direct: BTreeSet<&str> = expanded
        .edges
        .iter()
        .filter(|e| e.kind == MembershipKind::Direct)
        .map(|e| e.member.key.as_str())
        .collect();
    assert_eq!(direct, BTreeSet::from(["alice", "bob", "sales-partners"]));
}

// ========== Multi-Domain Forest ==========

#[tokio::test]
async fn test_forest_traversal_routes_each_domain() {
    let directory = load("forest.json");
    let engine = create_engine(&directory);

    let result = engine
        .expand_flat("root-admins", &TraversalOptions::flat())
        .await
        .unwrap();

    assert!(result.completion.is_complete());
    assert!(result.skipped.is_empty());
    assert_eq!(
        member_set(result.members.iter().map(|m| m.member.key.clone())),
        member_set(["u-root".to_string(), "u-emea".to_string(), "u-apac".to_string()])
    );
    assert_eq!(result.stats.cycles_detected, 1);
}

/// Client that sends every query to one fixed domain, ignoring the hint.
struct MisroutingClient {
    inner: Arc<MemoryDirectory>,
    hint: RoutingHint,
}

#[async_trait]
impl DirectoryClient for MisroutingClient {
    async fn resolve_group(&self, identifier: &str) -> DomainResult<DirectoryObjectRef> {
        self.inner.resolve_group(identifier).await
    }

    async fn list_direct_members(
        &self,
        group: &DirectoryObjectRef,
        _hint: &RoutingHint,
    ) -> DomainResult<MemberStream> {
        self.inner.list_direct_members(group, &self.hint).await
    }

    async fn evaluate_dynamic_membership(
        &self,
        filter: &str,
        scope_container: &str,
        _hint: &RoutingHint,
    ) -> DomainResult<MemberStream> {
        self.inner
            .evaluate_dynamic_membership(filter, scope_container, &self.hint)
            .await
    }
}

#[tokio::test]
async fn test_forest_without_routing_skips_foreign_partitions() {
    let directory = load("forest.json");
    let client = Arc::new(MisroutingClient {
        inner: Arc::clone(&directory),
        hint: groupwalk_domain::route_for("DC=contoso,DC=com").unwrap(),
    });
    let engine = TraversalEngine::new(client);

    let result = engine
        .expand_flat("root-admins", &TraversalOptions::flat())
        .await
        .unwrap();

    // Child-domain groups are not held by the root partition.
    let skipped: BTreeSet<&str> = result.skipped.iter().map(|s| s.group.key.as_str()).collect();
    assert_eq!(skipped, BTreeSet::from(["apac-admins", "emea-admins"]));
    assert_eq!(
        member_set(result.members.iter().map(|m| m.member.key.clone())),
        member_set(["u-root".to_string()])
    );
}

// ========== Failure Injection ==========

#[tokio::test]
async fn test_unavailable_child_domain_halts_traversal() {
    let directory = load("forest.json");
    directory.inject_fault("emea-admins", Fault::Unavailable);
    let engine = TraversalEngine::with_config(
        Arc::clone(&directory),
        TraversalConfig::default().with_max_concurrency(1),
    );

    let result = engine
        .expand_flat("root-admins", &TraversalOptions::flat())
        .await
        .unwrap();

    match &result.completion {
        Completion::Incomplete {
            reason: IncompleteReason::Failed { group, .. },
            pending,
        } => {
            assert_eq!(group.key, "emea-admins");
            assert!(pending.iter().any(|p| p.group.key == "emea-admins"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(result.members.iter().any(|m| m.member.key == "u-root"));
}

#[tokio::test]
async fn test_batch_of_roots_reports_each_outcome() {
    let directory = load("scenario_a.json");
    let engine = create_engine(&directory);

    let results = engine
        .traverse_batch(&["g1", "g2", "no-such-group"], &TraversalOptions::flat())
        .await;

    let mut records = Vec::new();
    for (_, outcome) in &results[..2] {
        let flat = outcome.as_ref().unwrap().as_flat().unwrap();
        records.extend(flat_records(flat, IdentifierPreference::Guid));
    }
    let collapsed = collapse_flat(&records);
    assert_eq!(collapsed.len(), 2);
    assert_eq!(collapsed[0].member_keys, "u1;u2");
    assert_eq!(collapsed[1].member_keys, "u1;u2");
    assert!(results[2].1.is_err());
}
