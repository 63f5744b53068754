//! Property-based tests for domain routing.

use proptest::prelude::*;

use super::{is_within_container, route_for};

/// Strategy for DNS-style labels.
fn label_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,10}"
}

/// Strategy for leading RDNs (CN/OU) that never look like domain components.
fn rdn_strategy() -> impl Strategy<Value = String> {
    (prop_oneof!["CN", "OU"], "[A-Za-z][A-Za-z0-9 ]{0,12}")
        .prop_map(|(ty, value)| format!("{ty}={}", value.trim_end()))
}

proptest! {
    #[test]
    fn test_route_joins_dc_labels(
        rdns in prop::collection::vec(rdn_strategy(), 0..4),
        labels in prop::collection::vec(label_strategy(), 1..5),
    ) {
        let mut components = rdns.clone();
        components.extend(labels.iter().map(|l| format!("DC={l}")));
        let dn = components.join(",");

        let hint = route_for(&dn);
        prop_assert!(hint.is_ok(), "failed for {}", dn);
        let hint = hint.unwrap();
        prop_assert_eq!(hint.domain, labels.join("."));
        prop_assert!(is_within_container(&dn, &hint.naming_context));
    }

    #[test]
    fn test_dn_without_dc_is_rejected(rdns in prop::collection::vec(rdn_strategy(), 1..5)) {
        let dn = rdns.join(",");
        prop_assert!(route_for(&dn).is_err(), "accepted {}", dn);
    }
}
