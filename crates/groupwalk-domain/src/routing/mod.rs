//! Domain routing for multi-domain forests.
//!
//! A single directory endpoint does not see every partition of a forest, so
//! queries about an object have to be sent to the domain that holds it. The
//! domain is derived from the object's distinguished name with a pure string
//! transformation:
//!
//! ```text
//! CN=Group1,OU=Groups,DC=child,DC=contoso,DC=com  ->  child.contoso.com
//! ```
//!
//! No directory lookup is involved, which keeps the router testable offline.

use std::fmt;

use crate::error::{DomainError, DomainResult};

#[cfg(test)]
mod routing_proptest;

/// Advisory hint telling a directory client which partition to query.
#[derive(Debug, Clone, Eq)]
pub struct RoutingHint {
    /// Dotted DNS-style domain name, lowercased (e.g. `child.contoso.com`).
    pub domain: String,
    /// The `DC=` suffix of the distinguished name (e.g. `DC=child,DC=contoso,DC=com`).
    pub naming_context: String,
}

impl RoutingHint {
    /// Returns true when the hint routes to `domain` (case-insensitive).
    pub fn targets(&self, domain: &str) -> bool {
        self.domain.eq_ignore_ascii_case(domain)
    }
}

impl PartialEq for RoutingHint {
    fn eq(&self, other: &Self) -> bool {
        self.domain.eq_ignore_ascii_case(&other.domain)
    }
}

impl fmt::Display for RoutingHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.domain)
    }
}

/// Derives the routing hint for a distinguished name.
///
/// Everything before the first `DC=` component is discarded; the remaining
/// `DC=` values are joined with `.`. Fails with `MalformedIdentifier` when the
/// name has no `DC=` component, when a `DC=` value is empty, or when a
/// non-`DC` component follows the domain components.
pub fn route_for(distinguished_name: &str) -> DomainResult<RoutingHint> {
    let components = split_rdns(distinguished_name);

    let first_dc = components
        .iter()
        .position(|rdn| rdn_type_is(rdn, "DC"))
        .ok_or_else(|| DomainError::malformed(distinguished_name, "no DC= component"))?;

    let mut labels = Vec::with_capacity(components.len() - first_dc);
    for rdn in &components[first_dc..] {
        let Some(value) = rdn_value_if(rdn, "DC") else {
            return Err(DomainError::malformed(
                distinguished_name,
                format!("unexpected component '{}' after domain components", rdn.trim()),
            ));
        };
        if value.is_empty() {
            return Err(DomainError::malformed(distinguished_name, "empty DC= component"));
        }
        labels.push(value);
    }

    let naming_context = labels
        .iter()
        .map(|label| format!("DC={label}"))
        .collect::<Vec<_>>()
        .join(",");
    let domain = labels.join(".").to_ascii_lowercase();

    Ok(RoutingHint {
        domain,
        naming_context,
    })
}

/// Returns true when `dn` lies inside `container` (or is the container).
///
/// Comparison is case-insensitive and ignores whitespace around separators.
pub fn is_within_container(dn: &str, container: &str) -> bool {
    let dn = normalize_dn(dn);
    let container = normalize_dn(container);
    if container.is_empty() {
        return false;
    }
    dn == container || dn.ends_with(&format!(",{container}"))
}

/// Lowercases a DN and strips whitespace around RDN separators.
pub fn normalize_dn(dn: &str) -> String {
    split_rdns(dn)
        .iter()
        .map(|rdn| match rdn.split_once('=') {
            Some((ty, value)) => format!("{}={}", ty.trim(), value.trim()),
            None => rdn.trim().to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
        .to_lowercase()
}

/// Splits a DN on unescaped commas.
fn split_rdns(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (idx, ch) in dn.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                parts.push(&dn[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&dn[start..]);
    parts
}

fn rdn_type_is(rdn: &str, attr: &str) -> bool {
    rdn.split_once('=')
        .is_some_and(|(ty, _)| ty.trim().eq_ignore_ascii_case(attr))
}

fn rdn_value_if<'a>(rdn: &'a str, attr: &str) -> Option<&'a str> {
    let (ty, value) = rdn.split_once('=')?;
    ty.trim().eq_ignore_ascii_case(attr).then(|| value.trim())
}
