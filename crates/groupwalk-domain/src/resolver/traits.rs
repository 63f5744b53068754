//! Traits for directory operations needed by the traversal engine.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::DomainResult;
use crate::model::DirectoryObjectRef;
use crate::routing::RoutingHint;

/// Lazy, finite sequence of members returned by a directory query.
///
/// A stream cannot be restarted; re-invoke the query to read it again.
/// Individual items may fail (e.g. a dangling member reference) without
/// ending the stream.
pub type MemberStream = BoxStream<'static, DomainResult<DirectoryObjectRef>>;

/// Directory service operations consumed by the traversal engine.
///
/// Implementations may be backed by LDAP, Exchange remote management or a
/// Graph-style recipient API. Errors follow the domain taxonomy:
/// `NotFound`/`Ambiguous` are recovered per branch, `Unavailable` and
/// `Unauthorized` halt the traversal.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Resolves a GUID, distinguished name or primary address to a group.
    async fn resolve_group(&self, identifier: &str) -> DomainResult<DirectoryObjectRef>;

    /// Lists the stored direct members of a static group.
    ///
    /// `hint` names the partition that holds `group`.
    async fn list_direct_members(
        &self,
        group: &DirectoryObjectRef,
        hint: &RoutingHint,
    ) -> DomainResult<MemberStream>;

    /// Evaluates a dynamic group's recipient filter over a container.
    async fn evaluate_dynamic_membership(
        &self,
        filter: &str,
        scope_container: &str,
        hint: &RoutingHint,
    ) -> DomainResult<MemberStream>;
}
