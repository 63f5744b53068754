//! Runs a batch of roots through the traversal engine and writes records.

use std::io::Write;

use anyhow::Context;
use groupwalk_domain::{
    collapse_flat, expanded_records, flat_records, Completion, DirectoryClient,
    IdentifierPreference, TraversalEngine, TraversalMode, TraversalOptions, TraversalResult,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::output::RecordWriter;

/// What to traverse and how to print it.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub roots: Vec<String>,
    pub options: TraversalOptions,
    pub identifier: IdentifierPreference,
    /// One record per root instead of one per member (flat mode only).
    pub collapse: bool,
}

/// Outcome counts for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub complete: usize,
    pub incomplete: usize,
    pub failed: usize,
    pub records: usize,
}

impl RunSummary {
    /// True when every root finished.
    pub fn is_success(&self) -> bool {
        self.incomplete == 0 && self.failed == 0
    }
}

/// Traverses each root in turn, writing its records as soon as it finishes.
///
/// Roots that fail or stop early are logged and counted; the batch keeps
/// going. Partial results of incomplete roots are still written.
#[instrument(skip_all, fields(roots = request.roots.len(), mode = ?request.options.mode))]
pub async fn run<D, W>(
    engine: &TraversalEngine<D>,
    request: &RunRequest,
    writer: &mut RecordWriter<W>,
) -> anyhow::Result<RunSummary>
where
    D: DirectoryClient + 'static,
    W: Write,
{
    if request.collapse && request.options.mode == TraversalMode::Expanded {
        warn!("--collapse only applies to flat mode; ignoring");
    }

    let mut summary = RunSummary::default();
    for root in &request.roots {
        let result = match engine.traverse(root, &request.options).await {
            Ok(result) => result,
            Err(e) => {
                error!(root = %root, error = %e, "Traversal failed");
                summary.failed += 1;
                continue;
            }
        };

        report(root, &result);
        let before = writer.written();
        write_result(&result, request, writer)
            .with_context(|| format!("failed to write records for {root}"))?;
        summary.records += writer.written() - before;

        if result.is_complete() {
            summary.complete += 1;
        } else {
            summary.incomplete += 1;
        }
    }
    writer.flush().context("failed to flush output")?;

    info!(
        complete = summary.complete,
        incomplete = summary.incomplete,
        failed = summary.failed,
        records = summary.records,
        "Batch finished"
    );
    Ok(summary)
}

fn write_result<W: Write>(
    result: &TraversalResult,
    request: &RunRequest,
    writer: &mut RecordWriter<W>,
) -> std::io::Result<()> {
    match result {
        TraversalResult::Flat(flat) => {
            let records = flat_records(flat, request.identifier);
            if request.collapse {
                writer.write_all(&collapse_flat(&records))
            } else {
                writer.write_all(&records)
            }
        }
        TraversalResult::Expanded(expanded) => {
            writer.write_all(&expanded_records(expanded, request.identifier))
        }
    }
}

/// Logs everything about a result that does not go to stdout.
fn report(root: &str, result: &TraversalResult) {
    for skipped in result.skipped() {
        warn!(
            root = %root,
            group = %skipped.group.display_identifier(),
            error = %skipped.error,
            "Skipped branch"
        );
    }

    let stats = result.stats();
    if stats.cycles_detected > 0 {
        warn!(root = %root, cycles = stats.cycles_detected, "Membership cycles ignored");
    }

    match result {
        TraversalResult::Flat(flat) if flat.depth_limit_reached => {
            info!(root = %root, "Depth bound reached; some groups were not expanded");
        }
        TraversalResult::Expanded(expanded) => {
            if let Some(resume_level) = expanded.resume_level {
                let frontier: Vec<&str> = expanded
                    .unexpanded_frontier
                    .iter()
                    .map(|g| g.distinguished_name.as_str())
                    .collect();
                info!(
                    root = %root,
                    resume_level,
                    frontier = ?frontier,
                    "Depth bound reached; rerun the frontier with --starting-level to continue"
                );
            }
        }
        TraversalResult::Flat(_) => {}
    }

    if let Completion::Incomplete { reason, pending } = result.completion() {
        let status = serde_json::to_string(result.completion()).unwrap_or_default();
        let pending: Vec<String> = pending
            .iter()
            .map(|p| format!("{}@{}", p.group.display_identifier(), p.level))
            .collect();
        warn!(
            root = %root,
            reason = ?reason,
            status = %status,
            pending = ?pending,
            "Traversal incomplete"
        );
    } else {
        info!(
            root = %root,
            directory_calls = stats.directory_calls,
            groups_expanded = stats.groups_expanded,
            "Traversal complete"
        );
    }
}
