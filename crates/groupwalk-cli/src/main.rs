//! groupwalk binary
//!
//! Expands directory groups into their members and prints JSON lines.
//!
//! # Usage
//!
//! ```bash
//! # Flat expansion of one group from a fixture directory
//! groupwalk --directory forest.json sales@contoso.com
//!
//! # Level-annotated expansion, three levels deep, printing DNs
//! groupwalk --mode expanded --levels-deep-to-go 3 --output-id dn \
//!     --config groupwalk.yaml "CN=Sales,OU=Groups,DC=contoso,DC=com"
//! ```

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use groupwalk_cli::observability::{init_logging, LoggingConfig};
use groupwalk_cli::{run, GroupwalkConfig, RecordWriter, RunRequest};
use groupwalk_directory::MemoryDirectory;
use groupwalk_domain::{TraversalEngine, TraversalMode, TraversalOptions};

/// Recursive directory group membership expansion
#[derive(Parser, Debug)]
#[command(name = "groupwalk")]
#[command(version, about, long_about = None)]
struct Args {
    /// Root groups (GUID, distinguished name or primary address)
    #[arg(required = true)]
    roots: Vec<String>,

    /// Traversal mode
    #[arg(long, value_enum, default_value_t = ModeArg::Flat)]
    mode: ModeArg,

    /// Deepest level to expand (expanded default 10, flat unbounded)
    #[arg(long)]
    levels_deep_to_go: Option<u32>,

    /// Level assigned to the roots' direct members
    #[arg(long, default_value_t = 1)]
    starting_level: u32,

    /// Identifier to print: guid, dn or address
    #[arg(long)]
    output_id: Option<String>,

    /// One record per root (flat mode)
    #[arg(long)]
    collapse: bool,

    /// Maximum directory calls in flight
    #[arg(long)]
    concurrency: Option<usize>,

    /// Deadline per root in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// JSON fixture describing the directory
    #[arg(long)]
    directory: Option<String>,

    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Flat,
    Expanded,
}

impl From<ModeArg> for TraversalMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Flat => TraversalMode::Flat,
            ModeArg::Expanded => TraversalMode::Expanded,
        }
    }
}

impl Args {
    /// Applies flag overrides on top of the loaded configuration.
    fn apply_to(&self, config: &mut GroupwalkConfig) {
        if let Some(concurrency) = self.concurrency {
            config.traversal.max_concurrency = concurrency;
        }
        if let Some(secs) = self.timeout_secs {
            config.traversal.timeout_secs = Some(secs);
        }
        if let Some(path) = &self.directory {
            config.directory.fixture_path = Some(path.clone());
        }
        if let Some(id) = &self.output_id {
            config.output.identifier = id.clone();
        }
        if self.collapse {
            config.output.collapse = true;
        }
    }

    fn traversal_options(&self, config: &GroupwalkConfig, token: CancellationToken) -> TraversalOptions {
        let mode = TraversalMode::from(self.mode);
        let levels = self.levels_deep_to_go.or(match mode {
            TraversalMode::Flat => config.traversal.max_depth,
            TraversalMode::Expanded => Some(config.traversal.levels_deep_to_go),
        });
        TraversalOptions {
            mode,
            levels_deep_to_go: levels,
            starting_level: self.starting_level,
            cancellation: token,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GroupwalkConfig::load(path)?,
        None => GroupwalkConfig::from_env()?,
    };
    args.apply_to(&mut config);
    config.validate()?;

    init_logging(&LoggingConfig::from(&config.logging));

    let fixture = config.directory.fixture_path.as_deref().ok_or_else(|| {
        anyhow::anyhow!("a directory fixture is required (--directory or directory.fixture_path)")
    })?;
    let directory = MemoryDirectory::from_fixture_path(fixture)
        .with_context(|| format!("failed to load directory fixture {fixture}"))?;
    info!(objects = directory.len(), domains = ?directory.domains(), "Directory loaded");

    let engine = TraversalEngine::with_config(Arc::new(directory), config.traversal_config());

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    let request = RunRequest {
        roots: args.roots.clone(),
        options: args.traversal_options(&config, token),
        identifier: config.identifier_preference(),
        collapse: config.output.collapse,
    };

    let mut writer = RecordWriter::new(io::stdout().lock());
    let summary = run(&engine, &request, &mut writer).await?;

    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(
            incomplete = summary.incomplete,
            failed = summary.failed,
            "Not every root was fully expanded"
        );
        Ok(ExitCode::FAILURE)
    }
}

/// Cancels the traversal on Ctrl+C or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling traversal");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling traversal");
        }
    }
    token.cancel();
}
