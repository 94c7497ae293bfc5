//! cloudsweep: reconcile AWS resources of one kind across two environments
//!
//! Lists a resource kind in a source and a target environment, matches the
//! names present in both, and reports configuration drift between them.

use anyhow::Result;
use clap::{Parser, Subcommand};
use cloudsweep::aws::Credentials;
use cloudsweep::config::{EnvironmentConfig, ReconcileOverrides, RunConfig};
use cloudsweep::orchestrator;
use cloudsweep::report::{self, OutputFormat};
use cloudsweep_common::ResourceKind;
use cloudsweep_common::defaults::DEFAULT_REGION;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Noisy dependency targets capped at `warn`
const QUIET_TARGETS: &[&str] = &["aws_config", "aws_sdk", "aws_smithy", "hyper", "rustls"];

#[derive(Parser, Debug)]
#[command(name = "cloudsweep")]
#[command(about = "Reconcile AWS resources across environments")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Arguments for the reconcile command (extracted to reduce enum size)
#[derive(clap::Args, Debug)]
struct ReconcileArgs {
    /// Resource kind (function, queue, topic, table, stream, role, policy, alarm)
    #[arg(short, long)]
    kind: Option<ResourceKind>,

    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Source environment region
    #[arg(long)]
    source_region: Option<String>,

    /// Target environment region
    #[arg(long)]
    target_region: Option<String>,

    /// Role to assume in the source environment
    #[arg(long)]
    source_role_arn: Option<String>,

    /// Role to assume in the target environment
    #[arg(long)]
    target_role_arn: Option<String>,

    /// AWS profile for the source environment
    #[arg(long, env = "CLOUDSWEEP_SOURCE_PROFILE")]
    source_profile: Option<String>,

    /// AWS profile for the target environment
    #[arg(long, env = "CLOUDSWEEP_TARGET_PROFILE")]
    target_profile: Option<String>,

    /// Upper bound between queue polls, in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Worker pool size (at least 3)
    #[arg(long)]
    workers: Option<usize>,

    /// Bound on names waiting for detail comparison
    #[arg(long)]
    common_capacity: Option<usize>,

    /// Attempts per throttled detail fetch
    #[arg(long)]
    fetch_retries: Option<u32>,

    /// Overall timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Also write the JSON report to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl From<ReconcileArgs> for ReconcileOverrides {
    fn from(args: ReconcileArgs) -> Self {
        Self {
            kind: args.kind,
            source_region: args.source_region,
            target_region: args.target_region,
            source_profile: args.source_profile,
            target_profile: args.target_profile,
            source_role_arn: args.source_role_arn,
            target_role_arn: args.target_role_arn,
            poll_interval_ms: args.poll_interval_ms,
            worker_pool_size: args.workers,
            common_capacity: args.common_capacity,
            fetch_retries: args.fetch_retries,
            timeout_secs: args.timeout,
            format: args.format,
            output: args.output,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare one resource kind between a source and a target environment
    Reconcile(Box<ReconcileArgs>),

    /// List one resource kind in a single environment
    Inventory {
        /// Resource kind to list
        #[arg(short, long)]
        kind: ResourceKind,

        /// AWS region
        #[arg(long, default_value = DEFAULT_REGION)]
        region: String,

        /// Role to assume before listing
        #[arg(long)]
        role_arn: Option<String>,

        /// AWS profile to use
        #[arg(long, env = "AWS_PROFILE")]
        profile: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

fn init_tracing() -> Result<()> {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    for target in QUIET_TARGETS {
        filter = filter.add_directive(format!("{target}=warn").parse()?);
    }

    // Reports go to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Cancel the pipeline on Ctrl-C
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling reconciliation");
            token.cancel();
        }
    });
    cancel
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing()?;

    match args.command {
        Command::Reconcile(reconcile_args) => {
            let config_path = reconcile_args.config.clone();
            let config = RunConfig::load(config_path.as_deref(), (*reconcile_args).into())?;
            handle_reconcile(config).await?;
        }

        Command::Inventory {
            kind,
            region,
            role_arn,
            profile,
            format,
        } => {
            let env = EnvironmentConfig {
                region,
                credentials: Credentials { profile, role_arn },
            };
            handle_inventory(kind, env, format).await?;
        }
    }

    Ok(())
}

/// Handle the reconcile command
async fn handle_reconcile(config: RunConfig) -> Result<()> {
    info!(
        kind = %config.kind(),
        source_region = %config.source.region,
        target_region = %config.target.region,
        "Starting reconciliation"
    );

    let outcome = orchestrator::run_reconcile(&config, cancel_on_interrupt()).await?;

    println!("{}", report::render_outcome(&outcome, config.format())?);

    if let Some(path) = config.output_path() {
        report::write_json_report(path, &outcome)?;
        info!(path = %path.display(), "Report written");
    }

    Ok(())
}

/// Handle the inventory command
async fn handle_inventory(
    kind: ResourceKind,
    env: EnvironmentConfig,
    format: OutputFormat,
) -> Result<()> {
    info!(%kind, region = %env.region, "Listing resources");

    let listing = orchestrator::run_inventory(kind, &env).await?;

    if listing.names.is_empty() && format == OutputFormat::Table {
        println!("No {kind} resources found in {}.", listing.region);
        return Ok(());
    }

    println!("{}", report::render_inventory(&listing, format)?);
    Ok(())
}
