use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "edge-diag")]
#[command(about = "Health checks and support bundles for edge messaging services on Kubernetes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Display application version
    Version,

    /// Evaluate cluster readiness and deployed service health
    Check(CheckArgs),

    /// Collect cluster state, pod logs and metrics into a zip archive
    SupportBundle(BundleArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServiceArg {
    Broker,
    Connector,
    Diagnostics,
    Opcua,
    All,
}

#[derive(clap::Args)]
pub struct CheckArgs {
    /// Service to evaluate
    #[arg(value_enum, default_value_t = ServiceArg::All)]
    pub service: ServiceArg,

    /// Run only pre-deployment checks
    #[arg(long)]
    pub pre: bool,

    /// Run only post-deployment checks
    #[arg(long)]
    pub post: bool,

    /// Render a human-readable report instead of JSON
    #[arg(long)]
    pub as_list: bool,

    /// Only evaluate these resource kinds (comma-separated, case-insensitive)
    #[arg(long, value_delimiter = ',')]
    pub resources: Option<Vec<String>>,

    /// Only evaluate resources whose name matches this pattern (`*` and `?` wildcards)
    #[arg(long)]
    pub resource_name: Option<String>,

    /// 0 summary, 1 detail, 2 verbose
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub detail_level: u8,

    /// Restrict evaluation to one namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Fail when any pre-deployment requirement is not met
    #[arg(long)]
    pub strict: bool,

    /// YAML file with pre-deployment thresholds
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overall deadline for the run in seconds
    #[arg(long)]
    pub timeout_seconds: Option<u64>,

    /// Fetch broker runtime statistics from the diagnostics service
    #[arg(long)]
    pub stats: bool,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

#[derive(clap::Args)]
pub struct BundleArgs {
    /// Service to collect, or `auto` to detect deployed services
    #[arg(long, default_value = "auto")]
    pub ops_service: String,

    /// Collect container logs newer than this many seconds (0 disables logs)
    #[arg(long, default_value_t = 60 * 60 * 24 * 7)]
    pub log_age_seconds: i64,

    /// Directory to write the archive into
    #[arg(long, default_value = ".")]
    pub bundle_dir: PathBuf,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// YAML file with API timeout settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/* ============================= TESTS ============================= */
