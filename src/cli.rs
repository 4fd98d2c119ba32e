use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "nswatch",
    version,
    about = "Live namespace mirror and picker for Kubernetes clusters behind a dashboard proxy."
)]
pub struct CliArgs {
    /// Dashboard proxy API base (default: http://localhost:4688/api/v1)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Cluster to watch first (defaults to the current kubeconfig context's cluster)
    #[arg(short, long)]
    pub cluster: Option<String>,

    /// Initial in-app location, e.g. /namespaces?namespace=default
    #[arg(short, long, default_value = "/")]
    pub location: String,

    /// Query parameter that carries the selected namespace (default: namespace)
    #[arg(long)]
    pub member_param: Option<String>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Append logs to this file instead of discarding them
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// UI tick interval in milliseconds
    #[arg(long, default_value_t = 1_000)]
    pub tick_ms: u64,
}
