use clap::Parser;
use log::LevelFilter;

// Bound to loopback by default: the admin surface and the JSON-RPC
// endpoint must not be exposed to the network without a reverse proxy.
// To allow remote access, explicitly set --bind-address 0.0.0.0:8080.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";

// Prometheus scrape endpoint
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "127.0.0.1:9090";

#[derive(Debug, Clone, Parser)]
#[command(name = "mint_daemon", about = "Mint virtual-currency ledger daemon")]
pub struct Config {
    /// Address the HTTP API (REST + JSON-RPC) listens on
    #[clap(long, default_value_t = String::from(DEFAULT_BIND_ADDRESS))]
    pub bind_address: String,

    /// Address the Prometheus exporter listens on
    #[clap(long, default_value_t = String::from(DEFAULT_METRICS_BIND_ADDRESS))]
    pub metrics_bind_address: String,

    /// Disable the Prometheus exporter
    #[clap(long)]
    pub disable_metrics: bool,

    /// Shared bearer token for the /admin surface; without it every admin
    /// request is rejected
    #[clap(long)]
    pub admin_token: Option<String>,

    /// Log level (off, error, warn, info, debug, trace)
    #[clap(long, default_value_t = LevelFilter::Info)]
    pub log_level: LevelFilter,
}
