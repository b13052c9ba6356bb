//! Command-line entrypoint flags. These are the final override layer on
//! top of defaults, TOML, and environment variables (`conversa_pipeline::config::Config::load`).

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "conversa-server", about = "Realtime voice conversation server")]
pub struct Cli {
    /// Path to a TOML config file; omit to use defaults + environment only.
    #[arg(long, env = "CONVERSA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind the HTTP signalling + data API on.
    #[arg(long, env = "CONVERSA_BIND", default_value = "0.0.0.0:8088")]
    pub bind: String,

    /// Overrides `log.level` from the resolved config.
    #[arg(long, env = "CONVERSA_LOG_LEVEL_FLAG")]
    pub log_level: Option<String>,

    /// gRPC endpoint of the hardware control service; omit to run without
    /// a hardware tool surface (browser-only sessions).
    #[arg(long, env = "CONVERSA_HARDWARE_ENDPOINT")]
    pub hardware_endpoint: Option<String>,

    /// Seconds to wait for in-flight sessions to close after a shutdown
    /// signal before forcing exit.
    #[arg(long, default_value_t = 10)]
    pub shutdown_grace_secs: u64,
}
