//! Configuration: CLI arguments with environment variable fallbacks.

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// hearth - presence-aware furnace controller
#[derive(Parser, Debug, Clone)]
#[command(name = "hearthd")]
#[command(about = "Decides when the furnace should burn, based on temperature and who is home")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Path of the SQLite database (created on first run)
    #[arg(long, env = "DB_PATH", default_value = "hearth.sqlite3")]
    pub db_path: PathBuf,

    /// Syslog file to watch for DHCP activity
    #[arg(long, env = "SYSLOG_PATH", default_value = "/var/log/syslog")]
    pub syslog_path: PathBuf,
}
