use clap::Parser;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use crate::{config::DEFAULT_CONFIG_FILE, Error, Result};

#[derive(Debug, Parser)]
#[command(
    name = "am-executor",
    version,
    about = "Runs a command for every Alertmanager webhook notification",
    override_usage = "am-executor [OPTIONS] <COMMAND> [ARGS]..."
)]
pub struct Cli {
    /// HTTP address to listen on
    #[arg(short = 'l', value_name = "ADDR", default_value = ":8080")]
    pub listen_addr: String,

    /// Enable verbose/debug logging
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Configuration file in YAML format
    #[arg(long = "config.file", value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,

    /// Create a bearer token for authentication and exit
    #[arg(long)]
    pub create_token: bool,

    /// Offset to subtract from a Prometheus-supplied timeout, in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 0.5)]
    pub timeout_offset: f64,

    /// Command to run for each notification, followed by its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl Cli {
    /// Resolves `-l`. A bare `:port` listens on every interface.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let addr = if self.listen_addr.starts_with(':') {
            format!("0.0.0.0{}", self.listen_addr)
        } else {
            self.listen_addr.clone()
        };
        addr.to_socket_addrs()
            .map_err(|e| Error::Config(format!("invalid listen address {}: {}", self.listen_addr, e)))?
            .next()
            .ok_or_else(|| Error::Config(format!("listen address {} did not resolve", self.listen_addr)))
    }
}
