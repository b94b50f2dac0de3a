//! Command-line configuration.

use clap::Parser;

/// Server configuration, parsed from the command line.
#[derive(Debug, Parser)]
#[command(name = "irori-server", about = "WebSocket broadcast chat server")]
pub struct Config {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
