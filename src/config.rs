// Command-line and environment configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

/// Surfsup - climate API over the Hawaii weather-station dataset
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// SQL dump holding the `measurement` and `station` tables
    #[arg(short, long, env = "SURFSUP_DATA", default_value = "Resources/hawaii.sql", global = true)]
    pub data: PathBuf,

    /// Log filter used when RUST_LOG is not set (e.g. "debug", "surfsup=trace")
    #[arg(long, env = "SURFSUP_LOG", default_value = "info", global = true)]
    pub log_level: String,

    /// Address to listen on
    #[arg(long, env = "SURFSUP_HOST", default_value = "127.0.0.1", global = true)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "SURFSUP_PORT", default_value_t = 5000, global = true)]
    pub port: u16,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Serve the HTTP API (the default)
    Serve,
    /// Run one SELECT against the dataset and print the rows
    Query {
        /// The SELECT statement to run
        sql: String,
    },
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Resolve `host:port`, accepting hostnames as well as IP literals
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))?
            .next()
            .with_context(|| format!("No address found for {}", self.host))
    }
}
