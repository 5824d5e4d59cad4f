// Entry point: load the dataset, then serve the API or run a one-off query

use anyhow::{anyhow, Result};
use clap::Parser;
use std::net::SocketAddr;
use surfsup::config::{Args, Command};
use surfsup::query::Query;
use surfsup::{load_dataset, router, ClimateStore, QueryExecutor, QueryParser};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let executor = load_dataset(&args.data)?;

    match args.command() {
        Command::Serve => serve(ClimateStore::new(executor), args.socket_addr()?).await,
        Command::Query { sql } => run_query(&executor, &sql),
    }
}

/// RUST_LOG wins over `--log-level` when set
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn serve(store: ClimateStore, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(address = %listener.local_addr()?, "Listening");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl-C, shutting down");
}

/// Run a read-only statement and print it as a table
fn run_query(executor: &QueryExecutor, sql: &str) -> Result<()> {
    match QueryParser::parse(sql)? {
        Query::Select(select) => {
            println!("{}", executor.select(&select)?.format());
            Ok(())
        }
        _ => Err(anyhow!("Only SELECT statements are allowed; the dataset is read-only")),
    }
}
