use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

use meridian_common::shutdown::shutdown_signal;
use meridian_store::Store;
use meridian_store::backend::postgres::PostgresBackend;

use crate::app::App;

mod app;
mod args;
mod auth;
mod cascade;
mod crypto;
#[cfg(feature = "dns")]
mod dns;
mod error;
mod executors;
mod kube;
mod models;
mod routes;
mod server;

#[tokio::main]
pub async fn main() -> Result<()> {
    meridian_common::init();
    let cli = args::Cli::parse();
    match cli.command {
        args::Commands::Server(args) => run_servers(args).await,
    }
}

async fn run_servers(args: args::ServerArgs) -> Result<()> {
    meridian_common::metrics::maybe_spawn_metrics_server();

    let pool = meridian_common::postgres::create_pool(args.store.postgres.clone()).await;
    let backend = PostgresBackend::new(pool);
    backend.init_schema().await.context("failed to initialize database schema")?;

    let store = Store::from_args(Arc::new(backend), &args.store).context("failed to initialize store")?;
    let app = App::new(Arc::new(store), &args.cascade, args.secret_encryption_password.clone());

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel_clone.cancel();
    });

    let cancel_clone = cancel.clone();
    let mut internal_join = Box::pin(tokio::spawn(async move { server::run_internal(cancel_clone, args.internal_port).await }));
    let cancel_clone = cancel.clone();
    let mut public_join = Box::pin(tokio::spawn(async move { server::run_public(cancel_clone, args.public_port, app).await }));

    tokio::select! {
        res = &mut internal_join => {
            cancel.cancel();
            public_join.await.context("failed to join public server task")?.context("public server task failed")?;
            res.context("failed to join internal server task")?.context("internal server task failed")?;
        }
        res = &mut public_join => {
            cancel.cancel();
            internal_join.await.context("failed to join internal server task")?.context("internal server task failed")?;
            res.context("failed to join public server task")?.context("public server task failed")?;
        }
    }
    println!("{}", "\u{1f6d1} All servers shut down gracefully.".red());
    Ok(())
}
