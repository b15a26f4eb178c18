//! The two listeners every service in this tree exposes: an internal one
//! for health/readiness probes, and the public one carrying the versioned
//! REST surface built in [`crate::routes`].

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use owo_colors::OwoColorize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::routes;

async fn serve(listener: TcpListener, router: Router, cancel: CancellationToken) -> Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await
        .context("failed to start server")
}

async fn bind(port: u16) -> Result<TcpListener> {
    let addr = format!("0.0.0.0:{port}");
    TcpListener::bind(&addr)
        .await
        .map_err(|e| {
            eprintln!("{}", format!("\u{274c} Failed to bind server to {addr}: {e}").red());
            e
        })
        .context("failed to bind server")
}

pub async fn run_internal(cancel: CancellationToken, port: u16) -> Result<()> {
    let router = Router::new().route("/healthz", get(|| async { "ok" })).route("/readyz", get(|| async { "ok" }));
    let listener = bind(port).await?;
    println!("{}{}", "\u{1f680} Starting internal meridian server \u{2022} port=".green(), port.to_string().green().dimmed());
    serve(listener, router, cancel).await?;
    println!("{}", "\u{1f6d1} Internal server stopped gracefully.".red());
    Ok(())
}

pub async fn run_public(cancel: CancellationToken, port: u16, app: App) -> Result<()> {
    let router = routes::build_router(app).layer(meridian_common::metrics::MetricsLayer);
    let listener = bind(port).await?;
    println!("{}{}", "\u{1f680} Starting public meridian server \u{2022} port=".green(), port.to_string().green().dimmed());
    serve(listener, router, cancel).await?;
    println!("{}", "\u{1f6d1} Public server stopped gracefully.".red());
    Ok(())
}
