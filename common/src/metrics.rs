use axum::extract::MatchedPath;
use axum::{Router, routing::get};
use futures_util::future::BoxFuture;
use http::{Request, StatusCode};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use owo_colors::OwoColorize;
use std::sync::OnceLock;
use std::time::Instant;
use tokio::net::TcpListener;
use tower::{Layer, Service};

use crate::shutdown::shutdown_signal;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static SERVER_STARTED: OnceLock<()> = OnceLock::new();

fn install_recorder_once() -> &'static PrometheusHandle {
    PROM_HANDLE.get_or_init(|| PrometheusBuilder::new().install_recorder().expect("install global metrics recorder"))
}

/// Spawns a `/metrics` server on `METRICS_PORT` if set. Safe to call more
/// than once; only the first call actually starts the server.
pub fn maybe_spawn_metrics_server() {
    let Some(port) = std::env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok()) else {
        return;
    };
    if SERVER_STARTED.set(()).is_ok() {
        let _ = install_recorder_once();
        tokio::spawn(run_metrics_server(port));
    }
}

async fn run_metrics_server(port: u16) {
    let handle = install_recorder_once().clone();
    let metrics_route = get(move || async move { handle.render() });
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }))
        .route("/metrics", metrics_route);
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| {
            eprintln!("{}", format!("\u{1f6d1} Failed to bind metrics server to {addr}: {e}").red());
            e
        })
        .expect("bind metrics server");
    println!("{}{}", "\u{1f4c8} Starting metrics server \u{2022} port=".green(), port.to_string().green().dimmed());
    let started = Instant::now();
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.expect("serve metrics");
    println!("{} {}", "\u{1f6d1} Metrics server stopped gracefully \u{2022} uptime was".red(), format!("{:.2?}", started.elapsed()).red().dimmed());
}

/// Tower layer recording request count, latency and in-flight gauge, keyed
/// by the matched route to avoid high-cardinality labels from raw paths.
#[derive(Clone, Default)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;
    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for MetricsService<S>
where
    S: Service<Request<B>, Response = axum::response::Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let start = Instant::now();
        let method = req.method().as_str().to_owned();
        let route = req.extensions().get::<MatchedPath>().map(|m| m.as_str().to_owned()).unwrap_or_else(|| "UNKNOWN".to_string());
        let mut svc = self.inner.clone();
        let fut = svc.call(req);

        Box::pin(async move {
            let in_flight = gauge!("http_server_in_flight_requests", "method" => method.clone());
            in_flight.increment(1);

            let res = fut.await;
            let elapsed = start.elapsed().as_secs_f64();
            let status = match &res {
                Ok(resp) => resp.status(),
                Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };

            histogram!(
                "http_server_request_duration_seconds",
                "method" => method.clone(),
                "route" => route.clone(),
                "status" => status.as_u16().to_string(),
            )
            .record(elapsed);
            counter!(
                "http_server_requests_total",
                "method" => method,
                "route" => route,
                "status" => status.as_u16().to_string(),
            )
            .increment(1);

            in_flight.decrement(1);
            res
        })
    }
}
