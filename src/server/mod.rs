pub mod api;
pub mod dtos;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{
    Extension, Router, ServiceExt,
    extract::Request,
    http::{HeaderValue, Method},
    routing::get,
};
use once_cell::sync::Lazy;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::{Layer, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    normalize_path::NormalizePathLayer,
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use api::{
    embed_controller::EmbedController,
    health_controller::health_endpoint,
    index_controller::{index_endpoint, not_found_endpoint},
};
use services::{DynRateLimitService, ProxyServices};

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn get_uptime_seconds() -> u64 {
    START_TIME.elapsed().as_secs()
}

pub struct ProxyApplicationServer;

impl ProxyApplicationServer {
    /// every route with its layers, without binding anything
    pub fn router(services: ProxyServices) -> Router {
        let cors = Self::cors_layer(&services.config.cors_origin);

        Router::new()
            .route("/", get(index_endpoint))
            .route("/api", get(index_endpoint))
            .route("/api/index", get(index_endpoint))
            .route("/health", get(health_endpoint))
            .nest("/api/embed", EmbedController::app())
            .fallback(not_found_endpoint)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors)
                    .layer(Extension(services)),
            )
    }

    pub async fn serve(config: Arc<AppConfig>) -> anyhow::Result<()> {
        Lazy::force(&START_TIME);

        let services = ProxyServices::new(config.clone())?;
        let sweeper = Self::spawn_sweeper(
            services.rate_limit.clone(),
            Duration::from_secs(config.rate_limit_sweep_seconds.max(1)),
        );

        // trailing slashes have to be trimmed before routing, so this wraps the router instead
        // of being one of its layers
        let app = NormalizePathLayer::trim_trailing_slash().layer(Self::router(services));

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        info!("routes initialized, listening on port {}", config.port);

        axum::serve(
            listener,
            ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("error while starting API server")?;

        sweeper.abort();
        info!("server stopped");

        Ok(())
    }

    fn cors_layer(cors_origin: &str) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers(Any);

        if cors_origin.trim() == "*" {
            return layer.allow_origin(Any);
        }

        let origins: Vec<HeaderValue> = cors_origin
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("ignoring invalid cors origin '{}'", origin);
                    None
                }
            })
            .collect();

        layer.allow_origin(origins)
    }

    /// drops idle client windows so memory follows active clients, not every ip ever seen
    fn spawn_sweeper(rate_limit: DynRateLimitService, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // the first tick fires immediately, nothing to sweep yet
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let removed = rate_limit.sweep().await;
                if removed > 0 {
                    debug!(
                        "swept {} idle clients, {} still tracked",
                        removed,
                        rate_limit.tracked_clients().await
                    );
                }
            }
        })
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install ctrl+c handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining connections");
}
