/*
 * Argo Support - Support Controller Service
 * Copyright (C) 2025 Argo Support team
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Support Controller Service - Kubernetes controller for `Support` CRDs
//!
//! This service:
//! - Watches `Support` custom resources
//! - Runs the declared workflows (gen-ai analysis, feedback updates)
//! - Serves health, readiness and metrics endpoints

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use support_controller::diagnostics::KubeDiagnostics;
use support_controller::tasks::types::{Context, ReconcileMetrics};
use support_controller::tasks::{run_support_controller, ControllerConfig, KubeSupportStore};
use support_controller::workflows::genai::GenAiExecutorFactory;
use support_controller::workflows::{WorkflowRegistry, GENAI_WORKFLOW};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "/config/config.yaml";

#[derive(Clone)]
struct AppState {
    metrics: Arc<ReconcileMetrics>,
    controller_running: Arc<AtomicBool>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!(
        "Starting Argo Support Controller Service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = load_controller_config();
    config.validate()?;
    let config = Arc::new(config);

    let client = kube::Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let diagnostics = Arc::new(KubeDiagnostics::new(client.clone()));
    let registry = WorkflowRegistry::new().with(
        GENAI_WORKFLOW,
        Arc::new(GenAiExecutorFactory::new(
            client.clone(),
            diagnostics,
            config.http_timeout(),
        )),
    );

    let metrics = Arc::new(ReconcileMetrics::default());
    let context = Arc::new(Context {
        store: Arc::new(KubeSupportStore::new(client.clone())),
        registry: Arc::new(registry),
        config: config.clone(),
        metrics: metrics.clone(),
    });

    let controller_running = Arc::new(AtomicBool::new(true));

    // Start the controller in the background
    let controller_handle = {
        let client = client.clone();
        let running = controller_running.clone();
        tokio::spawn(async move {
            if let Err(e) = run_support_controller(client, context).await {
                error!("Controller error: {}", e);
            }
            running.store(false, Ordering::SeqCst);
        })
    };

    let state = AppState {
        metrics,
        controller_running,
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(Duration::from_secs(60))),
        )
        .with_state(state);

    let bind_address = config.bind_address()?;
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("Controller HTTP server listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    controller_handle.abort();
    info!("Controller service stopped");

    Ok(())
}

/// Plain text logs by default, JSON when `LOG_FORMAT=json`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn load_controller_config() -> ControllerConfig {
    let override_path = std::env::var("CONTROLLER_CONFIG_PATH").ok();
    let config_path = override_path
        .as_deref()
        .filter(|path| Path::new(path).exists())
        .unwrap_or(DEFAULT_CONFIG_PATH);

    match ControllerConfig::from_mounted_file(config_path) {
        Ok(cfg) => {
            info!("Loaded controller configuration from {}", config_path);
            cfg
        }
        Err(err) => {
            warn!(
                "Failed to load configuration from {}: {}. Using defaults.",
                config_path, err
            );
            ControllerConfig::default()
        }
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "support-controller",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    if !state.controller_running.load(Ordering::SeqCst) {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(json!({
        "status": "ready",
        "service": "support-controller",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

async fn metrics_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "support-controller",
        "version": env!("CARGO_PKG_VERSION"),
        "reconcile": state.metrics.snapshot()
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
