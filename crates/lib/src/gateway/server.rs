//! Gateway HTTP server: hosts the webhook and a health probe on one port.

use crate::adapter::{RequestMethod, WebhookQuery, WebhookRequest, Weixin};
use crate::config::{Config, Credentials};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Path the provider is configured to call.
pub const WEBHOOK_PATH: &str = "/weixin";

/// Shared state for the gateway.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub weixin: Arc<Weixin>,
}

/// Build the adapter from config and register the configured keyword replies.
pub async fn build_weixin(config: &Config) -> Weixin {
    let weixin = Weixin::new(Credentials::from_config(config));
    for (key, text) in &config.weixin.replies {
        weixin.register_text(key.clone(), text.clone()).await;
    }
    weixin
}

/// Router for the given state: `GET /` health, `GET|POST /weixin` webhook.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route(WEBHOOK_PATH, get(weixin_webhook).post(weixin_webhook))
        .with_state(state)
}

/// Run the gateway with an adapter built from config (keyword replies only).
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let weixin = build_weixin(&config).await;
    serve(config, Arc::new(weixin)).await
}

/// Serve an already configured adapter (e.g. with code handlers registered).
/// Fails when no shared token is configured, since every request would be refused.
pub async fn serve(config: Config, weixin: Arc<Weixin>) -> Result<()> {
    if weixin.credentials().token.is_none() {
        anyhow::bail!("refusing to start gateway without a token (set weixin.token or WEIXIN_TOKEN)");
    }
    if weixin.credentials().sender.is_none() {
        log::debug!("no default sender configured; replies use the message receiver");
    }
    let keys = weixin.registry().keys().await;
    log::info!("registered {} reply key(s)", keys.len());

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let state = GatewayState {
        config: Arc::new(config),
        weixin,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
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
    log::info!("shutdown signal received, draining connections");
}

/// GET|POST /weixin — GET is the verification handshake, POST delivers a message.
async fn weixin_webhook(
    State(state): State<GatewayState>,
    method: Method,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Response {
    let method = if method == Method::GET {
        RequestMethod::Get
    } else {
        RequestMethod::Post
    };
    let req = WebhookRequest {
        method,
        query: &query,
        body: &body,
    };
    match state.weixin.handle(&req).await {
        Ok(res) => (res.status, [(header::CONTENT_TYPE, res.content_type)], res.body).into_response(),
        Err(e) => {
            log::error!("webhook request failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "server misconfigured").into_response()
        }
    }
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
    }))
}
