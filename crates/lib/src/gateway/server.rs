//! Gateway HTTP server: the Slack events webhook and a health probe.

use crate::classifier::{self, MentionPattern};
use crate::config::{self, Config};
use crate::dify::DifyClient;
use crate::orchestrator::Orchestrator;
use crate::slack::{SlackClient, SlackEnvelope};
use crate::store::MemorySessionStore;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Slack sets this header on redelivery attempts; such requests are
/// acknowledged without any processing so retries never duplicate replies.
const RETRY_HEADER: &str = "X-Slack-Retry-Num";

/// Shared state for the gateway (config, mention pattern, orchestrator).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    mention: MentionPattern,
    orchestrator: Arc<Orchestrator>,
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Fails at startup when the Slack token or Dify credentials are missing.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let slack_token = config::resolve_slack_token(&config)
        .context("slack bot token not configured (slack.botToken or SLACK_BOT_TOKEN)")?;
    let dify_key = config::resolve_dify_key(&config)
        .context("dify api key not configured (dify.apiKey or DIFY_API_KEY)")?;
    let app_id = config
        .dify
        .app_id
        .clone()
        .context("dify app id not configured (dify.appId)")?;
    let mention = MentionPattern::from_config(config.slack.mention_pattern.as_deref())?;

    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::info!("gateway: binding non-loopback address {}", bind);
    }

    let chat = Arc::new(SlackClient::new(&config.slack.api_base, slack_token));
    let backend = Arc::new(DifyClient::new(&config.dify.api_base, dify_key, app_id));
    let store = Arc::new(MemorySessionStore::new());
    let orchestrator = Arc::new(Orchestrator::new(
        store,
        chat,
        backend,
        Duration::from_secs(config.sessions.ttl_secs),
    ));

    let state = GatewayState {
        config: Arc::new(config),
        mention,
        orchestrator,
    };
    let port = state.config.gateway.port;

    let app = Router::new()
        .route("/", get(health_http))
        .route("/event", post(slack_events))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, port);
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
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
    }))
}

/// POST /event — Slack Events-API endpoint.
///
/// Redeliveries are acknowledged before anything else (Slack retries on
/// at-least-once semantics; a second processing run would post a second
/// reply pair). Actionable events are handed to the orchestrator on a
/// spawned task so the webhook response stays constant-time regardless
/// of backend latency.
async fn slack_events(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if headers.contains_key(RETRY_HEADER) {
        log::debug!("gateway: ignoring redelivery");
        return (StatusCode::OK, "Retry ignored").into_response();
    }

    let envelope: SlackEnvelope = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            log::debug!("gateway: malformed event body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    // Endpoint-setup handshake: echo the challenge back.
    if envelope.typ.as_deref() == Some("url_verification") {
        let challenge = envelope.challenge.unwrap_or_default();
        return Json(json!({ "challenge": challenge })).into_response();
    }

    if let Some(ref event) = envelope.event {
        if let Some(msg) = classifier::classify(event, &state.mention) {
            let orchestrator = state.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator.handle(msg).await;
            });
        }
    }

    (StatusCode::OK, "OK").into_response()
}
