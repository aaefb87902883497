//! Operator command interface
//!
//! Small HTTP surface over the engine: read status and profit, toggle
//! entries, switch strategy, and read the latest indicator snapshots.

use crate::error::Result;
use crate::services::SnapshotBoard;
use crate::strategy::{StrategyKind, TradingEngine};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Shared state for command handlers
#[derive(Clone)]
pub struct CommandState {
    pub engine: Arc<TradingEngine>,
    pub board: Arc<SnapshotBoard>,
}

#[derive(Debug, Deserialize)]
pub struct SetStrategyRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
struct Ack {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    strategy: Option<StrategyKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<Vec<&'static str>>,
}

impl Ack {
    fn enabled(enabled: bool) -> Self {
        Self {
            ok: true,
            strategy: None,
            enabled: Some(enabled),
            error: None,
            available: None,
        }
    }
}

pub fn router(engine: Arc<TradingEngine>, board: Arc<SnapshotBoard>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/profit", get(profit_handler))
        .route("/snapshots", get(snapshots_handler))
        .route("/strategies", get(strategies_handler))
        .route("/enable", post(enable_handler))
        .route("/disable", post(disable_handler))
        .route("/strategy", post(set_strategy_handler))
        .layer(CorsLayer::permissive())
        .with_state(CommandState { engine, board })
}

/// Bind `addr` and serve until the engine requests shutdown.
///
/// Binding happens before this returns so a bad address fails startup.
pub async fn spawn_command_server(
    addr: &str,
    engine: Arc<TradingEngine>,
    board: Arc<SnapshotBoard>,
) -> Result<JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Command server listening on {}", listener.local_addr()?);

    let mut shutdown = engine.shutdown_receiver();
    let app = router(engine, board);

    Ok(tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await;
        match served {
            Ok(()) => info!("Command server stopped"),
            Err(e) => error!("Command server error: {}", e),
        }
    }))
}

async fn status_handler(State(state): State<CommandState>) -> impl IntoResponse {
    Json(state.engine.status().await)
}

async fn profit_handler(State(state): State<CommandState>) -> impl IntoResponse {
    Json(state.engine.total_profit().await)
}

async fn snapshots_handler(State(state): State<CommandState>) -> impl IntoResponse {
    Json(state.board.all())
}

async fn strategies_handler() -> impl IntoResponse {
    Json(StrategyKind::names().collect::<Vec<_>>())
}

async fn enable_handler(State(state): State<CommandState>) -> impl IntoResponse {
    state.engine.enable();
    Json(Ack::enabled(true))
}

async fn disable_handler(State(state): State<CommandState>) -> impl IntoResponse {
    state.engine.disable();
    Json(Ack::enabled(false))
}

async fn set_strategy_handler(
    State(state): State<CommandState>,
    Json(req): Json<SetStrategyRequest>,
) -> impl IntoResponse {
    match state.engine.set_strategy(&req.name).await {
        Ok(kind) => {
            state.board.clear();
            (
                StatusCode::OK,
                Json(Ack {
                    ok: true,
                    strategy: Some(kind),
                    enabled: None,
                    error: None,
                    available: None,
                }),
            )
        }
        Err(e) => {
            warn!("Rejected strategy switch to {:?}: {}", req.name, e);
            (
                StatusCode::BAD_REQUEST,
                Json(Ack {
                    ok: false,
                    strategy: None,
                    enabled: None,
                    error: Some(e.to_string()),
                    available: Some(StrategyKind::names().collect()),
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingNotifier;
    use crate::config::RiskConfig;
    use crate::exchange::{PaperExchange, ScriptedFeed};
    use crate::strategy::{OrchestratorConfig, RiskManager, StrategyContext, StrategyParams};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (Arc<TradingEngine>, Router) {
        let board = Arc::new(SnapshotBoard::new());
        let ctx = StrategyContext {
            exchange: Arc::new(PaperExchange::new(Arc::new(ScriptedFeed::new()), 10_000.0)),
            risk: Arc::new(RiskManager::new(RiskConfig::default())),
            sink: board.clone(),
            notifier: Arc::new(RecordingNotifier::new()),
        };
        let engine = Arc::new(TradingEngine::new(
            OrchestratorConfig {
                symbols: vec!["BTCUSDT".to_string()],
                tick_interval: Duration::from_secs(1),
                start_enabled: true,
            },
            StrategyKind::MomentumReversal,
            StrategyParams::default(),
            ctx,
        ));
        (engine.clone(), router(engine, board))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_status_reports_engine_state() {
        let (_engine, app) = app();
        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["enabled"], true);
        assert_eq!(json["strategy"], "momentum_reversal");
        assert_eq!(json["balance"], 10_000.0);
        assert_eq!(json["profit"]["total"], 0.0);
    }

    #[tokio::test]
    async fn test_disable_then_enable() {
        let (engine, app) = app();
        let response = app
            .clone()
            .oneshot(post_json("/disable", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!engine.is_enabled());

        app.oneshot(post_json("/enable", "")).await.unwrap();
        assert!(engine.is_enabled());
    }

    #[tokio::test]
    async fn test_switch_strategy() {
        let (engine, app) = app();
        let response = app
            .clone()
            .oneshot(post_json("/strategy", r#"{"name":"band_reversion"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(engine.active_strategy().await, StrategyKind::BandReversion);

        let response = app
            .oneshot(post_json("/strategy", r#"{"name":"martingale"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["ok"], false);
        assert!(json["available"].as_array().unwrap().len() >= 3);
        assert_eq!(engine.active_strategy().await, StrategyKind::BandReversion);
    }
}
