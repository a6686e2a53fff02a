//! Web server for the weight analytics dashboard.
//!
//! Provides a REST API over the analysis report, WebSocket for live
//! updates, and static file serving for the frontend.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Json},
    routing::get,
};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tower_http::services::ServeDir;

use crate::analysis::Report;
use crate::composition::BodyCompositionEstimate;
use crate::domain::{BodyMeasurement, EntryLog};
use crate::empirical::EmpiricalEstimate;
use crate::notice::IntakeNotice;
use crate::periods::PeriodStats;
use crate::settings::Settings;
use crate::trend::CaloricInference;

/// Message types for WebSocket broadcast.
#[derive(Clone, Debug)]
pub enum WsMessage {
    /// Data has been reloaded successfully.
    DataUpdated,
    /// An error occurred during reload.
    Error(String),
}

/// Mutable analysis data that can be reloaded.
pub struct ReportData {
    pub log: EntryLog,
    #[allow(dead_code)] // May be used for future features
    pub measurements: Vec<BodyMeasurement>,
    pub report: Report,
    pub settings: Settings,
    #[allow(dead_code)] // May be used for future features
    pub last_reload: chrono::DateTime<Utc>,
}

/// Shared application state with reloadable data.
pub struct AppState {
    /// The analysis data, protected by RwLock for concurrent reads.
    pub data: RwLock<ReportData>,
    /// Path to the Excel file for reloading.
    pub file_path: PathBuf,
    /// Path to the settings file, for persisting updated calibration.
    pub settings_path: PathBuf,
    /// Broadcast channel for WebSocket notifications.
    pub ws_broadcast: broadcast::Sender<WsMessage>,
}

// === JSON Response Types ===

#[derive(Serialize)]
pub struct SummaryResponse {
    pub entry_count: usize,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub latest_weight_kg: Option<f64>,
    pub goal_weight_kg: Option<f64>,
    pub kcal_per_kg: f64,
    pub confidence_level: f64,
    pub has_notice: bool,
}

// === Router Setup ===

/// Creates the application router.
pub fn create_router(state: Arc<AppState>, static_dir: PathBuf) -> Router {
    Router::new()
        .route("/api/summary", get(get_summary))
        .route("/api/periods", get(get_periods))
        .route("/api/trend", get(get_trend))
        .route("/api/empirical", get(get_empirical))
        .route("/api/notice", get(get_notice))
        .route("/api/composition", get(get_composition))
        .route("/ws", get(ws_handler))
        .fallback_service(ServeDir::new(static_dir).append_index_html_on_directories(true))
        .with_state(state)
}

// === WebSocket Handler ===

/// WebSocket upgrade handler for live updates.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws_connection(socket, state))
}

/// Handles an individual WebSocket connection.
async fn handle_ws_connection(mut socket: WebSocket, state: Arc<AppState>) {
    log::info!("WebSocket client connected");

    let mut rx = state.ws_broadcast.subscribe();

    loop {
        tokio::select! {
            // Forward broadcast messages to client
            msg = rx.recv() => {
                match msg {
                    Ok(WsMessage::DataUpdated) => {
                        if socket.send(Message::Text("reload".into())).await.is_err() {
                            break;
                        }
                    }
                    Ok(WsMessage::Error(err)) => {
                        let msg = format!("error:{}", err);
                        if socket.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // Missed some messages, send a reload anyway
                        if socket.send(Message::Text("reload".into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            // Handle client messages (ping/pong, close)
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    log::info!("WebSocket client disconnected");
}

/// Runs the web server.
pub async fn run_server(
    state: Arc<AppState>,
    port: u16,
    static_dir: PathBuf,
) -> anyhow::Result<()> {
    let app = create_router(state, static_dir);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    println!("Server running at http://localhost:{}", port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// === API Handlers ===

/// GET /api/summary - Headline figures for the dashboard.
async fn get_summary(State(state): State<Arc<AppState>>) -> Json<SummaryResponse> {
    let data = state.data.read().await;

    let latest_weight = data.log.sorted().last().map(|e| e.weight_kg);

    Json(SummaryResponse {
        entry_count: data.log.len(),
        first_date: data.log.first_date().map(|d| d.to_string()),
        last_date: data.log.last_date().map(|d| d.to_string()),
        latest_weight_kg: latest_weight,
        goal_weight_kg: data.settings.goal_weight_kg,
        kcal_per_kg: data.report.kcal_per_kg(),
        confidence_level: data.settings.confidence_level.as_fraction(),
        has_notice: data.report.notice.is_some(),
    })
}

/// GET /api/periods - Aggregated period statistics.
async fn get_periods(State(state): State<Arc<AppState>>) -> Json<Vec<PeriodStats>> {
    let data = state.data.read().await;
    Json(data.report.periods.clone())
}

/// GET /api/trend - Regression over the configured window.
async fn get_trend(State(state): State<Arc<AppState>>) -> Json<Option<CaloricInference>> {
    let data = state.data.read().await;
    Json(data.report.inference.clone())
}

/// GET /api/empirical - Personal energy conversion estimate.
async fn get_empirical(State(state): State<Arc<AppState>>) -> Json<EmpiricalEstimate> {
    let data = state.data.read().await;
    Json(data.report.empirical.clone())
}

/// GET /api/notice - Intake mismatch notice, if any.
async fn get_notice(State(state): State<Arc<AppState>>) -> Json<Option<IntakeNotice>> {
    let data = state.data.read().await;
    Json(data.report.notice)
}

/// GET /api/composition - Daily body composition series.
async fn get_composition(State(state): State<Arc<AppState>>) -> Json<Vec<BodyCompositionEstimate>> {
    let data = state.data.read().await;
    Json(data.report.composition.clone())
}
