use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use shared::{
    domain::{ClientId, ConversationKey, LawyerId, ParticipantRole},
    error::{ApiError, ErrorCode},
    protocol::{ChatMessage, ConversationSummary},
};
use storage::Storage;
use tracing::{error, info};

mod config;
mod registry;
mod ws;

use config::{load_settings, prepare_database_url};
use registry::SessionRegistry;

#[derive(Clone)]
struct AppState {
    storage: Storage,
    registry: SessionRegistry,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        storage,
        registry: SessionRegistry::new(),
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "chat gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/chats/:lawyer_id/:client_id/messages",
            get(http_history),
        )
        .route("/api/lawyers/:lawyer_id/chats", get(http_conversation_list))
        .route("/ws/chat/:lawyer_id/:client_id/:role", get(room_ws_handler))
        .route("/ws/monitor/:lawyer_id", get(monitor_ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_history(
    State(state): State<Arc<AppState>>,
    Path((lawyer_id, client_id)): Path<(String, String)>,
) -> Result<Json<Vec<ChatMessage>>, (StatusCode, Json<ApiError>)> {
    let key = ConversationKey::new(LawyerId::new(lawyer_id), ClientId::new(client_id));
    let messages = state.storage.history(&key).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok(Json(messages.into_iter().map(ws::to_wire).collect()))
}

async fn http_conversation_list(
    State(state): State<Arc<AppState>>,
    Path(lawyer_id): Path<String>,
) -> Result<Json<Vec<ConversationSummary>>, (StatusCode, Json<ApiError>)> {
    let lawyer_id = LawyerId::new(lawyer_id);
    let conversations = state
        .storage
        .conversations_for_lawyer(&lawyer_id)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new(ErrorCode::Internal, e.to_string())),
            )
        })?;
    Ok(Json(
        conversations
            .into_iter()
            .map(|conversation| ConversationSummary {
                client_id: conversation.client_id,
                messages: conversation.messages.into_iter().map(ws::to_wire).collect(),
                last_updated: conversation.last_updated,
            })
            .collect(),
    ))
}

async fn room_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path((lawyer_id, client_id, role)): Path<(String, String, String)>,
) -> axum::response::Response {
    let role = match role.parse::<ParticipantRole>() {
        Ok(role) => role,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiError::new(ErrorCode::Validation, e.to_string())),
            )
                .into_response();
        }
    };
    let key = ConversationKey::new(LawyerId::new(lawyer_id), ClientId::new(client_id));
    ws.on_upgrade(move |socket| ws::room_connection(state, socket, key, role))
        .into_response()
}

async fn monitor_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(lawyer_id): Path<String>,
) -> impl IntoResponse {
    let lawyer_id = LawyerId::new(lawyer_id);
    ws.on_upgrade(move |socket| ws::monitor_connection(state, socket, lawyer_id))
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
