use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

/// Live hub statistics: connected sessions and subscribers per room.
pub async fn get_gateway(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let snapshot = state.hub.snapshot().await?;
    let rooms: serde_json::Map<String, serde_json::Value> = snapshot
        .rooms
        .iter()
        .map(|(chat_id, sessions)| (chat_id.clone(), sessions.len().into()))
        .collect();

    Ok(Json(serde_json::json!({
        "data": {
            "url": "/ws",
            "sessions": snapshot.session_count(),
            "rooms": rooms,
            "limits": {
                "max_frame_bytes": state.limits.max_frame_bytes,
                "outbound_queue": state.limits.outbound_queue,
                "read_timeout_secs": state.limits.read_timeout.as_secs(),
                "ping_interval_secs": state.limits.ping_interval.as_secs(),
            }
        }
    })))
}
