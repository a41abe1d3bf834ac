// WebSocket surface of the relay: upgrade route and connection handoff.

mod handler;
mod session;

pub use session::{ChatSession, DropReason};

use crate::error::{
    request_id_from_headers_or_generate, with_request_id_scope, ErrorCode, RelayError,
};
use crate::rooms::RoomRegistry;
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Path, Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use huddle_common::types::ConnectIdentity;
use serde::Deserialize;

pub(crate) const MAX_FRAME_BYTES: usize = 65_536;

#[derive(Clone)]
pub struct RelayRouterState {
    registry: RoomRegistry,
}

/// Identity tuple injected into the upgrade URL by the upstream gateway
/// after it has authenticated the caller. The relay trusts these values and
/// validates no credentials itself.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub user_id: String,
    pub user_name: String,
    pub user_role: String,
}

pub fn router(registry: RoomRegistry) -> Router {
    Router::new()
        .route("/v1/rooms/{room_id}/ws", get(ws_upgrade))
        .with_state(RelayRouterState { registry })
}

pub async fn ws_upgrade(
    Path(room_id): Path<String>,
    Query(query): Query<ConnectQuery>,
    State(state): State<RelayRouterState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> impl IntoResponse {
    // Identity validation runs before the upgrade is attempted so a blank
    // tuple is rejected with a structured error, not a handshake failure.
    let fields = [
        ("room_id", room_id.as_str()),
        ("user_id", query.user_id.as_str()),
        ("user_name", query.user_name.as_str()),
        ("user_role", query.user_role.as_str()),
    ];
    for (field, value) in fields {
        if value.trim().is_empty() {
            return RelayError::new(ErrorCode::ValidationFailed, format!("`{field}` must not be blank"))
                .into_response();
        }
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let identity = ConnectIdentity::new(query.user_id, query.user_name, query.user_role);
    let session = ChatSession::new(room_id, identity);
    let registry = state.registry.clone();
    let request_id = request_id_from_headers_or_generate(&headers);

    ws.max_frame_size(MAX_FRAME_BYTES).on_upgrade(move |socket| async move {
        with_request_id_scope(request_id, handler::handle_socket(registry, session, socket)).await;
    })
}
