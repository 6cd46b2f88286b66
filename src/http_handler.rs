use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use tracing::{debug, instrument};

use crate::gateway::GatewayHandler;

/// GET /up
#[instrument(skip(handler), fields(service = "health"))]
pub async fn up(State(handler): State<Arc<GatewayHandler>>) -> impl IntoResponse {
    debug!(
        connections = handler.registry.socket_count(),
        rooms = handler.registry.room_count(),
        "health check"
    );
    ([("X-Health-Check", "OK")], "OK")
}
