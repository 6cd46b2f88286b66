use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use fastwebsockets::upgrade;
use tracing::{debug, warn};

use crate::gateway::GatewayHandler;

// WebSocket upgrade handler. The authentication gate runs before the 101 is
// sent, so a rejected connection fails as a plain HTTP error and no socket
// state is ever created for it.
pub async fn handle_ws_upgrade(
    Path(site): Path<String>,
    headers: HeaderMap,
    State(handler): State<Arc<GatewayHandler>>,
    ws: upgrade::IncomingUpgrade,
) -> Response {
    let context = match handler.authenticate(&site, &headers).await {
        Ok(context) => context,
        Err(e) => {
            warn!(site = %site, error = %e, "connection rejected");
            return (e.http_status(), e.to_string()).into_response();
        }
    };

    let (response, fut) = match ws.upgrade() {
        Ok(upgraded) => upgraded,
        Err(e) => {
            warn!(site = %site, error = %e, "websocket upgrade failed");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };
    tokio::task::spawn(async move {
        if let Err(e) = handler.handle_socket(fut, context).await {
            debug!(error = %e, "socket ended with error");
        }
    });
    response.into_response()
}
