use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The namespace path does not match the site resolved from the request
    /// headers, or no site could be resolved at all.
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    /// The `Host` and `Origin` hostnames disagree.
    #[error("invalid origin: {0}")]
    InvalidOrigin(String),

    /// Neither a cookie header nor an `Authorization` header was sent.
    #[error("no cookie or authorization header")]
    MissingCredential,

    /// Identity lookup against the backend failed; the connection is refused.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid event payload: {0}")]
    InvalidEventPayload(String),

    /// The per-connection outbound queue is full; the frame was dropped.
    #[error("send queue full")]
    SendQueueFull,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("websocket error: {0}")]
    WebSocket(#[from] fastwebsockets::WebSocketError),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("backend request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Status returned when a connection is refused before the upgrade.
    /// Clients see a failed connection attempt, never the raw cause.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Error::InvalidNamespace(_) | Error::InvalidOrigin(_) => StatusCode::FORBIDDEN,
            Error::MissingCredential | Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::InvalidEventPayload(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
