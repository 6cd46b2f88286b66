use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Gateway configuration. Every field has a default so a partial JSON config
/// file (or none at all) is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    pub debug: bool,
    pub host: String,
    pub port: u16,
    /// Site assumed for connections arriving on a loopback host. Connections
    /// from real hostnames resolve their site from Origin/Host instead.
    pub default_site: Option<String>,
    pub redis: RedisConnection,
    pub backend: BackendOptions,
    pub websocket: WebSocketOptions,
    /// Seconds to wait after closing connections during shutdown.
    pub shutdown_grace_period_secs: u64,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            debug: false,
            host: "0.0.0.0".to_string(),
            port: 9000,
            default_site: None,
            redis: RedisConnection::default(),
            backend: BackendOptions::default(),
            websocket: WebSocketOptions::default(),
            shutdown_grace_period_secs: 3,
        }
    }
}

impl ServerOptions {
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("failed to read config file {path}: {e}")))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("failed to parse config file {path}: {e}")))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Environment overrides, applied after the config file is loaded so the
    /// environment always wins. File values stand for anything not set here;
    /// these are the deploy-time knobs.
    pub fn override_from_env(&mut self) {
        if let Ok(debug) = std::env::var("DEBUG") {
            self.debug = debug == "1" || debug.to_lowercase() == "true";
        }
        if let Ok(host) = std::env::var("HOST") {
            self.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            match port_str.parse() {
                Ok(port) => self.port = port,
                Err(_) => eprintln!("[CONFIG-WARN] Failed to parse PORT env var: '{port_str}'"),
            }
        }
        if let Ok(site) = std::env::var("DEFAULT_SITE") {
            self.default_site = Some(site);
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.redis.url = Some(url);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConnection {
    /// Full connection URL. Takes precedence over host/port/db when set.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub db: i64,
    /// Pub/sub channel the backend publishes events on.
    pub channel: String,
}

impl Default for RedisConnection {
    fn default() -> Self {
        Self {
            url: None,
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            channel: "events".to_string(),
        }
    }
}

impl RedisConnection {
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendOptions {
    /// Bound on every identity and authorization call. A hung backend must
    /// not hang a connection handshake indefinitely.
    pub request_timeout_ms: u64,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketOptions {
    pub max_payload_kb: usize,
    /// Depth of the per-connection outbound frame queue.
    pub outbound_queue_depth: usize,
}

impl Default for WebSocketOptions {
    fn default() -> Self {
        Self {
            max_payload_kb: 64,
            outbound_queue_depth: 256,
        }
    }
}
