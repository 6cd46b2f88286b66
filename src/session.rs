use std::fmt;
use std::sync::Mutex;

use axum::http::HeaderMap;
use axum::http::header;
use fastwebsockets::{Frame, OpCode, Payload, WebSocketRead, WebSocketWrite};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::error::{Error, Result};
use crate::gateway::events::DocTarget;
use crate::protocol::constants::SYSTEM_USER_TYPE;
use crate::protocol::messages::EventMessage;

pub type SocketReader = WebSocketRead<ReadHalf<TokioIo<Upgraded>>>;
pub type SocketWriter = WebSocketWrite<WriteHalf<TokioIo<Upgraded>>>;

/// Process-local connection identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketId(u64);

impl SocketId {
    pub fn new() -> Self {
        Self(rand::random())
    }
}

impl Default for SocketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Credentials captured from the connection request and replayed on every
/// backend call. Both fields may be present; `Authorization` wins when
/// building requests. Both may also be empty (cookie header without a `sid`
/// pair), in which case the backend resolves the caller to the guest user.
#[derive(Debug, Clone, Default)]
pub struct Credential {
    pub sid: Option<String>,
    pub authorization: Option<String>,
}

impl Credential {
    /// Returns `None` when neither a cookie header nor an `Authorization`
    /// header is present, which refuses the connection upstream.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let cookie_header = headers
            .get(header::COOKIE)
            .and_then(|value| value.to_str().ok());
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        if cookie_header.is_none() && authorization.is_none() {
            return None;
        }

        Some(Self {
            sid: cookie_header.and_then(|raw| cookie_value(raw, "sid")),
            authorization,
        })
    }

    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(authorization) = &self.authorization {
            request.header(reqwest::header::AUTHORIZATION, authorization)
        } else if let Some(sid) = &self.sid {
            request.header(reqwest::header::COOKIE, format!("sid={sid}"))
        } else {
            request
        }
    }
}

fn cookie_value(header: &str, name: &str) -> Option<String> {
    for part in header.split(';') {
        let mut iter = part.trim().splitn(2, '=');
        let key = iter.next()?.trim();
        if key != name {
            continue;
        }
        return iter.next().map(|value| value.trim().to_string());
    }
    None
}

/// Identity attached by the backend's `get_user_info` method.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub user: String,
    #[serde(default)]
    pub user_type: String,
    #[serde(default)]
    pub installed_apps: Vec<String>,
}

/// Everything the authentication gate established about a connection before
/// the websocket upgrade completed.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub site: String,
    pub backend_base: String,
    pub credential: Credential,
    pub user_info: UserInfo,
}

/// Hands frames to the writer task owning the websocket write half. Sends
/// never block; a full queue drops the frame and surfaces an error to the
/// caller instead of stalling a room fan-out.
#[derive(Clone)]
pub struct MessageSender {
    tx: mpsc::Sender<Frame<'static>>,
}

impl MessageSender {
    pub fn new(tx: mpsc::Sender<Frame<'static>>) -> Self {
        Self { tx }
    }

    pub fn spawn(mut writer: SocketWriter, queue_depth: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Frame<'static>>(queue_depth.max(1));
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let is_close = frame.opcode == OpCode::Close;
                if let Err(error) = writer.write_frame(frame).await {
                    debug!(error = %error, "websocket write failed");
                    break;
                }
                if is_close {
                    break;
                }
            }
        });
        Self::new(tx)
    }

    pub fn send_frame(&self, frame: Frame<'static>) -> Result<()> {
        self.tx.try_send(frame).map_err(|error| match error {
            TrySendError::Full(_) => Error::SendQueueFull,
            TrySendError::Closed(_) => Error::ConnectionClosed,
        })
    }
}

/// One connected client. Immutable identity fields are set once at admission;
/// the open-document list is the only mutable state and backs presence
/// recomputation on `doc_close` and disconnect.
pub struct Session {
    pub socket_id: SocketId,
    pub site: String,
    pub user: String,
    pub user_type: String,
    pub installed_apps: Vec<String>,
    pub credential: Credential,
    /// Base URL for backend calls, taken from the connection's Origin.
    pub backend_base: String,
    open_docs: Mutex<Vec<DocTarget>>,
    sender: MessageSender,
}

impl Session {
    pub fn new(context: AuthContext, sender: MessageSender) -> Self {
        Self {
            socket_id: SocketId::new(),
            site: context.site,
            user: context.user_info.user,
            user_type: context.user_info.user_type,
            installed_apps: context.user_info.installed_apps,
            credential: context.credential,
            backend_base: context.backend_base,
            open_docs: Mutex::new(Vec::new()),
            sender,
        }
    }

    pub fn is_system_user(&self) -> bool {
        self.user_type == SYSTEM_USER_TYPE
    }

    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }

    pub fn send_event(&self, message: &EventMessage) -> Result<()> {
        self.send_payload(serde_json::to_vec(message)?)
    }

    pub(crate) fn send_payload(&self, payload: Vec<u8>) -> Result<()> {
        self.sender
            .send_frame(Frame::text(Payload::Owned(payload)))
    }

    pub fn send_close(&self, code: u16, reason: &str) -> Result<()> {
        self.sender.send_frame(Frame::close(code, reason.as_bytes()))
    }

    /// Snapshot of the documents this client currently has open.
    pub fn open_docs(&self) -> Vec<DocTarget> {
        self.open_docs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn track_open_doc(&self, doc: &DocTarget) {
        let mut docs = self
            .open_docs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !docs.contains(doc) {
            docs.push(doc.clone());
        }
    }

    pub(crate) fn untrack_open_doc(&self, doc: &DocTarget) {
        self.open_docs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|entry| entry != doc);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("socket_id", &self.socket_id)
            .field("site", &self.site)
            .field("user", &self.user)
            .field("user_type", &self.user_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                axum::http::HeaderName::try_from(*name).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_socket_ids_are_distinct() {
        let a = SocketId::new();
        let b = SocketId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 16);
    }

    #[test]
    fn test_cookie_value_extraction() {
        assert_eq!(
            cookie_value("sid=abc123; user_id=alice", "sid").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            cookie_value("user_id=alice;  sid=xyz", "sid").as_deref(),
            Some("xyz")
        );
        assert_eq!(cookie_value("user_id=alice", "sid"), None);
        assert_eq!(cookie_value("", "sid"), None);
    }

    #[test]
    fn test_credential_requires_some_header() {
        assert!(Credential::from_headers(&headers(&[])).is_none());

        let with_cookie = Credential::from_headers(&headers(&[("cookie", "sid=abc")])).unwrap();
        assert_eq!(with_cookie.sid.as_deref(), Some("abc"));
        assert!(with_cookie.authorization.is_none());

        let with_auth =
            Credential::from_headers(&headers(&[("authorization", "token k:s")])).unwrap();
        assert!(with_auth.sid.is_none());
        assert_eq!(with_auth.authorization.as_deref(), Some("token k:s"));
    }

    #[test]
    fn test_cookie_header_without_sid_still_counts() {
        // The gate only requires the header to exist; the backend then
        // resolves the sessionless call to the guest user.
        let credential = Credential::from_headers(&headers(&[("cookie", "theme=dark")])).unwrap();
        assert!(credential.sid.is_none());
        assert!(credential.authorization.is_none());
    }

    #[tokio::test]
    async fn test_send_frame_reports_full_queue() {
        let (tx, _rx) = mpsc::channel(1);
        let sender = MessageSender::new(tx);
        sender
            .send_frame(Frame::text(Payload::Owned(b"one".to_vec())))
            .unwrap();
        let err = sender
            .send_frame(Frame::text(Payload::Owned(b"two".to_vec())))
            .unwrap_err();
        assert!(matches!(err, Error::SendQueueFull));
    }

    #[tokio::test]
    async fn test_open_doc_tracking_deduplicates() {
        let (tx, _rx) = mpsc::channel(4);
        let session = Session::new(
            AuthContext {
                site: "site1.test".into(),
                backend_base: "http://site1.test".into(),
                credential: Credential::default(),
                user_info: UserInfo {
                    user: "alice".into(),
                    user_type: "System User".into(),
                    installed_apps: vec![],
                },
            },
            MessageSender::new(tx),
        );
        assert!(session.is_system_user());

        let doc = DocTarget {
            doctype: "Task".into(),
            docname: "T-1".into(),
        };
        session.track_open_doc(&doc);
        session.track_open_doc(&doc);
        assert_eq!(session.open_docs().len(), 1);

        session.untrack_open_doc(&doc);
        assert!(session.open_docs().is_empty());
    }
}
