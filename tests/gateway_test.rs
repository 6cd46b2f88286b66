use std::future::Future;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::routing::get;
use fastwebsockets::{Frame, OpCode, Payload, WebSocket, WebSocketError, handshake};
use http_body_util::Empty;
use hyper::body::Bytes;
use hyper::header::{CONNECTION, COOKIE, HOST, ORIGIN, UPGRADE};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};

use sitewire::backend::BackendClient;
use sitewire::gateway::GatewayHandler;
use sitewire::options::ServerOptions;
use sitewire::protocol::messages::EventMessage;
use sitewire::registry::ConnectionRegistry;
use sitewire::{http_handler, ws_handler};

struct SpawnExecutor;

impl<Fut> hyper::rt::Executor<Fut> for SpawnExecutor
where
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    fn execute(&self, fut: Fut) {
        tokio::task::spawn(fut);
    }
}

fn identity_backend() -> Router {
    Router::new().route(
        "/api/method/realtime.get_user_info",
        get(|| async {
            Json(serde_json::json!({
                "message": {
                    "user": "alice",
                    "user_type": "System User",
                    "installed_apps": [],
                }
            }))
        }),
    )
}

async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service()).await.unwrap();
    });
    addr.to_string()
}

/// Spins up the gateway with the same router wiring the binary uses.
async fn spawn_gateway() -> String {
    let mut options = ServerOptions::default();
    options.default_site = Some("site1.test".to_string());
    let backend = BackendClient::new(&options.backend).unwrap();
    let handler = Arc::new(GatewayHandler::new(
        Arc::new(ConnectionRegistry::new()),
        backend,
        options,
    ));
    let router = Router::new()
        .route("/up", get(http_handler::up))
        .route("/{site}", get(ws_handler::handle_ws_upgrade))
        .with_state(handler);
    spawn_server(router).await
}

async fn connect(
    gateway: &str,
    origin: &str,
    cookie: Option<&str>,
) -> Result<WebSocket<TokioIo<Upgraded>>, WebSocketError> {
    let stream = TcpStream::connect(gateway).await.unwrap();
    let mut request = hyper::Request::builder()
        .method("GET")
        .uri(format!("http://{gateway}/site1.test"))
        .header(HOST, gateway)
        .header(ORIGIN, origin)
        .header(UPGRADE, "websocket")
        .header(CONNECTION, "upgrade")
        .header("Sec-WebSocket-Key", handshake::generate_key())
        .header("Sec-WebSocket-Version", "13");
    if let Some(cookie) = cookie {
        request = request.header(COOKIE, cookie);
    }
    let request = request.body(Empty::<Bytes>::new()).unwrap();
    let (ws, _response) = handshake::client(&SpawnExecutor, request, stream).await?;
    Ok(ws)
}

#[tokio::test]
async fn test_protocol_ping_is_answered() {
    let backend = spawn_server(identity_backend()).await;
    let gateway = spawn_gateway().await;

    let mut ws = connect(&gateway, &format!("http://{backend}"), Some("sid=abc"))
        .await
        .unwrap();
    ws.write_frame(Frame::new(
        true,
        OpCode::Ping,
        None,
        Payload::Owned(b"keepalive".to_vec()),
    ))
    .await
    .unwrap();

    let frame = ws.read_frame().await.unwrap();
    assert_eq!(frame.opcode, OpCode::Pong);
    assert_eq!(frame.payload.to_vec(), b"keepalive".to_vec());
}

#[tokio::test]
async fn test_ping_event_round_trip() {
    let backend = spawn_server(identity_backend()).await;
    let gateway = spawn_gateway().await;

    let mut ws = connect(&gateway, &format!("http://{backend}"), Some("sid=abc"))
        .await
        .unwrap();
    ws.write_frame(Frame::text(Payload::Owned(br#"{"event":"ping"}"#.to_vec())))
        .await
        .unwrap();

    let frame = ws.read_frame().await.unwrap();
    assert_eq!(frame.opcode, OpCode::Text);
    let reply: EventMessage = serde_json::from_slice(&frame.payload).unwrap();
    assert_eq!(reply.event, "pong");
}

#[tokio::test]
async fn test_upgrade_without_credential_is_refused() {
    let backend = spawn_server(identity_backend()).await;
    let gateway = spawn_gateway().await;

    let result = connect(&gateway, &format!("http://{backend}"), None).await;
    assert!(matches!(
        result,
        Err(WebSocketError::InvalidStatusCode(401))
    ));
}

#[tokio::test]
async fn test_health_endpoint() {
    let gateway = spawn_gateway().await;

    let response = reqwest::get(format!("http://{gateway}/up")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers().get("X-Health-Check").unwrap(), "OK");
    assert_eq!(response.text().await.unwrap(), "OK");
}
