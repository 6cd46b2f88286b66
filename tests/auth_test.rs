use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::routing::get;

use sitewire::backend::BackendClient;
use sitewire::error::Error;
use sitewire::gateway::GatewayHandler;
use sitewire::options::ServerOptions;
use sitewire::registry::ConnectionRegistry;

async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service()).await.unwrap();
    });
    format!("http://{addr}")
}

fn identity_backend(user: &'static str, user_type: &'static str) -> Router {
    Router::new().route(
        "/api/method/realtime.get_user_info",
        get(move || async move {
            Json(serde_json::json!({
                "message": {
                    "user": user,
                    "user_type": user_type,
                    "installed_apps": ["frappe"],
                }
            }))
        }),
    )
}

fn rejecting_backend(status: StatusCode) -> Router {
    Router::new().route(
        "/api/method/realtime.get_user_info",
        get(move || async move { status }),
    )
}

fn make_handler(default_site: Option<&str>) -> GatewayHandler {
    let mut options = ServerOptions::default();
    options.default_site = default_site.map(str::to_string);
    let backend = BackendClient::new(&options.backend).unwrap();
    GatewayHandler::new(Arc::new(ConnectionRegistry::new()), backend, options)
}

fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.append(
            HeaderName::try_from(*name).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    map
}

#[tokio::test]
async fn test_admits_valid_connection() {
    let base = spawn_backend(identity_backend("alice", "System User")).await;
    let handler = make_handler(Some("site1.test"));

    let request = headers(&[
        ("host", "127.0.0.1:9000"),
        ("origin", base.as_str()),
        ("cookie", "sid=abc"),
    ]);
    let context = handler.authenticate("site1.test", &request).await.unwrap();

    assert_eq!(context.site, "site1.test");
    assert_eq!(context.backend_base, base);
    assert_eq!(context.credential.sid.as_deref(), Some("abc"));
    assert_eq!(context.user_info.user, "alice");
    assert_eq!(context.user_info.user_type, "System User");
    assert_eq!(context.user_info.installed_apps, vec!["frappe"]);
}

#[tokio::test]
async fn test_rejects_namespace_mismatch() {
    let handler = make_handler(Some("site1.test"));
    let request = headers(&[
        ("host", "127.0.0.1:9000"),
        ("origin", "http://127.0.0.1:9000"),
        ("cookie", "sid=abc"),
    ]);

    // The socket was opened against a different site's namespace.
    let result = handler.authenticate("site2.test", &request).await;
    assert!(matches!(result, Err(Error::InvalidNamespace(_))));
}

#[tokio::test]
async fn test_rejects_host_origin_mismatch() {
    let handler = make_handler(Some("site1.test"));
    let request = headers(&[
        ("host", "127.0.0.1:9000"),
        ("origin", "https://evil.test"),
        ("cookie", "sid=abc"),
    ]);

    let result = handler.authenticate("site1.test", &request).await;
    assert!(matches!(result, Err(Error::InvalidOrigin(_))));
}

#[tokio::test]
async fn test_rejects_missing_credential() {
    let handler = make_handler(Some("site1.test"));
    let request = headers(&[
        ("host", "127.0.0.1:9000"),
        ("origin", "http://127.0.0.1:9000"),
    ]);

    let result = handler.authenticate("site1.test", &request).await;
    assert!(matches!(result, Err(Error::MissingCredential)));
}

#[tokio::test]
async fn test_rejects_failed_identity_lookup() {
    let base = spawn_backend(rejecting_backend(StatusCode::UNAUTHORIZED)).await;
    let handler = make_handler(Some("site1.test"));

    let request = headers(&[
        ("host", "127.0.0.1:9000"),
        ("origin", base.as_str()),
        ("cookie", "sid=expired"),
    ]);
    let result = handler.authenticate("site1.test", &request).await;
    assert!(matches!(result, Err(Error::Unauthorized(_))));
}

#[tokio::test]
async fn test_rejects_unreachable_backend() {
    // Grab an ephemeral port and release it so the connection is refused.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let handler = make_handler(Some("site1.test"));
    let request = headers(&[
        ("host", "127.0.0.1:9000"),
        ("origin", format!("http://{addr}").as_str()),
        ("cookie", "sid=abc"),
    ]);
    let result = handler.authenticate("site1.test", &request).await;
    assert!(matches!(result, Err(Error::Unauthorized(_))));
}

#[tokio::test]
async fn test_site_header_alone_cannot_reach_backend() {
    // An explicit site header resolves the namespace, but without an Origin
    // there is no backend address to verify identity against.
    let handler = make_handler(None);
    let request = headers(&[("x-site-name", "site1.test"), ("cookie", "sid=abc")]);

    let result = handler.authenticate("site1.test", &request).await;
    assert!(matches!(result, Err(Error::Unauthorized(_))));
}

#[tokio::test]
async fn test_site_resolution_prefers_origin_over_host() {
    let base = spawn_backend(identity_backend("bob", "Website User")).await;
    let handler = make_handler(None);

    // Host and Origin hostnames match (both loopback); with no default site
    // configured, the site comes from the Origin hostname.
    let request = headers(&[
        ("host", "127.0.0.1:9000"),
        ("origin", base.as_str()),
        ("authorization", "token api-key:api-secret"),
    ]);
    let context = handler.authenticate("127.0.0.1", &request).await.unwrap();

    assert_eq!(context.site, "127.0.0.1");
    assert_eq!(
        context.credential.authorization.as_deref(),
        Some("token api-key:api-secret")
    );
    assert_eq!(context.user_info.user, "bob");
}
