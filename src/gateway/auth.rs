use axum::http::uri::Authority;
use axum::http::{HeaderMap, Uri, header};
use tracing::debug;

use super::GatewayHandler;
use crate::error::{Error, Result};
use crate::protocol::constants::SITE_NAME_HEADER;
use crate::session::{AuthContext, Credential};

const LOOPBACK_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

impl GatewayHandler {
    /// Connection gate, run once per upgrade request before the 101 is sent.
    /// Exactly two outcomes: a complete `AuthContext`, or a typed rejection
    /// that maps to an HTTP error response. The identity lookup is bounded
    /// by the backend client's timeout, so a hung backend cannot pin the
    /// handshake open indefinitely.
    pub async fn authenticate(&self, namespace: &str, headers: &HeaderMap) -> Result<AuthContext> {
        let site = resolve_site_name(headers, self.options.default_site.as_deref()).ok_or_else(
            || Error::InvalidNamespace("could not resolve a site for this connection".to_string()),
        )?;
        if namespace != site {
            return Err(Error::InvalidNamespace(format!(
                "namespace {namespace} does not belong to site {site}"
            )));
        }

        let host = header_hostname(headers, header::HOST.as_str());
        let origin = header_hostname(headers, header::ORIGIN.as_str());
        if host != origin {
            return Err(Error::InvalidOrigin(format!(
                "host {} does not match origin {}",
                host.as_deref().unwrap_or("<missing>"),
                origin.as_deref().unwrap_or("<missing>")
            )));
        }

        let credential = Credential::from_headers(headers).ok_or(Error::MissingCredential)?;

        let backend_base = backend_base(headers).ok_or_else(|| {
            Error::Unauthorized("connection carries no usable origin for identity lookup".to_string())
        })?;
        let user_info = self
            .backend
            .get_user_info(&backend_base, &credential)
            .await
            .map_err(|error| match error {
                Error::Unauthorized(_) => error,
                other => Error::Unauthorized(format!("identity lookup failed: {other}")),
            })?;
        debug!(site = %site, user = %user_info.user, "socket authenticated");

        Ok(AuthContext {
            site,
            backend_base,
            credential,
            user_info,
        })
    }
}

/// Derives the tenant site for a connection, in priority order: an explicit
/// site-name header, the configured default site when the request arrived on
/// a loopback host, the Origin hostname, and finally the Host hostname.
pub fn resolve_site_name(headers: &HeaderMap, default_site: Option<&str>) -> Option<String> {
    if let Some(value) = header_str(headers, SITE_NAME_HEADER) {
        return hostname(value);
    }

    let host = header_str(headers, header::HOST.as_str()).and_then(hostname);
    if let Some(default) = default_site
        && host
            .as_deref()
            .is_some_and(|name| LOOPBACK_HOSTS.contains(&name))
    {
        return Some(default.to_string());
    }

    if let Some(origin) = header_str(headers, header::ORIGIN.as_str())
        && let Some(name) = hostname(origin)
    {
        return Some(name);
    }

    host
}

/// Extracts the bare hostname from a header value, stripping scheme, port
/// and path. Handles both origin-form (`https://example.com:8443`) and
/// host-form (`example.com:9000`) values.
pub fn hostname(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if value.contains("://") {
        let uri: Uri = value.parse().ok()?;
        return uri.host().map(str::to_string);
    }
    value
        .parse::<Authority>()
        .ok()
        .map(|authority| authority.host().to_string())
}

/// Base URL for backend calls, taken from the Origin header. The gateway has
/// no independent knowledge of the backend's address; deployment is assumed
/// same-origin.
pub fn backend_base(headers: &HeaderMap) -> Option<String> {
    let origin = header_str(headers, header::ORIGIN.as_str())?
        .trim()
        .trim_end_matches('/');
    let uri: Uri = origin.parse().ok()?;
    if uri.scheme().is_none() || uri.host().is_none() {
        return None;
    }
    Some(origin.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn header_hostname(headers: &HeaderMap, name: &str) -> Option<String> {
    header_str(headers, name).and_then(hostname)
}
