use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::options::BackendOptions;
use crate::session::{Credential, UserInfo};

const USER_INFO_METHOD: &str = "/api/method/realtime.get_user_info";
const CAN_SUBSCRIBE_DOCTYPE_METHOD: &str = "/api/method/realtime.can_subscribe_doctype";
const CAN_SUBSCRIBE_DOC_METHOD: &str = "/api/method/realtime.can_subscribe_doc";

#[derive(serde::Deserialize)]
struct UserInfoResponse {
    message: UserInfo,
}

/// HTTP client for the web backend. The base URL is per-connection (derived
/// from the socket's Origin, same-origin deployment assumed), so only the
/// client itself is shared. Every call is bounded by the configured timeout
/// and never retried: identity is valid-or-not within a single handshake,
/// and authorization checks fail closed.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(options: &BackendOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(options.request_timeout_ms))
            .build()?;
        Ok(Self { http })
    }

    /// Resolves the connecting user's identity. Any failure (network,
    /// timeout, non-2xx, bad body) rejects the connection attempt.
    pub async fn get_user_info(&self, base: &str, credential: &Credential) -> Result<UserInfo> {
        let url = format!("{base}{USER_INFO_METHOD}");
        let response = credential.apply(self.http.get(&url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Unauthorized(format!(
                "identity endpoint returned {status}"
            )));
        }
        let body: UserInfoResponse = response.json().await?;
        Ok(body.message)
    }

    pub async fn can_subscribe_doctype(
        &self,
        base: &str,
        credential: &Credential,
        doctype: &str,
    ) -> bool {
        self.check_authorized(
            format!("{base}{CAN_SUBSCRIBE_DOCTYPE_METHOD}"),
            credential,
            &[("doctype", doctype)],
        )
        .await
    }

    pub async fn can_subscribe_doc(
        &self,
        base: &str,
        credential: &Credential,
        doctype: &str,
        docname: &str,
    ) -> bool {
        self.check_authorized(
            format!("{base}{CAN_SUBSCRIBE_DOC_METHOD}"),
            credential,
            &[("doctype", doctype), ("docname", docname)],
        )
        .await
    }

    /// 200 authorizes. 403 denies without noise: the client must not learn
    /// whether the resource exists. Anything else also denies but is logged.
    async fn check_authorized(
        &self,
        url: String,
        credential: &Credential,
        params: &[(&str, &str)],
    ) -> bool {
        let request = credential.apply(self.http.get(&url)).query(params);
        match request.send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) if response.status() == StatusCode::FORBIDDEN => {
                debug!(url = %url, "subscription denied");
                false
            }
            Ok(response) => {
                warn!(url = %url, status = %response.status(), "authorization check failed");
                false
            }
            Err(error) => {
                warn!(url = %url, error = %error, "authorization check unreachable");
                false
            }
        }
    }
}
