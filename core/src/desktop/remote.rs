//! HTTP-backed desktop session.
//!
//! Speaks the sandbox backend's REST surface: one resource per session,
//! automation primitives as POSTs underneath it. The session itself is
//! resolved lazily on the first primitive and cached for the rest of the
//! interaction.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;

use crate::action::{Point, ScrollDirection};
use crate::error::{DeskpilotError, Result};

use super::{DesktopConfig, DesktopSession, ShellOutput, DISPLAY_HEIGHT, DISPLAY_WIDTH};

/// Geometry reported by the backend when a session resolves.
#[derive(Debug, Clone, Copy, Deserialize)]
struct SessionInfo {
    #[serde(default = "default_width")]
    width: u32,
    #[serde(default = "default_height")]
    height: u32,
}

fn default_width() -> u32 {
    DISPLAY_WIDTH
}

fn default_height() -> u32 {
    DISPLAY_HEIGHT
}

pub struct RemoteDesktop {
    session_id: String,
    config: DesktopConfig,
    http_client: HttpClient,
    resolved: OnceCell<SessionInfo>,
}

impl RemoteDesktop {
    pub fn new(session_id: impl Into<String>, config: DesktopConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("deskpilot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeskpilotError::InvalidConfig {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            session_id: session_id.into(),
            config,
            http_client,
            resolved: OnceCell::new(),
        })
    }

    fn session_url(&self) -> String {
        format!(
            "{}/sessions/{}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.session_id)
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.session_url(), path)
    }

    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = &self.config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
                DeskpilotError::InvalidConfig {
                    message: "desktop API key contains invalid header characters".to_string(),
                }
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Resolves the session on first use and caches the result.
    async fn resolve(&self) -> Result<&SessionInfo> {
        self.resolved
            .get_or_try_init(|| async {
                let response = self
                    .http_client
                    .post(self.endpoint("connect"))
                    .headers(self.build_headers()?)
                    .send()
                    .await
                    .map_err(|e| DeskpilotError::SessionUnavailable {
                        session_id: self.session_id.clone(),
                        reason: e.to_string(),
                    })?;
                match response.status() {
                    StatusCode::OK => {
                        let info: SessionInfo = response.json().await.map_err(|e| {
                            DeskpilotError::MalformedResponse {
                                detail: format!("session info: {e}"),
                            }
                        })?;
                        log::info!(
                            "resolved desktop session {} ({}x{})",
                            self.session_id,
                            info.width,
                            info.height
                        );
                        Ok(info)
                    }
                    status => Err(DeskpilotError::SessionUnavailable {
                        session_id: self.session_id.clone(),
                        reason: format!("connect returned {status}: {}", error_body(response).await),
                    }),
                }
            })
            .await
    }

    /// POSTs a primitive under the session resource, discarding the body.
    async fn post_action(&self, path: &str, body: serde_json::Value) -> Result<()> {
        self.resolve().await?;
        let response = self
            .http_client
            .post(self.endpoint(path))
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeskpilotError::DesktopRequest {
                message: e.to_string(),
            })?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(DeskpilotError::DesktopBackend {
        status: status.as_u16(),
        message: error_body(response).await,
    })
}

/// Pulls the backend's own message out of an error response.
async fn error_body(response: Response) -> String {
    let raw = match response.text().await {
        Ok(text) => text,
        Err(_) => return "unknown error".to_string(),
    };
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
        if let Some(message) = value.get("error").and_then(|v| v.as_str()) {
            return message.to_string();
        }
    }
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        "unknown error".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl DesktopSession for RemoteDesktop {
    fn id(&self) -> &str {
        &self.session_id
    }

    async fn capture(&self) -> Result<Vec<u8>> {
        self.resolve().await?;
        let response = self
            .http_client
            .post(self.endpoint("screenshot"))
            .headers(self.build_headers()?)
            .send()
            .await
            .map_err(|e| DeskpilotError::DesktopRequest {
                message: e.to_string(),
            })?;
        let response = check_status(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DeskpilotError::DesktopRequest {
                message: format!("reading screenshot body: {e}"),
            })?;
        Ok(bytes.to_vec())
    }

    async fn move_pointer(&self, x: i32, y: i32) -> Result<()> {
        self.post_action("mouse/move", json!({ "x": x, "y": y })).await
    }

    async fn left_click(&self) -> Result<()> {
        self.post_action("mouse/click", json!({ "button": "left" })).await
    }

    async fn double_click(&self) -> Result<()> {
        self.post_action("mouse/click", json!({ "button": "left", "double": true }))
            .await
    }

    async fn right_click(&self) -> Result<()> {
        self.post_action("mouse/click", json!({ "button": "right" })).await
    }

    async fn drag(&self, from: Point, to: Point) -> Result<()> {
        self.post_action(
            "mouse/drag",
            json!({ "from": [from.x(), from.y()], "to": [to.x(), to.y()] }),
        )
        .await
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.post_action("keyboard/type", json!({ "text": text })).await
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.post_action("keyboard/key", json!({ "key": key })).await
    }

    async fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<()> {
        self.post_action(
            "scroll",
            json!({ "direction": direction, "amount": amount }),
        )
        .await
    }

    async fn run_command(&self, command: &str) -> Result<ShellOutput> {
        self.resolve().await?;
        let response = self
            .http_client
            .post(self.endpoint("shell"))
            .headers(self.build_headers()?)
            .json(&json!({ "command": command }))
            .send()
            .await
            .map_err(|e| DeskpilotError::DesktopRequest {
                message: e.to_string(),
            })?;
        let response = check_status(response).await?;
        response
            .json::<ShellOutput>()
            .await
            .map_err(|e| DeskpilotError::MalformedResponse {
                detail: format!("shell output: {e}"),
            })
    }

    // No resolve here: teardown must succeed even when the session was
    // never touched.
    async fn destroy(&self) -> Result<()> {
        let response = self
            .http_client
            .delete(self.session_url())
            .headers(self.build_headers()?)
            .send()
            .await
            .map_err(|e| DeskpilotError::DesktopRequest {
                message: e.to_string(),
            })?;
        match response.status() {
            status if status.is_success() => Ok(()),
            // already gone counts as torn down
            StatusCode::NOT_FOUND => Ok(()),
            status => Err(DeskpilotError::DesktopBackend {
                status: status.as_u16(),
                message: error_body(response).await,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desktop(base_url: &str) -> RemoteDesktop {
        RemoteDesktop::new(
            "sess-42",
            DesktopConfig {
                base_url: base_url.to_string(),
                api_key: None,
                timeout_secs: 5,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_shapes() {
        let desktop = desktop("http://sandbox.local:8333");
        assert_eq!(
            desktop.session_url(),
            "http://sandbox.local:8333/sessions/sess-42"
        );
        assert_eq!(
            desktop.endpoint("mouse/move"),
            "http://sandbox.local:8333/sessions/sess-42/mouse/move"
        );
    }

    #[test]
    fn test_trailing_slash_and_encoding() {
        let desktop = RemoteDesktop::new(
            "sess/420",
            DesktopConfig {
                base_url: "http://sandbox.local:8333/".to_string(),
                api_key: None,
                timeout_secs: 5,
            },
        )
        .unwrap();
        assert_eq!(
            desktop.session_url(),
            "http://sandbox.local:8333/sessions/sess%2F420"
        );
    }

    #[test]
    fn test_bearer_header_only_with_key() {
        let plain = desktop("http://x");
        assert!(plain.build_headers().unwrap().get(AUTHORIZATION).is_none());

        let desktop = RemoteDesktop::new(
            "s",
            DesktopConfig {
                base_url: "http://x".to_string(),
                api_key: Some("sk-123".to_string()),
                timeout_secs: 5,
            },
        )
        .unwrap();
        let headers = desktop.build_headers().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sk-123");
    }

    #[test]
    fn test_shell_output_defaults() {
        let output: ShellOutput = serde_json::from_str(r#"{"stdout":"hi"}"#).unwrap();
        assert_eq!(output.stdout, "hi");
        assert_eq!(output.stderr, "");
        assert_eq!(output.exit_code, 0);
    }
}
