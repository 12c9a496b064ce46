//! WebDriver classic "new session" shapes.
//!
//! The launcher speaks a minimal slice of the WebDriver HTTP protocol to
//! chromedriver: enough to create a session with the `webSocketUrl`
//! capability and read back the BiDi endpoint. Everything after that happens
//! over the WebSocket and is opaque to the proxy.

use serde::{Deserialize, Serialize};

/// `POST /session` request body.
#[derive(Debug, Clone, Serialize)]
pub struct NewSessionRequest {
    pub capabilities: CapabilitiesRequest,
}

/// Capabilities wrapper; only `alwaysMatch` is used.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilitiesRequest {
    #[serde(rename = "alwaysMatch")]
    pub always_match: Capabilities,
}

/// Requested session capabilities.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    #[serde(rename = "browserName")]
    pub browser_name: String,

    /// Asks the driver to expose a BiDi WebSocket endpoint for the session.
    #[serde(rename = "webSocketUrl")]
    pub web_socket_url: bool,

    #[serde(rename = "goog:chromeOptions")]
    pub chrome_options: ChromeOptions,
}

/// Chrome-specific launch arguments.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChromeOptions {
    pub args: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
}

impl NewSessionRequest {
    /// Builds a BiDi-enabled Chrome session request.
    pub fn bidi_chrome(chrome_options: ChromeOptions) -> Self {
        Self {
            capabilities: CapabilitiesRequest {
                always_match: Capabilities {
                    browser_name: "chrome".to_string(),
                    web_socket_url: true,
                    chrome_options,
                },
            },
        }
    }
}

/// `POST /session` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSessionResponse {
    pub value: NewSessionValue,
}

/// Value payload of a new-session response.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSessionValue {
    #[serde(rename = "sessionId")]
    pub session_id: String,

    pub capabilities: SessionCapabilities,
}

/// Capabilities echoed back by the driver.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionCapabilities {
    /// BiDi endpoint address; absent if the driver does not support BiDi.
    #[serde(rename = "webSocketUrl")]
    pub web_socket_url: Option<String>,
}

/// `GET /status` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub value: StatusValue,
}

/// Value payload of a status response.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusValue {
    pub ready: bool,
}
