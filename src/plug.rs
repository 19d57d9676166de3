//! Smart plug adapters
//!
//! Outlets are switched through relay-style HTTP plugs: `GET /relay/{channel}`
//! reports the relay, `GET /relay/{channel}?turn=on|off` switches it, and both
//! answer with a JSON body carrying `ison`.

use crate::config::PlugEndpoint;
use crate::error::{HeliosError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Relay state as reported by the plug
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlugState {
    On,
    Off,
    #[default]
    Unknown,
}

impl PlugState {
    pub const fn from_bool(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }

    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Self::On => Some(true),
            Self::Off => Some(false),
            Self::Unknown => None,
        }
    }
}

/// Anything that can switch one outlet
#[async_trait::async_trait]
pub trait OutletSwitch: Send + Sync {
    async fn set_state(&self, on: bool) -> Result<()>;

    async fn get_state(&self) -> Result<PlugState>;
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    ison: Option<bool>,
}

/// Read the relay state out of a plug response body
pub fn parse_relay_response(body: &str) -> Result<PlugState> {
    let parsed: RelayResponse = serde_json::from_str(body)?;
    Ok(parsed.ison.map_or(PlugState::Unknown, PlugState::from_bool))
}

/// HTTP relay plug (Shelly-style API)
#[derive(Clone)]
pub struct HttpRelayPlug {
    id: String,
    base_url: String,
    channel: u8,
    username: Option<String>,
    password: Option<String>,
    client: Client,
    logger: StructuredLogger,
}

impl HttpRelayPlug {
    pub fn new(id: impl Into<String>, endpoint: &PlugEndpoint) -> Result<Self> {
        let base_url = format!("http://{}:{}", endpoint.host, endpoint.port);
        Self::with_base_url(id, base_url, endpoint)
    }

    /// Build against an explicit base URL, keeping channel, credentials and timeout
    pub fn with_base_url(
        id: impl Into<String>,
        base_url: impl Into<String>,
        endpoint: &PlugEndpoint,
    ) -> Result<Self> {
        let id = id.into();
        let client = Client::builder()
            .timeout(Duration::from_millis(endpoint.timeout_ms))
            .build()
            .map_err(|e| HeliosError::outlet(&id, format!("Failed to build HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        let logger = get_logger_with_context(
            LogContext::new("plug")
                .with_outlet(&id)
                .with_endpoint(base_url.clone()),
        );

        Ok(Self {
            id,
            base_url,
            channel: endpoint.channel,
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
            client,
            logger,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    async fn request(&self, turn: Option<&str>) -> Result<PlugState> {
        let url = format!("{}/relay/{}", self.base_url, self.channel);
        let mut req = self.client.get(&url);
        if let Some(turn) = turn {
            req = req.query(&[("turn", turn)]);
        }
        if let Some(user) = &self.username {
            req = req.basic_auth(user, self.password.as_deref());
        }

        self.logger
            .trace(&format!("GET {} turn={}", url, turn.unwrap_or("-")));
        let response = req
            .send()
            .await
            .map_err(|e| HeliosError::outlet(&self.id, format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HeliosError::outlet(&self.id, format!("HTTP {}", status)));
        }
        let body = response
            .text()
            .await
            .map_err(|e| HeliosError::outlet(&self.id, format!("Failed to read body: {}", e)))?;
        parse_relay_response(&body)
            .map_err(|e| HeliosError::outlet(&self.id, format!("Unexpected response: {}", e)))
    }
}

#[async_trait::async_trait]
impl OutletSwitch for HttpRelayPlug {
    async fn set_state(&self, on: bool) -> Result<()> {
        let reported = self.request(Some(if on { "on" } else { "off" })).await?;
        match reported.as_bool() {
            Some(state) if state != on => Err(HeliosError::outlet(
                &self.id,
                format!("Relay reports {} after switching {}", state, on),
            )),
            _ => {
                self.logger.debug(&format!("Relay switched {}", if on { "on" } else { "off" }));
                Ok(())
            }
        }
    }

    async fn get_state(&self) -> Result<PlugState> {
        self.request(None).await
    }
}
