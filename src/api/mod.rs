//! Remote game API.
//!
//! [`GameApi`] is the seam between the repaint engine and the game server.
//! [`HttpGameApi`] talks to the real server over HTTPS; tests substitute an
//! in-memory implementation.

mod http;
mod retry;

pub use http::{HttpConnector, HttpGameApi, HttpOptions, DEFAULT_BASE_URL, MY_TEMPLATE_ENDPOINT};
pub use retry::{is_transient, with_retry, RetryPolicy};

use crate::plan::{CellId, PaintInstruction, TemplateGeometry};
use crate::profiles::Profile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Error from a remote call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// HTTP 401: the session has expired
    #[error("unauthorized (HTTP 401)")]
    Unauthorized,
    /// Any other non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// Timeout, connection failure and similar transport problems
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Response body did not have the expected shape
    #[error("unexpected response body: {0}")]
    Decode(String),
    /// The HTTP client could not be set up
    #[error("client setup failed: {0}")]
    Client(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// HTTP status code, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Short failure kind for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::Status { .. } => "http_status",
            ApiError::Transport(_) => "transient_network",
            ApiError::Decode(_) => "decode",
            ApiError::Client(_) => "client",
        }
    }
}

/// Session token sent as `Authorization: initData <token>`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken(<{} bytes>)", self.0.len())
    }
}

/// `GET /users/me`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl UserInfo {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name).trim().to_string()
    }
}

/// `GET /mining/status`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningStatus {
    #[serde(default)]
    pub user_balance: f64,
    #[serde(default)]
    pub charges: u32,
    #[serde(default)]
    pub boosts: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub goods: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub tasks: BTreeMap<String, serde_json::Value>,
}

impl MiningStatus {
    /// Owned quantity of a shop item, keyed by its numeric kind.
    pub fn goods_count(&self, kind: u32) -> u32 {
        self.goods
            .get(&kind.to_string())
            .and_then(serde_json::Value::as_u64)
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(0)
    }
}

/// `GET /image/template/my` or `GET /tournament/template/subscribe/my`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TemplateInfo {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub x: u32,
    pub y: u32,
    #[serde(alias = "imageSize")]
    pub size: u32,
    #[serde(default)]
    pub url: Option<String>,
}

impl TemplateInfo {
    pub fn geometry(&self) -> TemplateGeometry {
        TemplateGeometry::square(self.x, self.y, self.size)
    }
}

/// `POST /repaint/start`
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct RepaintResponse {
    #[serde(default)]
    pub balance: f64,
}

/// `GET /mining/claim`
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ClaimResponse {
    #[serde(default)]
    pub claimed: f64,
}

/// Body of `POST /repaint/special`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpecialRequest {
    #[serde(rename = "pixelId")]
    pub cell: CellId,
    #[serde(rename = "type")]
    pub kind: u32,
}

/// Operations the bot needs from the game server.
#[allow(async_fn_in_trait)]
pub trait GameApi {
    async fn me(&self, token: &AuthToken) -> Result<UserInfo, ApiError>;

    async fn mining_status(&self, token: &AuthToken) -> Result<MiningStatus, ApiError>;

    async fn claim(&self, token: &AuthToken) -> Result<ClaimResponse, ApiError>;

    async fn template(&self, token: &AuthToken) -> Result<TemplateInfo, ApiError>;

    async fn repaint(
        &self,
        token: &AuthToken,
        instruction: PaintInstruction,
    ) -> Result<RepaintResponse, ApiError>;

    async fn special(&self, token: &AuthToken, request: SpecialRequest) -> Result<(), ApiError>;
}

/// Builds a [`GameApi`] for one account, e.g. routed through its proxy.
pub trait Connector {
    type Api: GameApi;

    fn connect(&self, profile: &Profile) -> Result<Self::Api, ApiError>;
}
