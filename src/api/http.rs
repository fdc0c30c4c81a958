//! HTTPS implementation of [`GameApi`] on top of reqwest.

use super::{
    with_retry, ApiError, AuthToken, ClaimResponse, Connector, GameApi, MiningStatus,
    RepaintResponse, RetryPolicy, SpecialRequest, TemplateInfo, UserInfo,
};
use crate::plan::PaintInstruction;
use crate::profiles::Profile;
use rand::seq::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, ORIGIN, REFERER, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://notpx.app/api/v1";

/// Template endpoint of the regular canvas.
pub const MY_TEMPLATE_ENDPOINT: &str = "/image/template/my";

const APP_ORIGIN: &str = "https://app.notpx.app";

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148",
    "Mozilla/5.0 (Linux; Android 10; Android SDK built for x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.120 Mobile Safari/537.36",
];

/// Settings shared by every account's HTTP client.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub template_endpoint: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            template_endpoint: MY_TEMPLATE_ENDPOINT.to_string(),
        }
    }
}

/// Game API client for a single account.
#[derive(Debug, Clone)]
pub struct HttpGameApi {
    client: Client,
    options: HttpOptions,
}

impl HttpGameApi {
    /// Build a client, optionally routed through `proxy`.
    pub fn new(options: HttpOptions, proxy: Option<&str>) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(ORIGIN, HeaderValue::from_static(APP_ORIGIN));
        headers.insert(REFERER, HeaderValue::from_static("https://app.notpx.app/"));
        let agent = USER_AGENTS.choose(&mut rand::rng()).copied().unwrap_or(USER_AGENTS[0]);
        headers.insert(USER_AGENT, HeaderValue::from_static(agent));

        let mut builder = Client::builder().timeout(options.timeout).default_headers(headers);
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ApiError::Client(format!("invalid proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|e| ApiError::Client(e.to_string()))?;
        Ok(Self { client, options })
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}{}", self.options.base_url.trim_end_matches('/'), endpoint)
        }
    }

    async fn request<T, B>(
        &self,
        method: Method,
        endpoint: &str,
        token: &AuthToken,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(endpoint);
        let authorization = HeaderValue::from_str(&format!("initData {}", token.as_str()))
            .map_err(|_| ApiError::Client("authorization token is not a valid header".into()))?;

        with_retry(&self.options.retry, || {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header(AUTHORIZATION, authorization.clone());
            if let Some(body) = body {
                request = request.json(body);
            }
            async move {
                let response = request.send().await?;
                let status = response.status();
                if status == StatusCode::UNAUTHORIZED {
                    return Err(ApiError::Unauthorized);
                }
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ApiError::Status { status: status.as_u16(), body });
                }
                let bytes = response.bytes().await?;
                serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
            }
        })
        .await
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, token: &AuthToken) -> Result<T, ApiError> {
        self.request::<T, ()>(Method::GET, endpoint, token, None).await
    }
}

impl GameApi for HttpGameApi {
    async fn me(&self, token: &AuthToken) -> Result<UserInfo, ApiError> {
        self.get("/users/me", token).await
    }

    async fn mining_status(&self, token: &AuthToken) -> Result<MiningStatus, ApiError> {
        self.get("/mining/status", token).await
    }

    async fn claim(&self, token: &AuthToken) -> Result<ClaimResponse, ApiError> {
        self.get("/mining/claim", token).await
    }

    async fn template(&self, token: &AuthToken) -> Result<TemplateInfo, ApiError> {
        self.get(&self.options.template_endpoint, token).await
    }

    async fn repaint(
        &self,
        token: &AuthToken,
        instruction: PaintInstruction,
    ) -> Result<RepaintResponse, ApiError> {
        self.request(Method::POST, "/repaint/start", token, Some(&instruction)).await
    }

    async fn special(&self, token: &AuthToken, request: SpecialRequest) -> Result<(), ApiError> {
        self.request::<serde_json::Value, _>(Method::POST, "/repaint/special", token, Some(&request))
            .await
            .map(|_| ())
    }
}

/// Creates one [`HttpGameApi`] per account, honoring the profile's proxy.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    options: HttpOptions,
}

impl HttpConnector {
    pub fn new(options: HttpOptions) -> Self {
        Self { options }
    }
}

impl Connector for HttpConnector {
    type Api = HttpGameApi;

    fn connect(&self, profile: &Profile) -> Result<HttpGameApi, ApiError> {
        HttpGameApi::new(self.options.clone(), profile.proxy.as_deref())
    }
}
