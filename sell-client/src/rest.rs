//! HTTP implementation of [`MarketplaceApi`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::debug;

use crate::api::MarketplaceApi;
use crate::error::ClientError;
use crate::models::{
    EarningsSummary, LoginRequest, LoginResponse, PriceQuote, PublishRequest, PublishedAppsPage,
};
use crate::Result;

/// Default timeout for marketplace requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// REST client for the marketplace backend.
///
/// Holds the bearer token obtained by [`MarketplaceApi::login`]; the token lives
/// only as long as the client.
#[derive(Debug)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    token: RwLock<Option<String>>,
}

impl RestClient {
    /// Create a client for `base_url` acting as `username`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, username: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            token: RwLock::new(None),
        })
    }

    /// The username requests are made on behalf of.
    pub fn username(&self) -> &str {
        &self.username
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn with_token(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.read().await.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Response> {
        debug!("marketplace request: {}", url);
        let response = request.send().await.map_err(|source| ClientError::Request {
            url: url.to_string(),
            source,
        })?;
        check_status(url, response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, request: RequestBuilder) -> Result<T> {
        let response = self.send(url, request).await?;
        let body = response.text().await.map_err(|source| ClientError::Request {
            url: url.to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Map non-success statuses onto typed errors.
async fn check_status(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::AuthRejected {
            status: status.as_u16(),
        }),
        StatusCode::CONFLICT => Err(ClientError::Conflict(body)),
        _ => Err(ClientError::Http {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        }),
    }
}

#[async_trait]
impl MarketplaceApi for RestClient {
    async fn quote_bitcoin_price(&self, satoshis: u64) -> Result<PriceQuote> {
        let url = self.url("/pool/v1/price");
        let request = self.http.get(&url).query(&[("amount", satoshis)]);
        self.get_json(&url, request).await
    }

    async fn get_published_apps(&self, publisher: &str, page: u32) -> Result<PublishedAppsPage> {
        let url = self.url("/mmm/v1/apps/");
        let request = self
            .http
            .get(&url)
            .query(&[("publisher", publisher.to_string()), ("page", page.to_string())]);
        let request = self.with_token(request).await;
        self.get_json(&url, request).await
    }

    async fn login(&self, payout_address: &str, password: &str) -> Result<()> {
        let url = self.url("/auth/v1/login");
        let body = LoginRequest {
            username: &self.username,
            password,
            payout_address,
        };
        let request = self.http.post(&url).json(&body);
        let response: LoginResponse = self.get_json(&url, request).await?;
        *self.token.write().await = Some(response.token);
        Ok(())
    }

    async fn get_earnings(&self) -> Result<EarningsSummary> {
        let url = self.url(&format!("/pool/v1/earnings/{}", self.username));
        let request = self.with_token(self.http.get(&url)).await;
        self.get_json(&url, request).await
    }

    async fn publish_app(&self, request: &PublishRequest) -> Result<()> {
        if self.token.read().await.is_none() {
            return Err(ClientError::NotAuthenticated);
        }
        let url = self.url("/mmm/v1/apps/");
        let builder = self.with_token(self.http.post(&url).json(request)).await;
        self.send(&url, builder).await?;
        Ok(())
    }
}
