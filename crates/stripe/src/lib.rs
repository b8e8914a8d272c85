//! Stripe webhook endpoints as a Hookwire event source.
//!
//! Implements [`pipeline::EventSource`] over the Stripe REST API:
//!
//! | Port operation | Request |
//! |----------------|---------|
//! | `create_subscription` | `POST /v1/webhook_endpoints` (form encoded) |
//! | `delete_subscription` | `DELETE /v1/webhook_endpoints/{id}` |
//! | `list_subscriptions` | `GET /v1/webhook_endpoints?limit=N&starting_after=ID` |
//!
//! HTTP failures are mapped onto [`ProviderErrorKind`]; nothing is retried here.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    EventKinds, EventSource, Page, ProviderError, ProviderErrorKind, Subscription, SubscriptionId,
    Tags,
};
use reqwest::{header::RETRY_AFTER, Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

pub const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

const ENDPOINTS_PATH: &str = "/v1/webhook_endpoints";

/// Largest `limit` the list endpoint accepts.
const MAX_PAGE_SIZE: u8 = 100;

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("a Stripe API key is required")]
    MissingApiKey,

    #[error("could not build the HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Connection settings for [`StripeEventSource`].
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub api_key: String,
    /// Scheme and host of the API, without a trailing slash.
    pub base_url: String,
    /// Endpoints requested per list page. Clamped to 1..=100, the range
    /// Stripe accepts.
    pub page_size: u8,
    pub timeout: Duration,
}

impl StripeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            page_size: MAX_PAGE_SIZE,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }
}

pub struct StripeEventSource {
    client: reqwest::Client,
    config: StripeConfig,
}

impl StripeEventSource {
    pub fn new(mut config: StripeConfig) -> Result<Self, StripeError> {
        if config.api_key.trim().is_empty() {
            return Err(StripeError::MissingApiKey);
        }
        config.page_size = config.page_size.clamp(1, MAX_PAGE_SIZE);
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoints_url(&self) -> String {
        format!("{}{ENDPOINTS_PATH}", self.config.base_url)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<Response, ProviderError> {
        let response = request
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| transport_error(operation, &e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(status_error(operation, response).await)
    }
}

#[async_trait]
impl EventSource for StripeEventSource {
    #[instrument(skip(self, metadata), fields(events = %events))]
    async fn create_subscription(
        &self,
        events: &EventKinds,
        url: &str,
        metadata: &Tags,
    ) -> Result<Subscription, ProviderError> {
        let operation = "CreateWebhookEndpoint";
        let mut form: Vec<(String, String)> = events
            .to_wire()
            .into_iter()
            .map(|kind| ("enabled_events[]".to_owned(), kind))
            .collect();
        form.push(("url".to_owned(), url.to_owned()));
        form.extend(
            metadata
                .iter()
                .map(|(k, v)| (format!("metadata[{k}]"), v.clone())),
        );

        let response = self
            .send(operation, self.client.post(self.endpoints_url()).form(&form))
            .await?;
        let endpoint: WireEndpoint = decode(operation, response).await?;
        debug!(subscription = %endpoint.id, "Webhook endpoint created");
        endpoint.into_subscription(operation)
    }

    #[instrument(skip(self), fields(subscription = %id))]
    async fn delete_subscription(&self, id: &SubscriptionId) -> Result<(), ProviderError> {
        let operation = "DeleteWebhookEndpoint";
        let url = format!("{}/{id}", self.endpoints_url());
        let response = self.send(operation, self.client.delete(url)).await?;
        let deleted: WireDeleted = decode(operation, response).await?;
        if !deleted.deleted {
            return Err(ProviderError::new(
                ProviderErrorKind::Other,
                operation,
                format!("webhook endpoint {id} was not deleted"),
            ));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_subscriptions(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<Subscription>, ProviderError> {
        let operation = "ListWebhookEndpoints";
        let mut query = vec![("limit", self.config.page_size.to_string())];
        if let Some(cursor) = cursor {
            query.push(("starting_after", cursor));
        }

        let response = self
            .send(operation, self.client.get(self.endpoints_url()).query(&query))
            .await?;
        let list: WireList = decode(operation, response).await?;

        let items = list
            .data
            .into_iter()
            .map(|endpoint| endpoint.into_subscription(operation))
            .collect::<Result<Vec<_>, _>>()?;
        let next = if list.has_more {
            items.last().map(|s: &Subscription| s.id.to_string())
        } else {
            None
        };
        Ok(Page { items, next })
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireEndpoint {
    id: String,
    url: String,
    enabled_events: Vec<String>,
    #[serde(default)]
    metadata: Tags,
}

impl WireEndpoint {
    fn into_subscription(self, operation: &'static str) -> Result<Subscription, ProviderError> {
        let malformed = |what: String| {
            ProviderError::new(
                ProviderErrorKind::Other,
                operation,
                format!("unexpected webhook endpoint in response: {what}"),
            )
        };
        let id = SubscriptionId::new(self.id).ok_or_else(|| malformed("empty id".to_owned()))?;
        let enabled_events = EventKinds::parse(self.enabled_events).map_err(malformed)?;
        Ok(Subscription {
            id,
            url: self.url,
            enabled_events,
            metadata: self.metadata,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireList {
    data: Vec<WireEndpoint>,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct WireDeleted {
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: Option<String>,
}

async fn decode<T: serde::de::DeserializeOwned>(
    operation: &'static str,
    response: Response,
) -> Result<T, ProviderError> {
    response.json::<T>().await.map_err(|e| {
        ProviderError::new(
            ProviderErrorKind::Other,
            operation,
            format!("could not decode response: {e}"),
        )
    })
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn status_kind(status: StatusCode) -> ProviderErrorKind {
    match status {
        StatusCode::NOT_FOUND => ProviderErrorKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderErrorKind::AccessDenied,
        StatusCode::TOO_MANY_REQUESTS => ProviderErrorKind::Throttled,
        StatusCode::REQUEST_TIMEOUT => ProviderErrorKind::Timeout,
        s if s.is_server_error() => ProviderErrorKind::Unavailable,
        s if s.is_client_error() => ProviderErrorKind::InvalidRequest,
        _ => ProviderErrorKind::Other,
    }
}

async fn status_error(operation: &'static str, response: Response) -> ProviderError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<WireErrorBody>(&body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| format!("HTTP {status}"));

    let error = ProviderError::new(status_kind(status), operation, message);
    match retry_after {
        Some(after) => error.with_retry_after(after),
        None => error,
    }
}

fn transport_error(operation: &'static str, error: &reqwest::Error) -> ProviderError {
    let kind = if error.is_timeout() {
        ProviderErrorKind::Timeout
    } else {
        ProviderErrorKind::Unavailable
    };
    ProviderError::new(kind, operation, error.to_string())
}
