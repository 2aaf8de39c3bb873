//! Redemption service client.
//!
//! The admission desk only depends on [`RedemptionService`]; the HTTP adapter
//! and the scripted mock are interchangeable implementations of it.

use futures::future::BoxFuture;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Path of the redeem endpoint relative to the service base URL
pub const REDEEM_PATH: &str = "api/tickets/redeem";

/// Result type for redemption calls
pub type RedemptionResult<T> = Result<T, RedemptionError>;

/// Boxed future returned by [`RedemptionService::redeem`]
pub type RedeemFuture = BoxFuture<'static, RedemptionResult<RedemptionResponse>>;

/// Decision returned by the service. `success == false` is a reported
/// refusal (already used, unknown ticket ...), not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionResponse {
    /// Whether the ticket was admitted
    pub success: bool,
    /// Text to show and record
    #[serde(default)]
    pub message: String,
}

impl RedemptionResponse {
    /// An admitting response
    #[must_use]
    pub fn admitted(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// A refusing response
    #[must_use]
    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Errors that prevent the service from giving a decision
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedemptionError {
    /// Transport failure (connection refused, TLS, DNS ...)
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The service answered with a body that is not a redemption response
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),

    /// Non-success HTTP status without a usable body
    #[error("Service rejected request (status {status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// No answer within the redemption timeout
    #[error("Redemption timed out")]
    Timeout,
}

/// The redemption service contract: one call, exactly one settlement.
pub trait RedemptionService: Send + Sync {
    /// Redeem `ticket_id` with the given nonce
    ///
    /// # Errors
    ///
    /// Returns [`RedemptionError`] when no decision could be obtained.
    fn redeem(&self, ticket_id: &str, nonce: &str) -> RedeemFuture;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RedeemBody<'a> {
    ticket_id: &'a str,
    nonce: &'a str,
}

/// HTTP adapter for a redemption backend.
///
/// Sends `POST {base}/api/tickets/redeem` with `{"ticketId", "nonce"}` and
/// expects `{"success", "message"}` back. Never retries.
#[derive(Clone, Debug)]
pub struct HttpRedemptionClient {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpRedemptionClient {
    /// Create a client for the service at `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`RedemptionError::RequestFailed`] if the URL is invalid or the
    /// HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        connect_timeout: Duration,
    ) -> RedemptionResult<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| RedemptionError::RequestFailed(format!("invalid base URL: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join(REDEEM_PATH)
            .map_err(|e| RedemptionError::RequestFailed(format!("invalid base URL: {e}")))?;

        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| RedemptionError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    /// Full URL of the redeem endpoint
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post_redeem(
        client: Client,
        endpoint: Url,
        token: Option<String>,
        ticket_id: String,
        nonce: String,
    ) -> RedemptionResult<RedemptionResponse> {
        let mut request = client.post(endpoint).json(&RedeemBody {
            ticket_id: &ticket_id,
            nonce: &nonce,
        });
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RedemptionError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<RedemptionResponse>()
                .await
                .map_err(|e| RedemptionError::ResponseParseFailed(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<RedemptionResponse>(&body) {
            // Backends answer refusals like "already used" with 4xx and a normal body.
            Ok(decoded) => Ok(RedemptionResponse::refused(decoded.message)),
            Err(_) => Err(RedemptionError::Rejected {
                status: status.as_u16(),
                message: body,
            }),
        }
    }
}

impl RedemptionService for HttpRedemptionClient {
    fn redeem(&self, ticket_id: &str, nonce: &str) -> RedeemFuture {
        tracing::debug!(ticket_id, endpoint = %self.endpoint, "Sending redemption request");
        Box::pin(Self::post_redeem(
            self.client.clone(),
            self.endpoint.clone(),
            self.token.clone(),
            ticket_id.to_string(),
            nonce.to_string(),
        ))
    }
}

/// One scripted reply of [`MockRedemptionService`]
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Settle with this response
    Respond(RedemptionResponse),
    /// Settle with this error
    Fail(RedemptionError),
    /// Never settle
    Hang,
}

/// Scripted redemption service for tests and demos.
///
/// Replies are consumed in order; once the script is exhausted every call is
/// admitted with "Ticket redeemed". Every call is recorded.
#[derive(Clone, Debug, Default)]
pub struct MockRedemptionService {
    script: Arc<Mutex<VecDeque<MockReply>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    latency: Duration,
}

impl MockRedemptionService {
    /// Creates a mock that admits every ticket
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock answering with `replies` in order
    #[must_use]
    pub fn scripted(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(replies.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Delay every settlement by `latency`
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Append a reply to the script
    pub fn push_reply(&self, reply: MockReply) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// `(ticket_id, nonce)` of every call so far
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared(self) -> Arc<dyn RedemptionService> {
        Arc::new(self)
    }
}

impl RedemptionService for MockRedemptionService {
    fn redeem(&self, ticket_id: &str, nonce: &str) -> RedeemFuture {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((ticket_id.to_string(), nonce.to_string()));

        let reply = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| MockReply::Respond(RedemptionResponse::admitted("Ticket redeemed")));
        let latency = self.latency;

        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            match reply {
                MockReply::Respond(response) => Ok(response),
                MockReply::Fail(error) => Err(error),
                MockReply::Hang => std::future::pending().await,
            }
        })
    }
}
