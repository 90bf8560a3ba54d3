//! A [`Settlement`] implementation backed by a _remote_ x402 facilitator over HTTP.
//!
//! The facilitator owns the chain RPC integration: it checks the wallet
//! signature, the authorized value and the payer's balance. This client only
//! calls its `POST /verify` endpoint and maps the answer onto an
//! [`AuthorizationVerdict`].
//!
//! ```rust
//! use x402_paywall_axum::facilitator_client::FacilitatorClient;
//!
//! let facilitator = FacilitatorClient::try_from("https://facilitator.x402.rs").unwrap();
//! assert_eq!(facilitator.verify_url().as_str(), "https://facilitator.x402.rs/verify");
//! ```
//!
//! ## Error Handling
//!
//! Every failure to obtain a verdict is a [`FacilitatorClientError`]:
//! URL construction, transport failures and timeouts, unexpected HTTP
//! statuses, and undecodable replies. The verifier turns all of them into a
//! `settlement_unavailable` rejection.

use http::{HeaderMap, StatusCode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use x402_paywall_types::proto::{PaymentProof, PaymentRequirement, X402Version1};

use crate::settlement::{AuthorizationVerdict, Settlement};

/// A client for the `/verify` endpoint of a remote facilitator.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    /// Base URL of the facilitator (e.g. `https://facilitator.example/`)
    base_url: Url,
    /// Full URL to `POST /verify` requests
    verify_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Optional custom headers sent with each request
    headers: HeaderMap,
    /// Optional request timeout
    timeout: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// Body of `POST /verify`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    x402_version: X402Version1,
    payment_payload: &'a PaymentProof,
    payment_requirements: &'a PaymentRequirement,
}

/// Reply of `POST /verify`. Reasons are kept as free-form strings: each
/// facilitator has its own vocabulary.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    is_valid: bool,
    #[serde(default)]
    invalid_reason: Option<String>,
    #[serde(default)]
    payer: Option<String>,
}

impl From<VerifyResponse> for AuthorizationVerdict {
    fn from(response: VerifyResponse) -> Self {
        if response.is_valid {
            return AuthorizationVerdict::Authorized {
                payer: response.payer,
            };
        }
        let reason = response.invalid_reason.unwrap_or_default().to_ascii_lowercase();
        if reason.contains("valid_before")
            || reason.contains("valid_after")
            || reason.contains("expired")
        {
            AuthorizationVerdict::Expired
        } else if reason.contains("insufficient")
            || reason.contains("value")
            || reason.contains("amount")
        {
            AuthorizationVerdict::InsufficientAmount
        } else {
            AuthorizationVerdict::SignatureInvalid
        }
    }
}

impl Settlement for FacilitatorClient {
    type Error = FacilitatorClientError;

    async fn verify_transfer_authorization(
        &self,
        proof: &PaymentProof,
        requirement: &PaymentRequirement,
    ) -> Result<AuthorizationVerdict, Self::Error> {
        let request = VerifyRequest {
            x402_version: X402Version1,
            payment_payload: proof,
            payment_requirements: requirement,
        };
        let response: VerifyResponse = self
            .post_json(&self.verify_url, "POST /verify", &request)
            .await?;
        Ok(response.into())
    }
}

impl FacilitatorClient {
    /// Returns the base URL used by this client.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./verify` URL relative to [`FacilitatorClient::base_url`].
    pub fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Constructs a new [`FacilitatorClient`] from a base URL.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let verify_url =
            base_url
                .join("./verify")
                .map_err(|e| FacilitatorClientError::UrlParse {
                    context: "Failed to construct ./verify URL",
                    source: e,
                })?;
        Ok(Self {
            client: Client::new(),
            base_url,
            verify_url,
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    /// Attaches custom headers (e.g. an API key) to all future requests.
    pub fn with_headers(&self, headers: HeaderMap) -> Self {
        let mut this = self.clone();
        this.headers = headers;
        this
    }

    /// Sets a timeout for all future requests.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = Some(timeout);
        this
    }

    /// POSTs `payload` as JSON and decodes a `200 OK` JSON reply.
    ///
    /// `context` names the call in errors and logs (e.g. `"POST /verify"`).
    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        for (key, value) in self.headers.iter() {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;

        let result = if http_response.status() == StatusCode::OK {
            http_response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| FacilitatorClientError::ResponseBodyRead { context, source: e })?;
            Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            })
        };

        if let Err(err) = &result {
            tracing::warn!(error = %err, url = %url, "Request to facilitator failed");
        }

        result
    }
}

/// Parses a base URL, normalizing it to exactly one trailing slash.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        FacilitatorClient::try_new(url)
    }
}

impl TryFrom<String> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FacilitatorClient::try_from(value.as_str())
    }
}
