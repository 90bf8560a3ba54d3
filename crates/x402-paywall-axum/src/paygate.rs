//! The payment gate: the per-request state machine in front of protected routes.
//!
//! ## States
//!
//! - **bypassed** - the path is allow-listed or the gate is disabled; the request passes untouched.
//! - **awaiting_proof** - no `X-PAYMENT` header; the client receives `402` with a fresh requirement.
//! - **verifying** - the header is decoded, the requirement is rebuilt from the catalog, the
//!   proof is verified and its identifier consumed.
//! - **admitted** - a [`PaymentContext`] is attached to the request, a revenue event is emitted
//!   in the background, and the inner service runs.
//! - **rejected** - `402` with a fresh requirement and the specific [`InvalidReason`].
//!
//! Rejections have no side effects: a proof identifier is consumed only after
//! verification succeeds, and revenue is recorded only for admitted requests.

use alloy_primitives::Address;
use axum_core::extract::Request;
use axum_core::response::{IntoResponse, Response};
use http::{HeaderValue, StatusCode, header};
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tower::Service;
use tracing::Instrument;
use x402_paywall_types::codec::{DecodeError, PAYMENT_HEADER, PaymentProofCodec, ProofId};
use x402_paywall_types::pricing::HttpMethod;
use x402_paywall_types::proto::{AtomicAmount, InvalidReason, PaymentRequired};
use x402_paywall_types::requirement::{PaymentRequirementBuilder, RequirementError};
use x402_paywall_types::timestamp::UnixTimestamp;

use crate::rate_limit::{ClientKeySource, RateDecision, RateLimiter};
use crate::recorder::{PaymentSuccessEvent, RevenueRecorder};
use crate::replay::{ReplayGuard, ReplayStoreError};
use crate::settlement::Settlement;
use crate::verifier::{PaymentVerifier, VerificationFailure};

/// Gate state, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Bypassed,
    AwaitingProof,
    Verifying,
    Admitted,
    Rejected,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::Bypassed => "bypassed",
            GateState::AwaitingProof => "awaiting_proof",
            GateState::Verifying => "verifying",
            GateState::Admitted => "admitted",
            GateState::Rejected => "rejected",
        }
    }
}

impl Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified payment details, available to handlers as a request extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentContext {
    pub resource: String,
    pub network: String,
    pub amount: AtomicAmount,
    pub proof_id: ProofId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

/// Paths that never require payment.
///
/// An entry ending in `*` matches by prefix; `/api/auth/*` covers
/// `/api/auth` itself and everything under it. Other entries match exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl AllowList {
    pub const DEFAULT_ENTRIES: [&'static str; 4] = [
        "/health",
        "/api/health",
        "/api/auth/*",
        "/api/payments/pricing",
    ];

    pub fn new<I, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut exact = Vec::new();
        let mut prefixes = Vec::new();
        for entry in entries {
            let entry = entry.as_ref();
            match entry.strip_suffix('*') {
                Some(prefix) => {
                    if let Some(dir) = prefix.strip_suffix('/')
                        && !dir.is_empty()
                    {
                        exact.push(dir.to_string());
                    }
                    prefixes.push(prefix.to_string());
                }
                None => exact.push(entry.to_string()),
            }
        }
        Self { exact, prefixes }
    }

    pub fn empty() -> Self {
        Self {
            exact: Vec::new(),
            prefixes: Vec::new(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.exact.iter().any(|e| e == path) || self.prefixes.iter().any(|p| path.starts_with(p))
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ENTRIES)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaygateError {
    #[error("{PAYMENT_HEADER} header is required")]
    PaymentRequired,
    #[error("Malformed payment proof: {0}")]
    MalformedProof(#[from] DecodeError),
    #[error("{0}")]
    Verification(#[from] VerificationFailure),
    #[error("Payment proof has already been used")]
    ReplayDetected,
    #[error("Unable to check proof reuse: {0}")]
    ReplayStore(#[from] ReplayStoreError),
    #[error("Too many payment requests, retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error("Unable to build payment requirement: {0}")]
    Requirement(#[from] RequirementError),
}

impl PaygateError {
    /// The reason reported to the client, if the error is a proof rejection.
    pub fn invalid_reason(&self) -> Option<InvalidReason> {
        match self {
            PaygateError::MalformedProof(_) => Some(InvalidReason::MalformedProof),
            PaygateError::Verification(failure) => Some(failure.reason()),
            PaygateError::ReplayDetected => Some(InvalidReason::ReplayDetected),
            PaygateError::ReplayStore(_) => Some(InvalidReason::SettlementUnavailable),
            PaygateError::PaymentRequired
            | PaygateError::RateLimited { .. }
            | PaygateError::Requirement(_) => None,
        }
    }
}

/// Everything the gate needs to decide on a request. Shared by all requests
/// passing through one layer.
pub struct PaywallGate<S> {
    pub requirements: PaymentRequirementBuilder,
    pub verifier: PaymentVerifier<S>,
    pub replay_guard: ReplayGuard,
    pub recorder: Arc<dyn RevenueRecorder>,
    pub recording_timeout: Duration,
    pub rate_limiter: Option<Arc<dyn RateLimiter>>,
    pub client_key_source: ClientKeySource,
    pub allow_list: AllowList,
    pub enabled: bool,
    pub pay_to: Address,
}

impl<S> fmt::Debug for PaywallGate<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaywallGate")
            .field("requirements", &self.requirements)
            .field("replay_guard", &self.replay_guard)
            .field("allow_list", &self.allow_list)
            .field("enabled", &self.enabled)
            .field("pay_to", &self.pay_to)
            .finish_non_exhaustive()
    }
}

/// Request attributes the gate works with, copied out of the request so no
/// borrow of it is held across an await.
struct RequestFacts {
    path: String,
    method: HttpMethod,
    payment_header: Option<Vec<u8>>,
    client_key: String,
}

impl RequestFacts {
    fn of(req: &Request, client_key_source: &ClientKeySource) -> Self {
        Self {
            path: req.uri().path().to_string(),
            method: HttpMethod::from_request_method(req.method().as_str()),
            payment_header: req
                .headers()
                .get(PAYMENT_HEADER)
                .map(|value| value.as_bytes().to_vec()),
            client_key: client_key_source.key_of(req.headers()),
        }
    }
}

impl<S> PaywallGate<S>
where
    S: Settlement + Send + Sync + 'static,
{
    /// Handles an incoming request: admits it to `inner` or answers with a rejection.
    #[tracing::instrument(name = "x402.paywall", skip_all, fields(path = %req.uri().path(), method = %req.method()))]
    pub async fn handle_request<I>(self: Arc<Self>, inner: I, req: Request) -> Result<Response, Infallible>
    where
        I: Service<Request, Response = Response, Error = Infallible>,
        I::Future: Send,
    {
        let facts = RequestFacts::of(&req, &self.client_key_source);
        if !self.enabled || self.allow_list.matches(&facts.path) {
            tracing::debug!(state = %GateState::Bypassed, "Passing request through");
            return call_inner(inner, req).await;
        }
        match self.admit(&facts).await {
            Ok(context) => {
                tracing::info!(
                    state = %GateState::Admitted,
                    proof_id = %context.proof_id,
                    amount = %context.amount,
                    "Payment accepted"
                );
                self.record_payment(&context);
                let mut req = req;
                req.extensions_mut().insert(context);
                call_inner(inner, req).await
            }
            Err(err) => Ok(self.error_into_response(err, &facts)),
        }
    }

    /// Runs every check for a request that is not bypassed.
    ///
    /// Returns the payment context to attach on success. Performs no side
    /// effect on failure.
    async fn admit(&self, facts: &RequestFacts) -> Result<PaymentContext, PaygateError> {
        let Some(header) = facts.payment_header.as_deref() else {
            tracing::debug!(state = %GateState::AwaitingProof, "No payment proof");
            if let Some(limiter) = &self.rate_limiter
                && let RateDecision::Limited { retry_after } = limiter.check(&facts.client_key).await
            {
                return Err(PaygateError::RateLimited { retry_after });
            }
            return Err(PaygateError::PaymentRequired);
        };

        tracing::debug!(state = %GateState::Verifying, "Verifying payment proof");
        let decoded = PaymentProofCodec::decode(header)?;
        let requirement = self
            .requirements
            .build(&facts.path, facts.method, self.pay_to)?;
        let verified = self.verifier.verify(&decoded.proof, &requirement).await?;
        let valid_before = decoded.proof.valid_before();
        if !self.replay_guard.consume_once(&decoded.id, valid_before).await? {
            return Err(PaygateError::ReplayDetected);
        }

        Ok(PaymentContext {
            resource: requirement.resource,
            network: requirement.network,
            amount: requirement.max_amount_required,
            proof_id: decoded.id,
            payer: verified.payer,
        })
    }

    /// Emits the revenue event in the background. Failures are logged and
    /// never reach the client.
    fn record_payment(&self, context: &PaymentContext) {
        let event = PaymentSuccessEvent {
            resource: context.resource.clone(),
            network: context.network.clone(),
            amount: context.amount,
            timestamp: UnixTimestamp::now(),
            proof_id: context.proof_id,
            payer: context.payer.clone(),
        };
        let recorder = Arc::clone(&self.recorder);
        let timeout = self.recording_timeout;
        tokio::spawn(
            async move {
                match tokio::time::timeout(timeout, recorder.record(&event)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::warn!(error = %err, proof_id = %event.proof_id, "Failed to record payment")
                    }
                    Err(_) => {
                        tracing::warn!(proof_id = %event.proof_id, "Recording payment timed out")
                    }
                }
            }
            .in_current_span(),
        );
    }

    /// Converts a gate error into the client-facing response.
    ///
    /// Every `402` carries a requirement built at the moment of rejection.
    fn error_into_response(&self, err: PaygateError, facts: &RequestFacts) -> Response {
        match &err {
            PaygateError::RateLimited { retry_after } => {
                tracing::info!(state = %GateState::AwaitingProof, client = %facts.client_key, "Rate limited");
                let retry_after = HeaderValue::from(retry_after.as_secs().max(1));
                let body = serde_json::json!({ "error": err.to_string() }).to_string();
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [
                        (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
                        (header::RETRY_AFTER, retry_after),
                    ],
                    body,
                )
                    .into_response();
            }
            PaygateError::Requirement(inner) => {
                tracing::error!(error = %inner, "Unable to build payment requirement");
                return internal_error();
            }
            _ => {}
        }

        let requirement = match self.requirements.build(&facts.path, facts.method, self.pay_to) {
            Ok(requirement) => requirement,
            Err(inner) => {
                tracing::error!(error = %inner, "Unable to build payment requirement");
                return internal_error();
            }
        };
        let mut body = PaymentRequired::new(err.to_string(), vec![requirement]);
        if let Some(reason) = err.invalid_reason() {
            tracing::info!(state = %GateState::Rejected, reason = %reason, error = %err, "Payment rejected");
            body = body.with_reason(reason, reason.remedy());
        }
        match serde_json::to_vec(&body) {
            Ok(bytes) => (
                StatusCode::PAYMENT_REQUIRED,
                [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                bytes,
            )
                .into_response(),
            Err(inner) => {
                tracing::error!(error = %inner, "Unable to serialize payment requirement");
                internal_error()
            }
        }
    }
}

async fn call_inner<I>(mut inner: I, req: Request) -> Result<Response, Infallible>
where
    I: Service<Request, Response = Response, Error = Infallible>,
    I::Future: Send,
{
    inner.call(req).instrument(tracing::info_span!("inner")).await
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        r#"{"error":"Payment requirement unavailable"}"#,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allow_list() {
        let allow = AllowList::default();
        assert!(allow.matches("/health"));
        assert!(allow.matches("/api/health"));
        assert!(allow.matches("/api/auth"));
        assert!(allow.matches("/api/auth/login"));
        assert!(allow.matches("/api/payments/pricing"));
        assert!(!allow.matches("/api/authority"));
        assert!(!allow.matches("/api/ai/market-analysis"));
        assert!(!allow.matches("/health/deep"));
    }

    #[test]
    fn bare_star_prefix() {
        let allow = AllowList::new(["/public*"]);
        assert!(allow.matches("/public"));
        assert!(allow.matches("/public-data/x"));
        assert!(!allow.matches("/private"));
        assert!(!AllowList::empty().matches("/health"));
    }

    #[test]
    fn rejection_reasons() {
        assert_eq!(PaygateError::PaymentRequired.invalid_reason(), None);
        assert_eq!(
            PaygateError::ReplayDetected.invalid_reason(),
            Some(InvalidReason::ReplayDetected)
        );
        assert_eq!(
            PaygateError::ReplayStore(ReplayStoreError("down".to_string())).invalid_reason(),
            Some(InvalidReason::SettlementUnavailable)
        );
        assert_eq!(
            PaygateError::MalformedProof(DecodeError::Empty).invalid_reason(),
            Some(InvalidReason::MalformedProof)
        );
        assert_eq!(
            PaygateError::PaymentRequired.to_string(),
            "X-PAYMENT header is required"
        );
    }
}
