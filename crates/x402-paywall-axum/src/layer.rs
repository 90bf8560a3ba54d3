//! Axum middleware that puts routes behind [x402](https://www.x402.org) micropayments.
//!
//! Requests without a valid `X-PAYMENT` proof receive `402 Payment Required`
//! with a requirement priced from the [`ResourcePriceCatalog`]. Valid proofs
//! are consumed once and the request proceeds with a
//! [`PaymentContext`](crate::paygate::PaymentContext) extension.
//!
//! ## Example Usage
//!
//! ```rust
//! use alloy_primitives::address;
//! use axum::{Router, routing::get};
//! use std::sync::Arc;
//! use x402_paywall_axum::PaywallMiddleware;
//! use x402_paywall_axum::facilitator_client::FacilitatorClient;
//! use x402_paywall_types::pricing::ResourcePriceCatalog;
//!
//! let facilitator = FacilitatorClient::try_from("https://facilitator.x402.rs").unwrap();
//! let paywall = PaywallMiddleware::new(
//!     Arc::new(facilitator),
//!     Arc::new(ResourcePriceCatalog::platform_defaults()),
//!     "base-sepolia",
//!     address!("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045"),
//! )
//! .unwrap();
//!
//! let app: Router = Router::new()
//!     .route("/api/market/data", get(|| async { "snapshot" }))
//!     .layer(paywall);
//! ```
//!
//! ## Configuration Notes
//!
//! - **[`PaywallMiddleware::with_max_timeout_seconds`]** sets the authorization validity window
//!   (default 300s). Replay records are kept at least that long.
//! - **[`PaywallMiddleware::with_settlement_timeout`]** bounds the settlement check (default 60s).
//!   It must fit within the validity window.
//! - **[`PaywallMiddleware::with_replay_store`]** swaps the in-process replay store for a shared one.
//! - **[`PaywallMiddleware::with_allow_list`]** replaces the default free paths.

use alloy_primitives::Address;
use axum_core::extract::Request;
use axum_core::response::Response;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use url::Url;
use x402_paywall_types::pricing::ResourcePriceCatalog;
use x402_paywall_types::requirement::{ConfigurationError, PaymentRequirementBuilder};

use crate::paygate::{AllowList, PaywallGate};
use crate::rate_limit::{ClientKeySource, RateLimiter};
use crate::recorder::{RevenueRecorder, TracingRecorder};
use crate::replay::{InMemoryReplayStore, ReplayGuard, ReplayStore};
use crate::settlement::Settlement;
use crate::verifier::PaymentVerifier;

/// The paywall middleware. Build one per application and apply it as a layer
/// to the routes it protects; all routes then share its replay store.
#[derive(Clone)]
pub struct PaywallMiddleware<S> {
    settlement: S,
    requirements: PaymentRequirementBuilder,
    settlement_timeout: Duration,
    replay_store: Arc<dyn ReplayStore>,
    recorder: Arc<dyn RevenueRecorder>,
    recording_timeout: Duration,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    client_key_source: ClientKeySource,
    allow_list: AllowList,
    enabled: bool,
    pay_to: Address,
}

impl<S> std::fmt::Debug for PaywallMiddleware<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaywallMiddleware")
            .field("requirements", &self.requirements)
            .field("settlement_timeout", &self.settlement_timeout)
            .field("allow_list", &self.allow_list)
            .field("enabled", &self.enabled)
            .field("pay_to", &self.pay_to)
            .finish_non_exhaustive()
    }
}

impl<S> PaywallMiddleware<S> {
    pub const DEFAULT_RECORDING_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a middleware charging in `network`'s stablecoin, payable to `pay_to`.
    ///
    /// Fails if the network is unknown or the recipient is the zero address.
    pub fn new(
        settlement: S,
        catalog: Arc<ResourcePriceCatalog>,
        network: &str,
        pay_to: Address,
    ) -> Result<Self, ConfigurationError> {
        if pay_to.is_zero() {
            return Err(ConfigurationError::ZeroRecipient);
        }
        let requirements = PaymentRequirementBuilder::new(catalog, network)?;
        Ok(Self {
            settlement,
            requirements,
            settlement_timeout: PaymentVerifier::<S>::DEFAULT_SETTLEMENT_TIMEOUT,
            replay_store: Arc::new(InMemoryReplayStore::new()),
            recorder: Arc::new(TracingRecorder),
            recording_timeout: Self::DEFAULT_RECORDING_TIMEOUT,
            rate_limiter: None,
            client_key_source: ClientKeySource::default(),
            allow_list: AllowList::default(),
            enabled: true,
            pay_to,
        })
    }

    pub fn requirements(&self) -> &PaymentRequirementBuilder {
        &self.requirements
    }

    pub fn settlement(&self) -> &S {
        &self.settlement
    }

    pub fn pay_to(&self) -> Address {
        self.pay_to
    }

    /// Sets how long a signed authorization stays acceptable.
    pub fn with_max_timeout_seconds(mut self, seconds: u64) -> Result<Self, ConfigurationError> {
        self.requirements = self.requirements.with_max_timeout_seconds(seconds)?;
        check_settlement_timeout(self.settlement_timeout, seconds)?;
        Ok(self)
    }

    /// Bounds how long the settlement check may take before the proof is
    /// rejected with `settlement_unavailable`.
    pub fn with_settlement_timeout(mut self, timeout: Duration) -> Result<Self, ConfigurationError> {
        check_settlement_timeout(timeout, self.requirements.max_timeout_seconds())?;
        self.settlement_timeout = timeout;
        Ok(self)
    }

    /// Sets the validity window and the settlement bound together, checking
    /// only the final pair.
    pub fn with_timeouts(
        mut self,
        max_timeout_seconds: u64,
        settlement_timeout: Duration,
    ) -> Result<Self, ConfigurationError> {
        check_settlement_timeout(settlement_timeout, max_timeout_seconds)?;
        self.requirements = self.requirements.with_max_timeout_seconds(max_timeout_seconds)?;
        self.settlement_timeout = settlement_timeout;
        Ok(self)
    }

    pub fn with_replay_store(mut self, store: Arc<dyn ReplayStore>) -> Self {
        self.replay_store = store;
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn RevenueRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_recording_timeout(mut self, timeout: Duration) -> Self {
        self.recording_timeout = timeout;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Chooses how callers are told apart for rate limiting. The default
    /// trusts `X-Forwarded-For` and is only sound behind a proxy that
    /// overwrites it.
    pub fn with_client_key_source(mut self, source: ClientKeySource) -> Self {
        self.client_key_source = source;
        self
    }

    pub fn with_allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    /// Reports resources as absolute URLs under `base_url`.
    pub fn with_resource_base_url(mut self, base_url: Url) -> Self {
        self.requirements = self.requirements.with_resource_base(base_url);
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.requirements = self.requirements.with_mime_type(mime_type);
        self
    }

    /// Turns the gate off: every request passes through.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

fn check_settlement_timeout(timeout: Duration, window_secs: u64) -> Result<(), ConfigurationError> {
    if timeout.is_zero() || timeout > Duration::from_secs(window_secs) {
        return Err(ConfigurationError::SettlementTimeoutOutOfRange {
            timeout_ms: timeout.as_millis(),
            window_secs,
        });
    }
    Ok(())
}

impl<S, I> Layer<I> for PaywallMiddleware<S>
where
    I: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    I::Future: Send + 'static,
    S: Settlement + Clone + Send + Sync + 'static,
{
    type Service = PaywallService<S>;

    fn layer(&self, inner: I) -> Self::Service {
        // Minimum retention; each record also outlives its proof's validBefore.
        let retention = Duration::from_secs(self.requirements.max_timeout_seconds());
        let gate = PaywallGate {
            requirements: self.requirements.clone(),
            verifier: PaymentVerifier::new(self.settlement.clone())
                .with_settlement_timeout(self.settlement_timeout),
            replay_guard: ReplayGuard::new(Arc::clone(&self.replay_store), retention),
            recorder: Arc::clone(&self.recorder),
            recording_timeout: self.recording_timeout,
            rate_limiter: self.rate_limiter.clone(),
            client_key_source: self.client_key_source.clone(),
            allow_list: self.allow_list.clone(),
            enabled: self.enabled,
            pay_to: self.pay_to,
        };
        PaywallService {
            gate: Arc::new(gate),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Axum service that enforces payment on incoming requests.
pub struct PaywallService<S> {
    gate: Arc<PaywallGate<S>>,
    /// The inner Axum service being wrapped
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<S> Clone for PaywallService<S> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            inner: self.inner.clone(),
        }
    }
}

impl<S> Service<Request> for PaywallService<S>
where
    S: Settlement + Send + Sync + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    /// Delegates readiness polling to the wrapped inner service.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let gate = Arc::clone(&self.gate);
        Box::pin(gate.handle_request(self.inner.clone(), req))
    }
}
