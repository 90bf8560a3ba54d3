//! Axum middleware that gates routes behind [x402](https://www.x402.org) stablecoin micropayments.
//!
//! This crate provides a [`PaywallMiddleware`] Axum layer that prices each request from a
//! [`ResourcePriceCatalog`](x402_paywall_types::pricing::ResourcePriceCatalog), verifies
//! payment proofs through a [`Settlement`] service, and admits each proof at most once.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use alloy_primitives::address;
//! use axum::{Extension, Json, Router, routing::get};
//! use std::sync::Arc;
//! use x402_paywall_axum::{FacilitatorClient, PaymentContext, PaywallMiddleware};
//! use x402_paywall_types::pricing::ResourcePriceCatalog;
//!
//! let facilitator = FacilitatorClient::try_from("https://facilitator.example.com/").unwrap();
//! let paywall = PaywallMiddleware::new(
//!     Arc::new(facilitator),
//!     Arc::new(ResourcePriceCatalog::platform_defaults()),
//!     "base",
//!     address!("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045"),
//! )
//! .unwrap();
//!
//! let app: Router = Router::new()
//!     .route("/api/ai/market-analysis", get(analysis))
//!     .layer(paywall);
//!
//! async fn analysis(Extension(payment): Extension<PaymentContext>) -> Json<PaymentContext> {
//!     Json(payment)
//! }
//! ```
//!
//! ## Modules
//!
//! - [`layer`] - The tower layer and service
//! - [`paygate`] - The per-request state machine
//! - [`verifier`] - Ordered proof checks with a bounded settlement call
//! - [`settlement`] - The settlement capability trait
//! - [`facilitator_client`] - Settlement through a remote facilitator's `/verify`
//! - [`replay`] - Single-use enforcement of proof identifiers
//! - [`recorder`] - Revenue events for admitted requests
//! - [`rate_limit`] - Per-client throttling of requirement issuance

pub mod facilitator_client;
pub mod layer;
pub mod paygate;
pub mod rate_limit;
pub mod recorder;
pub mod replay;
pub mod settlement;
pub mod verifier;

pub use facilitator_client::FacilitatorClient;
pub use layer::{PaywallMiddleware, PaywallService};
pub use paygate::{AllowList, PaymentContext};
pub use settlement::{AuthorizationVerdict, Settlement};
