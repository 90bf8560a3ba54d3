//! x402 paywall gateway entrypoint.
//!
//! Serves the AI trading platform API with its paid endpoints behind x402
//! micropayments. Clients without a payment receive `402 Payment Required`
//! and a requirement to sign; paid requests are verified through the
//! configured facilitator before they reach a handler.
//!
//! Endpoints:
//! - `GET /health`, `GET /api/health` – Liveness
//! - `GET /api/payments/pricing` – Price list with atomic amounts per method
//! - `/api/ai/*`, `/api/agents/*`, `/api/market/data` – Paid endpoints
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` points at the JSON configuration file
//! - `RUST_LOG` sets the log filter
//! - `OTEL_*` variables enable OpenTelemetry export

mod config;
mod handlers;
mod paywall;
mod revenue_log;
mod sig_down;
mod telemetry;

use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use tower_http::cors;

use crate::config::Config;
use crate::sig_down::SigDown;
use crate::telemetry::Telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env variables
    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register()?;

    let config = Config::load()?;
    let paywall = paywall::from_config(&config).await?;
    tracing::info!(
        network = config.network(),
        pay_to = %config.pay_to(),
        facilitator = %config.facilitator_url(),
        "Paywall configured"
    );

    let http_endpoints = handlers::routes(paywall)
        .layer(telemetry.http_tracing())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers(cors::Any)
                .expose_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            return Err(e.into());
        }
    };
    tracing::info!("Starting server at http://{}", addr);

    let sig_down = SigDown::try_new()?;
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(async move { sig_down.recv().await })
        .await?;

    Ok(())
}
