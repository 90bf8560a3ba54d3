//! HTTP endpoints of the trading platform gateway.
//!
//! Free endpoints report health and the price list. Paid endpoints sit
//! behind the paywall layer and echo the verified [`PaymentContext`] next to
//! their (placeholder) results, so a client can match the answer to the
//! payment it made.

use alloy_primitives::Address;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::instrument;
use x402_paywall_axum::PaymentContext;
use x402_paywall_types::pricing::HttpMethod;
use x402_paywall_types::proto::X402Version1;
use x402_paywall_types::requirement::{PaymentRequirementBuilder, RequirementError};

use crate::paywall::Paywall;

/// Methods listed in the price table for entries not pinned to a method.
const LISTED_METHODS: [HttpMethod; 4] = [
    HttpMethod::Get,
    HttpMethod::Post,
    HttpMethod::Put,
    HttpMethod::Delete,
];

/// Everything `GET /api/payments/pricing` reports.
#[derive(Debug, Clone)]
pub struct PriceList {
    requirements: PaymentRequirementBuilder,
    pay_to: Address,
}

impl PriceList {
    pub fn new(requirements: PaymentRequirementBuilder, pay_to: Address) -> Self {
        Self {
            requirements,
            pay_to,
        }
    }

    /// Renders the catalog with the atomic amount charged per method on the
    /// active network.
    pub fn to_json(&self) -> Result<Value, RequirementError> {
        let asset = self.requirements.asset()?;
        let catalog = self.requirements.catalog();
        let entries = catalog.entries();

        let mut resources = Vec::with_capacity(entries.len());
        for entry in &entries {
            let methods: Vec<HttpMethod> = match entry.http_method {
                Some(method) => vec![method],
                None => LISTED_METHODS
                    .into_iter()
                    .filter(|method| {
                        !entries.iter().any(|other| {
                            other.resource_path == entry.resource_path
                                && other.http_method == Some(*method)
                        })
                    })
                    .collect(),
            };
            let mut amounts = Map::new();
            for method in methods {
                let requirement =
                    self.requirements
                        .build(&entry.resource_path, method, self.pay_to)?;
                amounts.insert(
                    method.to_string(),
                    json!(requirement.max_amount_required),
                );
            }
            resources.push(json!({
                "path": entry.resource_path,
                "method": entry.http_method,
                "price": entry.base_amount,
                "description": entry.description,
                "maxAmountRequired": amounts,
            }));
        }

        Ok(json!({
            "x402Version": X402Version1,
            "scheme": "exact",
            "network": self.requirements.network(),
            "asset": asset.address,
            "decimals": asset.decimals,
            "payTo": self.pay_to,
            "maxTimeoutSeconds": self.requirements.max_timeout_seconds(),
            "defaultPrice": catalog.fallback(),
            "resources": resources,
        }))
    }
}

impl From<&Paywall> for PriceList {
    fn from(paywall: &Paywall) -> Self {
        Self::new(paywall.requirements().clone(), paywall.pay_to())
    }
}

/// Free routes merged with the paid routes wrapped in `paywall`.
pub fn routes(paywall: Paywall) -> Router {
    let price_list = Arc::new(PriceList::from(&paywall));
    let free = Router::new()
        .route("/health", get(get_health))
        .route("/api/health", get(get_health))
        .route("/api/payments/pricing", get(get_pricing))
        .with_state(price_list);
    free.merge(paid_routes().layer(paywall))
}

/// The catalog's paid endpoints, without the paywall.
pub fn paid_routes() -> Router {
    Router::new()
        .route("/api/ai/market-analysis", get(get_market_analysis))
        .route("/api/ai/trading-signals", get(get_trading_signals))
        .route("/api/ai/portfolio-optimization", post(post_portfolio_optimization))
        .route("/api/ai/risk-assessment", post(post_risk_assessment))
        .route("/api/agents/create", post(post_create_agent))
        .route("/api/agents/execute-trade", post(post_execute_trade))
        .route("/api/market/data", get(get_market_data))
}

/// `GET /health`
#[instrument(skip_all)]
pub async fn get_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `GET /api/payments/pricing`: the price list clients consult before paying.
#[instrument(skip_all)]
pub async fn get_pricing(State(price_list): State<Arc<PriceList>>) -> Response {
    match price_list.to_json() {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(error) => {
            tracing::error!(error = %error, "Unable to render price list");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

fn paid_reply(payment: Option<Extension<PaymentContext>>, data: Value) -> Json<Value> {
    Json(json!({
        "data": data,
        "payment": payment.map(|Extension(context)| context),
    }))
}

#[instrument(skip_all)]
pub async fn get_market_analysis(payment: Option<Extension<PaymentContext>>) -> impl IntoResponse {
    paid_reply(
        payment,
        json!({
            "sentiment": "neutral",
            "confidence": 0.5,
            "drivers": ["funding rates flat", "spot volume below 30-day average"],
        }),
    )
}

#[instrument(skip_all)]
pub async fn get_trading_signals(payment: Option<Extension<PaymentContext>>) -> impl IntoResponse {
    paid_reply(
        payment,
        json!({
            "signals": [
                { "symbol": "BTC-USD", "action": "hold", "strength": 0.4 },
                { "symbol": "ETH-USD", "action": "buy", "strength": 0.6 },
            ],
        }),
    )
}

#[instrument(skip_all)]
pub async fn post_portfolio_optimization(
    payment: Option<Extension<PaymentContext>>,
) -> impl IntoResponse {
    paid_reply(
        payment,
        json!({
            "allocation": { "BTC": 0.4, "ETH": 0.3, "USDC": 0.3 },
            "expectedSharpe": 1.1,
        }),
    )
}

#[instrument(skip_all)]
pub async fn post_risk_assessment(payment: Option<Extension<PaymentContext>>) -> impl IntoResponse {
    paid_reply(
        payment,
        json!({ "riskScore": 42, "valueAtRisk95": 0.08 }),
    )
}

#[instrument(skip_all)]
pub async fn post_create_agent(payment: Option<Extension<PaymentContext>>) -> impl IntoResponse {
    paid_reply(payment, json!({ "agent": { "status": "created" } }))
}

#[instrument(skip_all)]
pub async fn post_execute_trade(payment: Option<Extension<PaymentContext>>) -> impl IntoResponse {
    paid_reply(payment, json!({ "trade": { "status": "queued" } }))
}

#[instrument(skip_all)]
pub async fn get_market_data(payment: Option<Extension<PaymentContext>>) -> impl IntoResponse {
    paid_reply(
        payment,
        json!({
            "quotes": [
                { "symbol": "BTC-USD", "bid": "0", "ask": "0" },
                { "symbol": "ETH-USD", "bid": "0", "ask": "0" },
            ],
        }),
    )
}
