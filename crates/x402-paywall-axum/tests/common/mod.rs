#![allow(dead_code)]

use alloy_primitives::{Address, B256, Bytes, address, keccak256};
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Request;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use x402_paywall_axum::recorder::{PaymentSuccessEvent, RecorderError, RevenueRecorder};
use x402_paywall_axum::{AuthorizationVerdict, PaymentContext, PaywallMiddleware, Settlement};
use x402_paywall_types::codec::PaymentProofCodec;
use x402_paywall_types::pricing::ResourcePriceCatalog;
use x402_paywall_types::proto::{
    AtomicAmount, ExactEvmPayload, PaymentProof, PaymentRequirement, TransferAuthorization,
    X402Version1,
};
use x402_paywall_types::timestamp::UnixTimestamp;

pub const PAY_TO: Address = address!("0x209693Bc6afc0C5328bA36FaF03C514EF312287C");
pub const PAYER: Address = address!("0x857b06519E91e3A54538791bDbb0E22373e36b66");
pub const BASE_SEPOLIA_USDC: Address = address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e");

/// Deterministic stand-in for an EIP-712 signature: a hash over every
/// authorization field and the asset contract.
fn mock_signature(authorization: &TransferAuthorization, asset: Address) -> Bytes {
    let mut preimage = Vec::new();
    preimage.extend_from_slice(authorization.from.as_slice());
    preimage.extend_from_slice(authorization.to.as_slice());
    preimage.extend_from_slice(&authorization.value.as_u128().to_be_bytes());
    preimage.extend_from_slice(&authorization.valid_after.as_secs().to_be_bytes());
    preimage.extend_from_slice(&authorization.valid_before.as_secs().to_be_bytes());
    preimage.extend_from_slice(authorization.nonce.as_slice());
    preimage.extend_from_slice(asset.as_slice());
    Bytes::from(keccak256(preimage).to_vec())
}

/// Signs transfer authorizations the way a client wallet would.
pub struct MockWallet {
    nonce: AtomicUsize,
}

impl MockWallet {
    pub fn new() -> Self {
        Self {
            nonce: AtomicUsize::new(1),
        }
    }

    pub fn sign(&self, network: &str, value: u128, asset: Address, to: Address) -> PaymentProof {
        let valid_before = UnixTimestamp::now() + 300;
        self.sign_until(network, value, asset, to, valid_before)
    }

    /// Like [`MockWallet::sign`], with the authorization closing at `valid_before`.
    pub fn sign_until(
        &self,
        network: &str,
        value: u128,
        asset: Address,
        to: Address,
        valid_before: UnixTimestamp,
    ) -> PaymentProof {
        let now = UnixTimestamp::now().as_secs();
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst) as u64;
        let authorization = TransferAuthorization {
            from: PAYER,
            to,
            value: AtomicAmount(value),
            valid_after: UnixTimestamp::from_secs(now.saturating_sub(60)),
            valid_before,
            nonce: B256::left_padding_from(&nonce.to_be_bytes()),
        };
        let payload = ExactEvmPayload {
            signature: mock_signature(&authorization, asset),
            authorization,
        };
        PaymentProof {
            x402_version: X402Version1,
            scheme: "exact".to_string(),
            network: network.to_string(),
            payload: serde_json::to_value(payload).unwrap(),
        }
    }

    /// A proof satisfying `requirement` exactly.
    pub fn pay(&self, requirement: &PaymentRequirement) -> PaymentProof {
        self.sign(
            &requirement.network,
            requirement.max_amount_required.as_u128(),
            requirement.asset,
            requirement.pay_to,
        )
    }
}

/// Settlement service checking [`mock_signature`]s.
pub struct MockSettlement {
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockSettlement {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("settlement backend error")]
pub struct MockSettlementError;

impl Settlement for MockSettlement {
    type Error = MockSettlementError;

    async fn verify_transfer_authorization(
        &self,
        proof: &PaymentProof,
        requirement: &PaymentRequirement,
    ) -> Result<AuthorizationVerdict, Self::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let Some(payload) = proof.exact_evm_payload() else {
            return Ok(AuthorizationVerdict::SignatureInvalid);
        };
        let authorization = &payload.authorization;
        if payload.signature != mock_signature(authorization, requirement.asset)
            || authorization.to != requirement.pay_to
        {
            return Ok(AuthorizationVerdict::SignatureInvalid);
        }
        if authorization.value < requirement.max_amount_required {
            return Ok(AuthorizationVerdict::InsufficientAmount);
        }
        Ok(AuthorizationVerdict::Authorized {
            payer: Some(authorization.from.to_string()),
        })
    }
}

/// Forwards every recorded event to a channel.
pub struct ChannelRecorder(pub mpsc::UnboundedSender<PaymentSuccessEvent>);

#[async_trait]
impl RevenueRecorder for ChannelRecorder {
    async fn record(&self, event: &PaymentSuccessEvent) -> Result<(), RecorderError> {
        self.0
            .send(event.clone())
            .map_err(|e| RecorderError::Rejected(e.to_string()))
    }
}

pub struct FailingRecorder;

#[async_trait]
impl RevenueRecorder for FailingRecorder {
    async fn record(&self, _event: &PaymentSuccessEvent) -> Result<(), RecorderError> {
        Err(RecorderError::Rejected("store offline".to_string()))
    }
}

pub fn paywall(settlement: Arc<MockSettlement>) -> PaywallMiddleware<Arc<MockSettlement>> {
    PaywallMiddleware::new(
        settlement,
        Arc::new(ResourcePriceCatalog::platform_defaults()),
        "base-sepolia",
        PAY_TO,
    )
    .unwrap()
}

async fn echo_payment(payment: Option<Extension<PaymentContext>>) -> Json<Value> {
    match payment {
        Some(Extension(context)) => Json(json!({ "paid": true, "payment": context })),
        None => Json(json!({ "paid": false })),
    }
}

pub fn app(paywall: PaywallMiddleware<Arc<MockSettlement>>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/auth/login", post(echo_payment))
        .route("/api/ai/market-analysis", get(echo_payment))
        .route("/api/agents/create", post(echo_payment))
        .route("/api/market/data", get(echo_payment))
        .layer(paywall)
}

pub fn request(method: &str, uri: &str, proof: Option<&PaymentProof>) -> Request {
    let mut builder = http::Request::builder().method(method).uri(uri);
    if let Some(proof) = proof {
        builder = builder.header("X-PAYMENT", PaymentProofCodec::encode(proof).unwrap());
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// The requirement the gate issues for `method uri`.
pub async fn requirement_for(app: &Router, method: &str, uri: &str) -> PaymentRequirement {
    use tower::ServiceExt;
    let response = app.clone().oneshot(request(method, uri, None)).await.unwrap();
    assert_eq!(response.status(), 402);
    let body = json_body(response).await;
    serde_json::from_value(body["accepts"][0].clone()).unwrap()
}
