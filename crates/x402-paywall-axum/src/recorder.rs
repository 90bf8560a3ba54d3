//! Revenue recording for admitted requests.
//!
//! The gate emits one [`PaymentSuccessEvent`] per admitted request. Recording
//! runs off the request path and its failures are logged only: an admission
//! is never reversed because the audit trail could not be written.

use async_trait::async_trait;
use serde::Serialize;
use x402_paywall_types::codec::ProofId;
use x402_paywall_types::proto::AtomicAmount;
use x402_paywall_types::timestamp::UnixTimestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSuccessEvent {
    pub resource: String,
    pub network: String,
    pub amount: AtomicAmount,
    pub timestamp: UnixTimestamp,
    pub proof_id: ProofId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("Failed to write revenue record: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize revenue record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Revenue store rejected the record: {0}")]
    Rejected(String),
}

/// Append-only sink for revenue events.
#[async_trait]
pub trait RevenueRecorder: Send + Sync {
    async fn record(&self, event: &PaymentSuccessEvent) -> Result<(), RecorderError>;
}

/// Writes each event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

#[async_trait]
impl RevenueRecorder for TracingRecorder {
    async fn record(&self, event: &PaymentSuccessEvent) -> Result<(), RecorderError> {
        tracing::info!(
            resource = %event.resource,
            network = %event.network,
            amount = %event.amount,
            timestamp = %event.timestamp,
            proof_id = %event.proof_id,
            payer = event.payer.as_deref(),
            "Payment recorded"
        );
        Ok(())
    }
}
