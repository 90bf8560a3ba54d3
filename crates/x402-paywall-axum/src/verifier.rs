//! Verification of a decoded proof against a freshly built requirement.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. the proof targets the requirement's network,
//! 2. the proof uses the `exact` scheme,
//! 3. the [`Settlement`] service confirms the transfer authorization,
//! 4. the authorization window has not closed.
//!
//! The settlement call is bounded by a timeout. A timeout or an error from
//! the settlement service is a rejection with `settlement_unavailable`.

use std::time::Duration;
use x402_paywall_types::proto::{InvalidReason, PaymentProof, PaymentRequirement, Scheme, VerificationResult};
use x402_paywall_types::timestamp::UnixTimestamp;

use crate::settlement::{AuthorizationVerdict, Settlement};

/// Why a proof failed verification.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    #[error("Proof is for network {actual}, expected {expected}")]
    NetworkMismatch { expected: String, actual: String },
    #[error("Unsupported payment scheme {0:?}, only \"exact\" is accepted")]
    SchemeUnsupported(String),
    #[error("Authorized amount is below the required amount")]
    InsufficientAmount,
    #[error("Signature does not authorize the required transfer")]
    SignatureInvalid,
    #[error("Payment authorization has expired")]
    ProofExpired { valid_before: Option<UnixTimestamp> },
    #[error("Settlement service unavailable: {0}")]
    SettlementUnavailable(String),
}

impl VerificationFailure {
    pub fn reason(&self) -> InvalidReason {
        match self {
            VerificationFailure::NetworkMismatch { .. } => InvalidReason::NetworkMismatch,
            VerificationFailure::SchemeUnsupported(_) => InvalidReason::SchemeUnsupported,
            VerificationFailure::InsufficientAmount => InvalidReason::InsufficientAmount,
            VerificationFailure::SignatureInvalid => InvalidReason::SignatureInvalid,
            VerificationFailure::ProofExpired { .. } => InvalidReason::ProofExpired,
            VerificationFailure::SettlementUnavailable(_) => InvalidReason::SettlementUnavailable,
        }
    }

    /// The wire form of this failure.
    pub fn to_result(&self) -> VerificationResult {
        VerificationResult::Invalid {
            reason: self.reason(),
        }
    }
}

/// A proof that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub payer: Option<String>,
}

impl VerifiedPayment {
    /// The wire form of this admission.
    pub fn to_result(&self) -> VerificationResult {
        VerificationResult::Valid {
            payer: self.payer.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentVerifier<S> {
    settlement: S,
    settlement_timeout: Duration,
}

impl<S> PaymentVerifier<S> {
    pub const DEFAULT_SETTLEMENT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(settlement: S) -> Self {
        Self {
            settlement,
            settlement_timeout: Self::DEFAULT_SETTLEMENT_TIMEOUT,
        }
    }

    pub fn with_settlement_timeout(mut self, timeout: Duration) -> Self {
        self.settlement_timeout = timeout;
        self
    }

    pub fn settlement_timeout(&self) -> Duration {
        self.settlement_timeout
    }

    pub fn settlement(&self) -> &S {
        &self.settlement
    }
}

impl<S: Settlement> PaymentVerifier<S> {
    pub async fn verify(
        &self,
        proof: &PaymentProof,
        requirement: &PaymentRequirement,
    ) -> Result<VerifiedPayment, VerificationFailure> {
        let outcome = self.check(proof, requirement).await;
        let result = match &outcome {
            Ok(verified) => verified.to_result(),
            Err(failure) => failure.to_result(),
        };
        tracing::debug!(
            valid = result.is_valid(),
            reason = ?result.invalid_reason(),
            network = %proof.network,
            "Verification finished"
        );
        outcome
    }

    async fn check(
        &self,
        proof: &PaymentProof,
        requirement: &PaymentRequirement,
    ) -> Result<VerifiedPayment, VerificationFailure> {
        if proof.network != requirement.network {
            return Err(VerificationFailure::NetworkMismatch {
                expected: requirement.network.clone(),
                actual: proof.network.clone(),
            });
        }
        if proof.scheme != Scheme::Exact.as_str() {
            return Err(VerificationFailure::SchemeUnsupported(proof.scheme.clone()));
        }

        let check = self
            .settlement
            .verify_transfer_authorization(proof, requirement);
        let verdict = match tokio::time::timeout(self.settlement_timeout, check).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(err)) => {
                return Err(VerificationFailure::SettlementUnavailable(err.to_string()));
            }
            Err(_) => {
                return Err(VerificationFailure::SettlementUnavailable(format!(
                    "no answer within {}s",
                    self.settlement_timeout.as_secs_f64()
                )));
            }
        };
        let valid_before = proof.valid_before();
        let payer = match verdict {
            AuthorizationVerdict::Authorized { payer } => payer,
            AuthorizationVerdict::InsufficientAmount => {
                return Err(VerificationFailure::InsufficientAmount);
            }
            AuthorizationVerdict::SignatureInvalid => {
                return Err(VerificationFailure::SignatureInvalid);
            }
            AuthorizationVerdict::Expired => {
                return Err(VerificationFailure::ProofExpired { valid_before });
            }
        };

        if let Some(deadline) = valid_before
            && !UnixTimestamp::now().is_before(deadline)
        {
            return Err(VerificationFailure::ProofExpired { valid_before });
        }

        Ok(VerifiedPayment { payer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use x402_paywall_types::proto::{AtomicAmount, RequirementExtra, X402Version1};

    #[derive(Debug, thiserror::Error)]
    #[error("connection refused")]
    struct Unreachable;

    enum Behavior {
        Answer(AuthorizationVerdict),
        Fail,
        Hang,
    }

    struct StubSettlement {
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl StubSettlement {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Settlement for StubSettlement {
        type Error = Unreachable;

        async fn verify_transfer_authorization(
            &self,
            _proof: &PaymentProof,
            _requirement: &PaymentRequirement,
        ) -> Result<AuthorizationVerdict, Self::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Answer(verdict) => Ok(verdict.clone()),
                Behavior::Fail => Err(Unreachable),
                Behavior::Hang => std::future::pending().await,
            }
        }
    }

    fn requirement() -> PaymentRequirement {
        PaymentRequirement {
            scheme: Scheme::Exact,
            network: "base-sepolia".to_string(),
            max_amount_required: AtomicAmount(20_000),
            resource: "/api/ai/market-analysis".to_string(),
            description: "AI-powered market sentiment analysis".to_string(),
            mime_type: "application/json".to_string(),
            pay_to: address!("0x209693Bc6afc0C5328bA36FaF03C514EF312287C"),
            max_timeout_seconds: 300,
            asset: address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
            extra: RequirementExtra {
                name: "USDC".to_string(),
                version: "2".to_string(),
            },
        }
    }

    fn proof_valid_until(valid_before: u64) -> PaymentProof {
        PaymentProof {
            x402_version: X402Version1,
            scheme: "exact".to_string(),
            network: "base-sepolia".to_string(),
            payload: json!({
                "signature": "0x1234",
                "authorization": {
                    "from": "0x857b06519E91e3A54538791bDbb0E22373e36b66",
                    "to": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                    "value": "20000",
                    "validAfter": "0",
                    "validBefore": valid_before.to_string(),
                    "nonce": "0xf3746613c2d920b5fdabc0856f2aeb2d4f88ee6037b8cc5d04a71a4462f13480"
                }
            }),
        }
    }

    fn fresh_proof() -> PaymentProof {
        proof_valid_until(UnixTimestamp::now().as_secs() + 300)
    }

    fn authorized() -> Behavior {
        Behavior::Answer(AuthorizationVerdict::Authorized {
            payer: Some("0x857b06519E91e3A54538791bDbb0E22373e36b66".to_string()),
        })
    }

    #[tokio::test]
    async fn authorized_proof_is_valid() {
        let verifier = PaymentVerifier::new(StubSettlement::new(authorized()));
        let verified = verifier.verify(&fresh_proof(), &requirement()).await.unwrap();
        assert!(verified.payer.is_some());
    }

    #[tokio::test]
    async fn network_is_checked_before_settlement() {
        let settlement = StubSettlement::new(authorized());
        let verifier = PaymentVerifier::new(settlement.clone());
        let mut proof = fresh_proof();
        proof.network = "base".to_string();
        let err = verifier.verify(&proof, &requirement()).await.unwrap_err();
        assert_eq!(err.reason(), InvalidReason::NetworkMismatch);
        assert_eq!(settlement.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn only_exact_scheme_is_supported() {
        let settlement = StubSettlement::new(authorized());
        let verifier = PaymentVerifier::new(settlement.clone());
        let mut proof = fresh_proof();
        proof.scheme = "upto".to_string();
        let err = verifier.verify(&proof, &requirement()).await.unwrap_err();
        assert_eq!(err, VerificationFailure::SchemeUnsupported("upto".to_string()));
        assert_eq!(settlement.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn settlement_verdicts_keep_their_reason() {
        let cases = [
            (AuthorizationVerdict::InsufficientAmount, InvalidReason::InsufficientAmount),
            (AuthorizationVerdict::SignatureInvalid, InvalidReason::SignatureInvalid),
            (AuthorizationVerdict::Expired, InvalidReason::ProofExpired),
        ];
        for (verdict, reason) in cases {
            let verifier = PaymentVerifier::new(StubSettlement::new(Behavior::Answer(verdict)));
            let err = verifier.verify(&fresh_proof(), &requirement()).await.unwrap_err();
            assert_eq!(err.reason(), reason);
        }
    }

    #[tokio::test]
    async fn elapsed_window_is_expired() {
        let verifier = PaymentVerifier::new(StubSettlement::new(authorized()));
        let proof = proof_valid_until(UnixTimestamp::now().as_secs().saturating_sub(1));
        let err = verifier.verify(&proof, &requirement()).await.unwrap_err();
        assert!(matches!(err, VerificationFailure::ProofExpired { valid_before: Some(_) }));
    }

    #[tokio::test]
    async fn settlement_error_fails_closed() {
        let verifier = PaymentVerifier::new(StubSettlement::new(Behavior::Fail));
        let err = verifier.verify(&fresh_proof(), &requirement()).await.unwrap_err();
        assert_eq!(err.reason(), InvalidReason::SettlementUnavailable);
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn hung_settlement_times_out() {
        let verifier = PaymentVerifier::new(StubSettlement::new(Behavior::Hang))
            .with_settlement_timeout(Duration::from_millis(20));
        let err = verifier.verify(&fresh_proof(), &requirement()).await.unwrap_err();
        assert_eq!(err.reason(), InvalidReason::SettlementUnavailable);
    }

    #[tokio::test]
    async fn outcomes_convert_to_wire_results() {
        let failure = VerificationFailure::InsufficientAmount.to_result();
        assert!(!failure.is_valid());
        assert_eq!(failure.invalid_reason(), Some(InvalidReason::InsufficientAmount));

        let verified = VerifiedPayment {
            payer: Some("0xpayer".to_string()),
        }
        .to_result();
        assert!(verified.is_valid());
        assert_eq!(verified.invalid_reason(), None);
        assert_eq!(
            verified,
            VerificationResult::Valid {
                payer: Some("0xpayer".to_string())
            }
        );
    }
}
