//! Wire format of the paywall protocol (x402 version 1).
//!
//! # Key Types
//!
//! - [`PaymentRequirement`] - What payment would satisfy a request, built fresh per request
//! - [`PaymentRequired`] - Body of a `402 Payment Required` response
//! - [`PaymentProof`] - Wallet-signed authorization decoded from the `X-PAYMENT` header
//! - [`ExactEvmPayload`] - Typed view of an `exact` scheme proof payload
//! - [`VerificationResult`] - Outcome of checking a proof against a requirement
//! - [`InvalidReason`] - Machine-readable rejection reasons

use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;

use crate::timestamp::UnixTimestamp;

/// Version marker for x402 protocol version 1. Serializes as the integer `1`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct X402Version1;

impl X402Version1 {
    pub const VALUE: u8 = 1;
}

impl Serialize for X402Version1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version1 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        if num == Self::VALUE {
            Ok(X402Version1)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected version {}, got {}",
                Self::VALUE,
                num
            )))
        }
    }
}

impl Display for X402Version1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::VALUE)
    }
}

/// Payment schemes the gateway issues requirements for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Transfer of exactly the required amount, authorized by a signed
    /// `transferWithAuthorization` message.
    Exact,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Exact => "exact",
        }
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An amount in the token's smallest indivisible unit.
///
/// Serialized as a decimal string: atomic amounts routinely exceed what a
/// JavaScript number can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AtomicAmount(pub u128);

impl AtomicAmount {
    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl From<u128> for AtomicAmount {
    fn from(value: u128) -> Self {
        AtomicAmount(value)
    }
}

impl Display for AtomicAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for AtomicAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AtomicAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<u128>()
            .map(AtomicAmount)
            .map_err(|_| serde::de::Error::custom("amount must be a non-negative integer string"))
    }
}

/// EIP-712 domain of the asset, which the wallet needs to sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementExtra {
    pub name: String,
    pub version: String,
}

/// Server-issued description of the payment that unlocks a resource.
///
/// Always derived from the price catalog at the moment it is needed; the
/// amount is never taken from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    pub scheme: Scheme,
    pub network: String,
    pub max_amount_required: AtomicAmount,
    pub resource: String,
    pub description: String,
    pub mime_type: String,
    pub pay_to: Address,
    pub max_timeout_seconds: u64,
    pub asset: Address,
    pub extra: RequirementExtra,
}

/// Body of a `402 Payment Required` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    pub x402_version: X402Version1,
    pub error: String,
    pub accepts: Vec<PaymentRequirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<InvalidReason>,
}

impl PaymentRequired {
    pub fn new(error: impl Into<String>, accepts: Vec<PaymentRequirement>) -> Self {
        Self {
            x402_version: X402Version1,
            error: error.into(),
            accepts,
            message: None,
            invalid_reason: None,
        }
    }

    pub fn with_reason(mut self, reason: InvalidReason, message: impl Into<String>) -> Self {
        self.invalid_reason = Some(reason);
        self.message = Some(message.into());
        self
    }
}

/// A wallet-issued payment proof as carried in the `X-PAYMENT` header.
///
/// The payload is opaque to the gateway: only the settlement service
/// interprets its signature. Its `Debug` output omits the payload so the
/// signed authorization never reaches a log.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProof {
    pub x402_version: X402Version1,
    pub scheme: String,
    pub network: String,
    pub payload: serde_json::Value,
}

impl fmt::Debug for PaymentProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentProof")
            .field("x402_version", &self.x402_version)
            .field("scheme", &self.scheme)
            .field("network", &self.network)
            .field("payload", &"<redacted>")
            .finish()
    }
}

impl PaymentProof {
    /// Interprets the payload as an `exact` EVM authorization, if it is one.
    pub fn exact_evm_payload(&self) -> Option<ExactEvmPayload> {
        ExactEvmPayload::deserialize(&self.payload).ok()
    }

    /// End of the authorization's validity window, when the payload has one.
    pub fn valid_before(&self) -> Option<UnixTimestamp> {
        self.exact_evm_payload()
            .map(|payload| payload.authorization.valid_before)
    }
}

/// Payload of an `exact` scheme proof on an EVM network: an ERC-3009
/// `transferWithAuthorization` message and its signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactEvmPayload {
    pub signature: Bytes,
    pub authorization: TransferAuthorization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAuthorization {
    pub from: Address,
    pub to: Address,
    pub value: AtomicAmount,
    pub valid_after: UnixTimestamp,
    pub valid_before: UnixTimestamp,
    pub nonce: B256,
}

/// Machine-readable reason a payment was not accepted.
///
/// Each reason implies a different client remedy, so they are never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// The header could not be decoded. Fix the encoding.
    MalformedProof,
    /// The proof targets another network.
    NetworkMismatch,
    /// The proof uses a scheme other than `exact`.
    SchemeUnsupported,
    /// The authorized value is below `maxAmountRequired`.
    InsufficientAmount,
    /// The signature does not authorize this transfer.
    SignatureInvalid,
    /// The authorization window has closed.
    ProofExpired,
    /// The proof was already used. Sign a new one.
    ReplayDetected,
    /// The settlement check could not be completed. Retry later.
    SettlementUnavailable,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::MalformedProof => "malformed_proof",
            InvalidReason::NetworkMismatch => "network_mismatch",
            InvalidReason::SchemeUnsupported => "scheme_unsupported",
            InvalidReason::InsufficientAmount => "insufficient_amount",
            InvalidReason::SignatureInvalid => "signature_invalid",
            InvalidReason::ProofExpired => "proof_expired",
            InvalidReason::ReplayDetected => "replay_detected",
            InvalidReason::SettlementUnavailable => "settlement_unavailable",
        }
    }
}

impl InvalidReason {
    /// What the client should do before trying again.
    pub fn remedy(&self) -> &'static str {
        match self {
            InvalidReason::MalformedProof => "Send the proof as base64-encoded JSON",
            InvalidReason::NetworkMismatch => "Sign the payment on the network listed in accepts",
            InvalidReason::SchemeUnsupported => "Use the exact payment scheme",
            InvalidReason::InsufficientAmount => "Authorize at least maxAmountRequired",
            InvalidReason::SignatureInvalid => {
                "Sign a new authorization for the listed asset and recipient"
            }
            InvalidReason::ProofExpired => "Sign a new authorization with a later validBefore",
            InvalidReason::ReplayDetected => "Sign a new proof; each proof is accepted once",
            InvalidReason::SettlementUnavailable => "Retry later with the same proof",
        }
    }
}

impl Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of verifying a proof against a requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    Valid { payer: Option<String> },
    Invalid { reason: InvalidReason },
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationResult::Valid { .. })
    }

    pub fn invalid_reason(&self) -> Option<InvalidReason> {
        match self {
            VerificationResult::Valid { .. } => None,
            VerificationResult::Invalid { reason } => Some(*reason),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerificationResultWire {
    is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<InvalidReason>,
}

impl Serialize for VerificationResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = match self {
            VerificationResult::Valid { payer } => VerificationResultWire {
                is_valid: true,
                payer: payer.clone(),
                invalid_reason: None,
            },
            VerificationResult::Invalid { reason } => VerificationResultWire {
                is_valid: false,
                payer: None,
                invalid_reason: Some(*reason),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerificationResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = VerificationResultWire::deserialize(deserializer)?;
        if wire.is_valid {
            Ok(VerificationResult::Valid { payer: wire.payer })
        } else {
            let reason = wire
                .invalid_reason
                .ok_or_else(|| serde::de::Error::missing_field("invalidReason"))?;
            Ok(VerificationResult::Invalid { reason })
        }
    }
}
