//! Decoding of the `X-PAYMENT` header.
//!
//! The header is standard base64 over a JSON [`PaymentProof`]. Decoding is
//! purely syntactic: it never inspects the signature and never panics,
//! whatever bytes the client sends. Each failure is a typed [`DecodeError`]
//! so the gate can answer `402` with `malformed_proof`.

use alloy_primitives::{B256, keccak256};
use serde_json::Value;
use std::fmt;
use std::fmt::Display;

use crate::proto::PaymentProof;
use crate::util::Base64Bytes;

/// Request header carrying the payment proof.
pub const PAYMENT_HEADER: &str = "X-PAYMENT";

/// Upper bound on the encoded header size.
pub const MAX_HEADER_BYTES: usize = 16 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("{PAYMENT_HEADER} header is empty")]
    Empty,
    #[error("{PAYMENT_HEADER} header is {len} bytes, limit is {MAX_HEADER_BYTES}")]
    TooLarge { len: usize },
    #[error("{PAYMENT_HEADER} header is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("{PAYMENT_HEADER} header does not contain a valid payment proof: {0}")]
    Json(#[from] serde_json::Error),
}

/// Identifier of a proof for replay protection: keccak-256 of the canonical
/// JSON encoding of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProofId(B256);

impl ProofId {
    /// Hashes `proof`'s payload. Object keys are serialized in sorted order,
    /// so formatting differences in the original header do not change the id.
    pub fn of(proof: &PaymentProof) -> Self {
        let mut canonical = Vec::new();
        write_canonical(&proof.payload, &mut canonical);
        ProofId(keccak256(canonical))
    }

    pub fn as_b256(&self) -> &B256 {
        &self.0
    }
}

impl Display for ProofId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for ProofId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Writes `value` as compact JSON with object keys in sorted order,
/// independent of how the map type orders its entries.
fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(&Value::String(key.clone()), out);
                out.push(b':');
                write_canonical(&map[key], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => out.extend_from_slice(scalar.to_string().as_bytes()),
    }
}

/// A decoded proof and its identifier.
#[derive(Debug, Clone)]
pub struct DecodedProof {
    pub proof: PaymentProof,
    pub id: ProofId,
}

pub struct PaymentProofCodec;

impl PaymentProofCodec {
    /// Decodes a raw header value.
    pub fn decode(header: &[u8]) -> Result<DecodedProof, DecodeError> {
        let encoded = Base64Bytes::from(header);
        if encoded.is_empty() {
            return Err(DecodeError::Empty);
        }
        if encoded.len() > MAX_HEADER_BYTES {
            return Err(DecodeError::TooLarge { len: encoded.len() });
        }
        let json = encoded.decode()?;
        let proof: PaymentProof = serde_json::from_slice(&json)?;
        let id = ProofId::of(&proof);
        Ok(DecodedProof { proof, id })
    }

    /// Encodes a proof into a header value, as a client wallet would.
    pub fn encode(proof: &PaymentProof) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(proof)?;
        Ok(Base64Bytes::encode(json).to_string())
    }
}
