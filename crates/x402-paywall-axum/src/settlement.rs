//! The settlement capability the verifier delegates cryptographic checks to.
//!
//! The gateway never verifies a signature itself. An implementation of
//! [`Settlement`] (a remote facilitator, a wallet service, a chain RPC
//! integration) is the sole source of truth on whether a proof authorizes
//! the transfer a requirement asks for.

use std::fmt::{Debug, Display};
use std::sync::Arc;
use x402_paywall_types::proto::{PaymentProof, PaymentRequirement};

/// What the settlement service concluded about a transfer authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationVerdict {
    /// The proof authorizes at least `maxAmountRequired` of the asset to
    /// `payTo`, signed by `payer`.
    Authorized { payer: Option<String> },
    /// The signature is valid but authorizes less than required.
    InsufficientAmount,
    /// The signature does not cover this transfer, asset, or recipient.
    SignatureInvalid,
    /// The authorization window has closed.
    Expired,
}

/// Checks whether a proof authorizes the transfer a requirement describes.
///
/// Errors mean the check could not be completed; callers must treat them as
/// a rejection, never as a pass.
pub trait Settlement {
    type Error: Debug + Display;

    fn verify_transfer_authorization(
        &self,
        proof: &PaymentProof,
        requirement: &PaymentRequirement,
    ) -> impl Future<Output = Result<AuthorizationVerdict, Self::Error>> + Send;
}

impl<T: Settlement> Settlement for Arc<T> {
    type Error = T::Error;

    fn verify_transfer_authorization(
        &self,
        proof: &PaymentProof,
        requirement: &PaymentRequirement,
    ) -> impl Future<Output = Result<AuthorizationVerdict, Self::Error>> + Send {
        self.as_ref()
            .verify_transfer_authorization(proof, requirement)
    }
}
