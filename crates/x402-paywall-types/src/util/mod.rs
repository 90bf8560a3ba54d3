//! Utility types shared by the paywall crates.
//!
//! - [`b64`] - Base64 encoding/decoding of header values
//! - [`money_amount`] - Human-readable price parsing

pub mod b64;
pub mod money_amount;

pub use b64::*;
pub use money_amount::*;
