//! Environment variable resolution for configuration values.
//!
//! Secrets and deployment-specific values (the recipient wallet, the
//! facilitator URL) are usually kept out of the configuration file:
//!
//! ```json
//! {
//!   "payTo": "$PAYWALL_PAY_TO",
//!   "facilitatorUrl": "${FACILITATOR_URL}",
//!   "network": "base-sepolia"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::str::FromStr;

/// A value given either literally or as a `$VAR` / `${VAR}` reference,
/// resolved once at deserialization time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    /// Returns the variable name if `s` uses `$VAR` or `${VAR}` syntax.
    fn env_var_name(s: &str) -> Option<&str> {
        if let Some(braced) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
            return Some(braced);
        }
        let name = s.strip_prefix('$')?;
        let is_identifier =
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        is_identifier.then_some(name)
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        let value = match Self::env_var_name(&s) {
            Some(var_name) => std::env::var(var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{var_name}' not found (referenced as '{s}')"
                ))
            })?,
            None => s,
        };

        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {e}")))?;

        Ok(LiteralOrEnv(parsed))
    }
}

impl<T> Serialize for LiteralOrEnv<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}
