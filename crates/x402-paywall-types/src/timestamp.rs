//! Unix timestamps for payment authorization windows.
//!
//! A wallet-signed transfer authorization is only valid between its
//! `validAfter` and `validBefore` timestamps. Both travel as stringified
//! integers so JSON clients never lose precision.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::SystemTime;

/// Seconds since the Unix epoch.
///
/// ```
/// use x402_paywall_types::timestamp::UnixTimestamp;
///
/// let issued = UnixTimestamp::from_secs(1_700_000_000);
/// let expires = issued + 300;
/// assert_eq!(expires.as_secs(), 1_700_000_300);
/// assert!(expires.is_before(UnixTimestamp::from_secs(1_700_000_301)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnixTimestamp(u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ts = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))?;
        Ok(UnixTimestamp(ts))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0.saturating_add(rhs))
    }
}

impl UnixTimestamp {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Current system time.
    ///
    /// A clock set before the epoch reads as the epoch itself, which makes
    /// every authorization window look expired rather than valid.
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self(now)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// True when `self` is strictly earlier than `other`.
    pub fn is_before(&self, other: UnixTimestamp) -> bool {
        self.0 < other.0
    }
}
