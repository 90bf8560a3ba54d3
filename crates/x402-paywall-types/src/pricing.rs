//! Per-resource prices.
//!
//! The [`ResourcePriceCatalog`] maps a request path (and optionally an HTTP
//! method) to a base price in whole stablecoin units. The HTTP method then
//! scales that price: writes cost more than reads.
//!
//! | method | multiplier |
//! |--------|-----------|
//! | GET    | 1.0 |
//! | POST   | 1.5 |
//! | PUT    | 1.2 |
//! | DELETE | 1.3 |
//! | other  | 1.0 |
//!
//! Lookups are exact on the path. A path that is not in the catalog is
//! charged the catalog's fallback price, which is never zero: there is no way
//! to configure a free endpoint by omission.
//!
//! ```
//! use rust_decimal::Decimal;
//! use x402_paywall_types::pricing::{HttpMethod, ResourcePriceCatalog};
//!
//! let catalog = ResourcePriceCatalog::platform_defaults();
//! let price = catalog.price_for("/api/agents/create", HttpMethod::Post);
//! assert_eq!(price.amount, Decimal::new(75, 3));
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

use crate::util::MoneyAmount;

/// HTTP methods the catalog distinguishes.
///
/// Parsing an inbound request's method never fails: methods without a
/// dedicated multiplier become [`HttpMethod::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Other,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 6] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Other,
    ];

    /// Price multiplier applied on top of a resource's base price.
    pub fn multiplier(&self) -> Decimal {
        match self {
            HttpMethod::Get => Decimal::ONE,
            HttpMethod::Post => Decimal::new(15, 1),
            HttpMethod::Put => Decimal::new(12, 1),
            HttpMethod::Delete => Decimal::new(13, 1),
            HttpMethod::Patch | HttpMethod::Other => Decimal::ONE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Other => "OTHER",
        }
    }

    /// Maps a request method name, case-insensitively.
    pub fn from_request_method(method: &str) -> Self {
        method.parse().unwrap_or(HttpMethod::Other)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown HTTP method: {0}")]
pub struct UnknownHttpMethod(String);

impl FromStr for HttpMethod {
    type Err = UnknownHttpMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            _ => Err(UnknownHttpMethod(s.to_string())),
        }
    }
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for HttpMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A configured price for one resource.
///
/// `http_method: None` applies to every method on the path. Multipliers are
/// never baked into `base_amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePrice {
    #[serde(rename = "path")]
    pub resource_path: String,
    #[serde(rename = "method", default, skip_serializing_if = "Option::is_none")]
    pub http_method: Option<HttpMethod>,
    #[serde(rename = "price")]
    pub base_amount: MoneyAmount,
    pub description: String,
}

impl ResourcePrice {
    pub fn new(path: &str, base_amount: MoneyAmount, description: &str) -> Self {
        Self {
            resource_path: path.to_string(),
            http_method: None,
            base_amount,
            description: description.to_string(),
        }
    }

    pub fn for_method(mut self, method: HttpMethod) -> Self {
        self.http_method = Some(method);
        self
    }
}

/// Price charged for paths that are not in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackPrice {
    pub amount: MoneyAmount,
    pub description: String,
}

impl FallbackPrice {
    pub const DEFAULT_AMOUNT: &'static str = "0.01";
    pub const DEFAULT_DESCRIPTION: &'static str = "API access";
}

impl Default for FallbackPrice {
    fn default() -> Self {
        Self {
            amount: MoneyAmount::parse(Self::DEFAULT_AMOUNT).expect("valid default price"),
            description: Self::DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

/// The outcome of a catalog lookup, multiplier included, not yet rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Price<'a> {
    pub amount: Decimal,
    pub description: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Resource path must start with '/': {0:?}")]
    InvalidPath(String),
    #[error("Duplicate price for {path} ({method})")]
    DuplicateEntry { path: String, method: String },
}

/// Immutable lookup table of resource prices.
#[derive(Debug, Clone)]
pub struct ResourcePriceCatalog {
    by_path: HashMap<String, Vec<ResourcePrice>>,
    fallback: FallbackPrice,
}

/// Built-in prices of the trading platform's paid endpoints.
const PLATFORM_PRICES: &[(&str, &str, &str)] = &[
    (
        "/api/ai/market-analysis",
        "0.02",
        "AI-powered market sentiment analysis",
    ),
    (
        "/api/ai/trading-signals",
        "0.03",
        "AI-generated trading signals",
    ),
    (
        "/api/ai/portfolio-optimization",
        "0.05",
        "AI portfolio optimization",
    ),
    (
        "/api/ai/risk-assessment",
        "0.02",
        "AI risk assessment for a position",
    ),
    ("/api/agents/create", "0.05", "Create a new AI trading agent"),
    (
        "/api/agents/execute-trade",
        "0.01",
        "Execute a trade through an AI agent",
    ),
    ("/api/market/data", "0.001", "Real-time market data snapshot"),
];

impl ResourcePriceCatalog {
    /// Builds a catalog, rejecting malformed paths and duplicate
    /// (path, method) entries.
    pub fn new(
        prices: impl IntoIterator<Item = ResourcePrice>,
        fallback: FallbackPrice,
    ) -> Result<Self, CatalogError> {
        let mut by_path: HashMap<String, Vec<ResourcePrice>> = HashMap::new();
        for price in prices {
            if !price.resource_path.starts_with('/') {
                return Err(CatalogError::InvalidPath(price.resource_path));
            }
            let same_path = by_path.entry(price.resource_path.clone()).or_default();
            if same_path.iter().any(|p| p.http_method == price.http_method) {
                return Err(CatalogError::DuplicateEntry {
                    method: price
                        .http_method
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "any method".to_string()),
                    path: price.resource_path,
                });
            }
            same_path.push(price);
        }
        Ok(Self { by_path, fallback })
    }

    /// Catalog of the trading platform's paid endpoints with the default
    /// fallback price.
    pub fn platform_defaults() -> Self {
        let prices = PLATFORM_PRICES.iter().map(|(path, amount, description)| {
            ResourcePrice::new(
                path,
                MoneyAmount::parse(amount).expect("valid built-in price"),
                description,
            )
        });
        Self::new(prices, FallbackPrice::default()).expect("built-in catalog has unique paths")
    }

    /// Price of `resource_path` when requested with `method`.
    ///
    /// A method-specific entry wins over a method-agnostic one. Unknown paths
    /// resolve to the fallback price. The method multiplier is applied last.
    pub fn price_for(&self, resource_path: &str, method: HttpMethod) -> Price<'_> {
        let entry = self.by_path.get(resource_path).and_then(|entries| {
            entries
                .iter()
                .find(|p| p.http_method == Some(method))
                .or_else(|| entries.iter().find(|p| p.http_method.is_none()))
        });
        let (base, description) = match entry {
            Some(price) => (price.base_amount, price.description.as_str()),
            None => (self.fallback.amount, self.fallback.description.as_str()),
        };
        Price {
            amount: base.as_decimal() * method.multiplier(),
            description,
        }
    }

    pub fn fallback(&self) -> &FallbackPrice {
        &self.fallback
    }

    /// Replaces the price charged for paths outside the catalog.
    pub fn with_fallback(mut self, fallback: FallbackPrice) -> Self {
        self.fallback = fallback;
        self
    }

    /// All configured entries, ordered by path.
    pub fn entries(&self) -> Vec<&ResourcePrice> {
        let mut entries: Vec<_> = self.by_path.values().flatten().collect();
        entries.sort_by(|a, b| {
            a.resource_path
                .cmp(&b.resource_path)
                .then_with(|| a.http_method.map(|m| m.as_str()).cmp(&b.http_method.map(|m| m.as_str())))
        });
        entries
    }
}

impl Default for ResourcePriceCatalog {
    fn default() -> Self {
        Self::platform_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> MoneyAmount {
        MoneyAmount::parse(s).unwrap()
    }

    #[test]
    fn known_path_uses_catalog_price() {
        let catalog = ResourcePriceCatalog::platform_defaults();
        let price = catalog.price_for("/api/ai/market-analysis", HttpMethod::Get);
        assert_eq!(price.amount, Decimal::new(2, 2));
        assert_eq!(price.description, "AI-powered market sentiment analysis");
    }

    #[test]
    fn method_multipliers_apply_after_lookup() {
        let catalog = ResourcePriceCatalog::platform_defaults();
        let path = "/api/agents/create";
        assert_eq!(catalog.price_for(path, HttpMethod::Get).amount, Decimal::new(5, 2));
        assert_eq!(catalog.price_for(path, HttpMethod::Post).amount, Decimal::new(75, 3));
        assert_eq!(catalog.price_for(path, HttpMethod::Put).amount, Decimal::new(6, 2));
        assert_eq!(catalog.price_for(path, HttpMethod::Delete).amount, Decimal::new(65, 3));
        assert_eq!(catalog.price_for(path, HttpMethod::Other).amount, Decimal::new(5, 2));
    }

    #[test]
    fn unknown_paths_fall_back_to_non_zero_default() {
        let catalog = ResourcePriceCatalog::platform_defaults();
        let methods = [
            HttpMethod::Get,
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Delete,
            HttpMethod::Patch,
            HttpMethod::Other,
        ];
        for path in ["/", "/api", "/api/ai/market-analysis/", "/API/AI/MARKET-ANALYSIS", "/x"] {
            for method in methods {
                let price = catalog.price_for(path, method);
                assert!(price.amount > Decimal::ZERO, "{path} {method}");
                assert_eq!(price.description, FallbackPrice::DEFAULT_DESCRIPTION);
                assert_eq!(price.amount, Decimal::new(1, 2) * method.multiplier());
            }
        }
    }

    #[test]
    fn method_specific_entry_wins() {
        let catalog = ResourcePriceCatalog::new(
            [
                ResourcePrice::new("/api/agents", money("0.01"), "List agents"),
                ResourcePrice::new("/api/agents", money("0.04"), "Register agent")
                    .for_method(HttpMethod::Post),
            ],
            FallbackPrice::default(),
        )
        .unwrap();
        let get = catalog.price_for("/api/agents", HttpMethod::Get);
        assert_eq!(get.description, "List agents");
        let post = catalog.price_for("/api/agents", HttpMethod::Post);
        assert_eq!(post.description, "Register agent");
        assert_eq!(post.amount, Decimal::new(6, 2));
    }

    #[test]
    fn duplicate_entries_are_rejected() {
        let result = ResourcePriceCatalog::new(
            [
                ResourcePrice::new("/a", money("0.01"), "a"),
                ResourcePrice::new("/a", money("0.02"), "a again"),
            ],
            FallbackPrice::default(),
        );
        assert!(matches!(result, Err(CatalogError::DuplicateEntry { .. })));
    }

    #[test]
    fn relative_paths_are_rejected() {
        let result = ResourcePriceCatalog::new(
            [ResourcePrice::new("api/a", money("0.01"), "a")],
            FallbackPrice::default(),
        );
        assert!(matches!(result, Err(CatalogError::InvalidPath(_))));
    }

    #[test]
    fn request_methods_parse_case_insensitively() {
        assert_eq!(HttpMethod::from_request_method("post"), HttpMethod::Post);
        assert_eq!(HttpMethod::from_request_method("OPTIONS"), HttpMethod::Other);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn resource_price_deserializes_from_config_shape() {
        let price: ResourcePrice = serde_json::from_str(
            r#"{"path": "/api/market/data", "method": "get", "price": "$0.001", "description": "Ticks"}"#,
        )
        .unwrap();
        assert_eq!(price.http_method, Some(HttpMethod::Get));
        assert_eq!(price.base_amount.as_decimal(), Decimal::new(1, 3));
    }
}
