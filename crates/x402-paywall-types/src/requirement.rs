//! Construction of payment requirements.
//!
//! A [`PaymentRequirementBuilder`] turns a catalog price into the exact
//! requirement a wallet must satisfy: the amount in atomic units of the
//! network's stablecoin, the asset contract, the recipient and the window the
//! signed authorization stays valid for.
//!
//! Conversion to atomic units truncates. A price of `0.0000015` on a
//! 6-decimal token becomes `1`, never `2`: the gateway may undercharge by a
//! fraction of an atomic unit but never overcharges. A price that truncates
//! to zero is refused when the builder is created, since a zero-value
//! authorization would admit requests for free.

use alloy_primitives::Address;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use url::Url;

use crate::networks::{AssetDeployment, known_network_names, usdc_by_network};
use crate::pricing::{HttpMethod, ResourcePriceCatalog};
use crate::proto::{AtomicAmount, PaymentRequirement, RequirementExtra, Scheme};

/// Misconfiguration detected while preparing to issue requirements.
///
/// Raised at startup; a gateway that cannot build requirements must not
/// serve traffic.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Unrecognized network {network:?}; known networks: {known}")]
    UnknownNetwork { network: String, known: String },
    #[error("Payment recipient must not be the zero address")]
    ZeroRecipient,
    #[error("Validity window must be at least one second")]
    ZeroValidityWindow,
    #[error("Settlement timeout of {timeout_ms}ms must be positive and within the {window_secs}s validity window")]
    SettlementTimeoutOutOfRange { timeout_ms: u128, window_secs: u64 },
    #[error("Price of {path} ({method}) is below one atomic unit of a {decimals}-decimal asset")]
    UnpayablePrice {
        path: String,
        method: String,
        decimals: u32,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RequirementError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("Price {amount} does not fit in atomic units of a {decimals}-decimal asset")]
    AmountOverflow { amount: Decimal, decimals: u32 },
    #[error("Price of {resource} converts to zero atomic units")]
    ZeroAmount { resource: String },
}

/// Builds a fresh [`PaymentRequirement`] for every request.
///
/// Nothing is cached between calls: each requirement reflects the catalog at
/// the moment it is built.
#[derive(Debug, Clone)]
pub struct PaymentRequirementBuilder {
    catalog: Arc<ResourcePriceCatalog>,
    network: String,
    max_timeout_seconds: u64,
    mime_type: String,
    resource_base: Option<Url>,
}

impl PaymentRequirementBuilder {
    pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;
    pub const DEFAULT_MIME_TYPE: &'static str = "application/json";

    /// Creates a builder for `network`, failing if the network has no known
    /// asset deployment or if any price, under any method it can be charged
    /// for, is worth less than one atomic unit of that asset.
    pub fn new(
        catalog: Arc<ResourcePriceCatalog>,
        network: &str,
    ) -> Result<Self, ConfigurationError> {
        let asset = resolve_asset(network)?;
        ensure_payable(&catalog, asset.decimals)?;
        Ok(Self {
            catalog,
            network: network.to_string(),
            max_timeout_seconds: Self::DEFAULT_MAX_TIMEOUT_SECONDS,
            mime_type: Self::DEFAULT_MIME_TYPE.to_string(),
            resource_base: None,
        })
    }

    /// Sets how long a signed authorization stays acceptable, in seconds.
    pub fn with_max_timeout_seconds(mut self, seconds: u64) -> Result<Self, ConfigurationError> {
        if seconds == 0 {
            return Err(ConfigurationError::ZeroValidityWindow);
        }
        self.max_timeout_seconds = seconds;
        Ok(self)
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Reports resources as absolute URLs under `base` instead of bare paths.
    pub fn with_resource_base(mut self, base: Url) -> Self {
        self.resource_base = Some(base);
        self
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn max_timeout_seconds(&self) -> u64 {
        self.max_timeout_seconds
    }

    pub fn catalog(&self) -> &ResourcePriceCatalog {
        &self.catalog
    }

    /// The asset deployment requirements are denominated in.
    pub fn asset(&self) -> Result<&'static AssetDeployment, ConfigurationError> {
        resolve_asset(&self.network)
    }

    /// Builds the requirement for `resource_path` requested with `method`,
    /// payable to `pay_to`.
    pub fn build(
        &self,
        resource_path: &str,
        method: HttpMethod,
        pay_to: Address,
    ) -> Result<PaymentRequirement, RequirementError> {
        if pay_to.is_zero() {
            return Err(ConfigurationError::ZeroRecipient.into());
        }
        let asset = self.asset()?;
        let price = self.catalog.price_for(resource_path, method);
        let max_amount_required = to_atomic_units(price.amount, asset.decimals)?;
        if max_amount_required.as_u128() == 0 {
            return Err(RequirementError::ZeroAmount {
                resource: resource_path.to_string(),
            });
        }
        Ok(PaymentRequirement {
            scheme: Scheme::Exact,
            network: self.network.clone(),
            max_amount_required,
            resource: self.resource_for(resource_path),
            description: price.description.to_string(),
            mime_type: self.mime_type.clone(),
            pay_to,
            max_timeout_seconds: self.max_timeout_seconds,
            asset: asset.address,
            extra: RequirementExtra {
                name: asset.eip712.name.to_string(),
                version: asset.eip712.version.to_string(),
            },
        })
    }

    fn resource_for(&self, resource_path: &str) -> String {
        match &self.resource_base {
            Some(base) => {
                let mut url = base.clone();
                url.set_path(resource_path);
                url.to_string()
            }
            None => resource_path.to_string(),
        }
    }
}

fn resolve_asset(network: &str) -> Result<&'static AssetDeployment, ConfigurationError> {
    usdc_by_network(network).ok_or_else(|| ConfigurationError::UnknownNetwork {
        network: network.to_string(),
        known: known_network_names().collect::<Vec<_>>().join(", "),
    })
}

/// Checks every catalog entry, and the fallback, under each method it
/// applies to.
fn ensure_payable(catalog: &ResourcePriceCatalog, decimals: u32) -> Result<(), ConfigurationError> {
    let entries = catalog.entries();
    let fallback = catalog.fallback().amount.as_decimal();
    let priced = entries
        .iter()
        .flat_map(|entry| {
            let methods = match entry.http_method {
                Some(method) => vec![method],
                None => HttpMethod::ALL.to_vec(),
            };
            methods
                .into_iter()
                .map(move |method| (entry.resource_path.as_str(), entry.base_amount.as_decimal(), method))
        })
        .chain(HttpMethod::ALL.into_iter().map(|method| ("*", fallback, method)));
    for (path, base, method) in priced {
        let payable = base
            .checked_mul(method.multiplier())
            .and_then(|amount| to_atomic_units(amount, decimals).ok())
            .is_some_and(|atomic| atomic.as_u128() > 0);
        if !payable {
            return Err(ConfigurationError::UnpayablePrice {
                path: path.to_string(),
                method: method.to_string(),
                decimals,
            });
        }
    }
    Ok(())
}

/// Converts a decimal token amount to atomic units, truncating toward zero.
pub fn to_atomic_units(amount: Decimal, decimals: u32) -> Result<AtomicAmount, RequirementError> {
    let overflow = || RequirementError::AmountOverflow { amount, decimals };
    let scale = 10u64
        .checked_pow(decimals)
        .map(Decimal::from)
        .ok_or_else(overflow)?;
    let atomic = amount.checked_mul(scale).ok_or_else(overflow)?.trunc();
    atomic.to_u128().map(AtomicAmount).ok_or_else(overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::{FallbackPrice, ResourcePrice};
    use crate::util::MoneyAmount;
    use alloy_primitives::address;

    const PAY_TO: Address = address!("0x209693Bc6afc0C5328bA36FaF03C514EF312287C");

    fn builder() -> PaymentRequirementBuilder {
        PaymentRequirementBuilder::new(
            Arc::new(ResourcePriceCatalog::platform_defaults()),
            "base-sepolia",
        )
        .unwrap()
    }

    #[test]
    fn market_analysis_get_costs_twenty_thousand_units() {
        let requirement = builder()
            .build("/api/ai/market-analysis", HttpMethod::Get, PAY_TO)
            .unwrap();
        assert_eq!(requirement.max_amount_required.to_string(), "20000");
        assert_eq!(requirement.description, "AI-powered market sentiment analysis");
        assert_eq!(requirement.scheme, Scheme::Exact);
        assert_eq!(requirement.max_timeout_seconds, 300);
        assert_eq!(
            requirement.asset,
            address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e")
        );
        assert_eq!(requirement.extra.name, "USDC");
        assert_eq!(requirement.pay_to, PAY_TO);
    }

    #[test]
    fn agent_creation_post_applies_multiplier() {
        let requirement = builder()
            .build("/api/agents/create", HttpMethod::Post, PAY_TO)
            .unwrap();
        assert_eq!(requirement.max_amount_required.to_string(), "75000");
    }

    #[test]
    fn unknown_path_uses_fallback_amount() {
        let requirement = builder()
            .build("/api/unpriced", HttpMethod::Delete, PAY_TO)
            .unwrap();
        // 0.01 * 1.3 * 10^6
        assert_eq!(requirement.max_amount_required, AtomicAmount(13_000));
        assert_eq!(requirement.description, "API access");
    }

    #[test]
    fn conversion_truncates_toward_zero() {
        let amount = Decimal::new(15, 7); // 0.0000015
        assert_eq!(to_atomic_units(amount, 6).unwrap(), AtomicAmount(1));
        let amount = Decimal::new(19_999_999, 9); // 0.019999999
        assert_eq!(to_atomic_units(amount, 6).unwrap(), AtomicAmount(19_999));
    }

    #[test]
    fn sub_unit_prices_are_truncated_not_rounded_up() {
        let catalog = ResourcePriceCatalog::new(
            [ResourcePrice::new(
                "/api/tick",
                MoneyAmount::parse("0.0000007").unwrap(),
                "Single tick",
            )
            .for_method(HttpMethod::Post)],
            FallbackPrice::default(),
        )
        .unwrap();
        let builder = PaymentRequirementBuilder::new(Arc::new(catalog), "base").unwrap();
        let requirement = builder.build("/api/tick", HttpMethod::Post, PAY_TO).unwrap();
        // 0.0000007 * 1.5 = 0.00000105 -> 1.05 units -> 1
        assert_eq!(requirement.max_amount_required, AtomicAmount(1));
    }

    fn tick_catalog(price: &str, method: Option<HttpMethod>) -> Arc<ResourcePriceCatalog> {
        let mut entry = ResourcePrice::new("/api/tick", MoneyAmount::parse(price).unwrap(), "Tick");
        if let Some(method) = method {
            entry = entry.for_method(method);
        }
        Arc::new(ResourcePriceCatalog::new([entry], FallbackPrice::default()).unwrap())
    }

    #[test]
    fn price_below_one_unit_is_rejected_at_startup() {
        let err = PaymentRequirementBuilder::new(tick_catalog("0.0000001", None), "base")
            .unwrap_err();
        match err {
            ConfigurationError::UnpayablePrice {
                path,
                method,
                decimals,
            } => {
                assert_eq!(path, "/api/tick");
                assert_eq!(method, "GET");
                assert_eq!(decimals, 6);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unpinned_price_must_cover_the_cheapest_method() {
        // 0.0000007 * 1.5 is payable under POST, but GET charges 0.0000007.
        assert!(matches!(
            PaymentRequirementBuilder::new(tick_catalog("0.0000007", None), "base"),
            Err(ConfigurationError::UnpayablePrice { .. })
        ));
        assert!(
            PaymentRequirementBuilder::new(tick_catalog("0.0000007", Some(HttpMethod::Post)), "base")
                .is_ok()
        );
        assert!(
            PaymentRequirementBuilder::new(tick_catalog("0.000001", None), "base").is_ok()
        );
    }

    #[test]
    fn unpayable_fallback_is_rejected() {
        let fallback = FallbackPrice {
            amount: MoneyAmount::parse("0.0000009").unwrap(),
            description: "Anything".to_string(),
        };
        let catalog = ResourcePriceCatalog::platform_defaults().with_fallback(fallback);
        let err = PaymentRequirementBuilder::new(Arc::new(catalog), "base-sepolia").unwrap_err();
        assert!(matches!(err, ConfigurationError::UnpayablePrice { ref path, .. } if path == "*"));
    }

    #[test]
    fn unknown_network_is_a_configuration_error() {
        let err = PaymentRequirementBuilder::new(
            Arc::new(ResourcePriceCatalog::platform_defaults()),
            "dogechain",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownNetwork { .. }));
        assert!(err.to_string().contains("base-sepolia"));
    }

    #[test]
    fn zero_recipient_is_rejected() {
        let err = builder()
            .build("/api/ai/market-analysis", HttpMethod::Get, Address::ZERO)
            .unwrap_err();
        assert!(matches!(
            err,
            RequirementError::Configuration(ConfigurationError::ZeroRecipient)
        ));
    }

    #[test]
    fn resource_base_produces_absolute_url() {
        let requirement = builder()
            .with_resource_base(Url::parse("https://api.example.com/").unwrap())
            .build("/api/market/data", HttpMethod::Get, PAY_TO)
            .unwrap();
        assert_eq!(requirement.resource, "https://api.example.com/api/market/data");
    }

    #[test]
    fn zero_validity_window_is_rejected() {
        assert!(matches!(
            builder().with_max_timeout_seconds(0),
            Err(ConfigurationError::ZeroValidityWindow)
        ));
    }
}
