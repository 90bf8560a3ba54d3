//! Assembles the paywall middleware from [`Config`].

use std::sync::Arc;
use std::time::Duration;
use x402_paywall_axum::facilitator_client::{FacilitatorClient, FacilitatorClientError};
use x402_paywall_axum::rate_limit::FixedWindowRateLimiter;
use x402_paywall_axum::{AllowList, PaywallMiddleware};

use crate::config::{Config, ConfigError};
use crate::revenue_log::JsonlRevenueLog;

pub type Paywall = PaywallMiddleware<Arc<FacilitatorClient>>;

#[derive(Debug, thiserror::Error)]
pub enum PaywallSetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Invalid facilitator URL: {0}")]
    Facilitator(#[from] FacilitatorClientError),
    #[error("Failed to open revenue log: {0}")]
    RevenueLog(#[from] std::io::Error),
}

/// Builds the middleware guarding the paid routes.
///
/// Every configuration problem surfaces here, before the listener is bound.
pub async fn from_config(config: &Config) -> Result<Paywall, PaywallSetupError> {
    let catalog = Arc::new(config.catalog()?);
    let facilitator = FacilitatorClient::try_from(config.facilitator_url().as_str())?
        .with_timeout(config.settlement_timeout());

    let mut paywall = PaywallMiddleware::new(
        Arc::new(facilitator),
        catalog,
        config.network(),
        config.pay_to(),
    )
    .map_err(ConfigError::from)?
    .with_timeouts(config.max_timeout_seconds(), config.settlement_timeout())
    .map_err(ConfigError::from)?
    .with_allow_list(AllowList::new(config.allow_list()))
    .with_enabled(config.enabled());

    if let Some(limit) = config.rate_limit()? {
        let limiter = FixedWindowRateLimiter::new(
            Duration::from_secs(limit.window_seconds),
            limit.max_requests,
        );
        paywall = paywall
            .with_rate_limiter(Arc::new(limiter))
            .with_client_key_source(config.client_key_source()?);
    }

    if let Some(path) = config.revenue_log() {
        let log = JsonlRevenueLog::open(path).await?;
        tracing::info!(path = %log.path().display(), "Recording revenue to file");
        paywall = paywall.with_recorder(Arc::new(log));
    }

    if !config.enabled() {
        tracing::warn!("Paywall is disabled; all routes are served for free");
    }

    Ok(paywall)
}

#[cfg(test)]
mod tests {
    use super::*;
    use x402_paywall_types::pricing::HttpMethod;
    use x402_paywall_types::requirement::ConfigurationError;

    fn config(extra: &str) -> Config {
        Config::from_json(&format!(
            r#"{{
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "facilitatorUrl": "https://facilitator.example.com/"
                {extra}
            }}"#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn builds_from_minimal_config() {
        let paywall = from_config(&config("")).await.unwrap();
        assert_eq!(paywall.requirements().network(), "base-sepolia");
        assert_eq!(paywall.requirements().max_timeout_seconds(), 300);
        assert_eq!(
            paywall.settlement().verify_url().as_str(),
            "https://facilitator.example.com/verify"
        );
        let requirement = paywall
            .requirements()
            .build("/api/ai/market-analysis", HttpMethod::Get, paywall.pay_to())
            .unwrap();
        assert_eq!(requirement.max_amount_required.as_u128(), 20_000);
    }

    #[tokio::test]
    async fn settlement_timeout_beyond_window_is_rejected() {
        let config = config(r#", "maxTimeoutSeconds": 30, "settlementTimeoutSeconds": 60"#);
        assert!(matches!(
            from_config(&config).await,
            Err(PaywallSetupError::Config(ConfigError::Paywall(_)))
        ));
    }

    #[tokio::test]
    async fn wide_window_accepts_long_settlement_timeout() {
        let config = config(r#", "maxTimeoutSeconds": 900, "settlementTimeoutSeconds": 600"#);
        let paywall = from_config(&config).await.unwrap();
        assert_eq!(paywall.requirements().max_timeout_seconds(), 900);
        assert_eq!(paywall.settlement().timeout(), Some(Duration::from_secs(600)));
    }

    #[tokio::test]
    async fn unknown_network_is_rejected() {
        let config = config(r#", "network": "base-goerli""#);
        assert!(matches!(
            from_config(&config).await,
            Err(PaywallSetupError::Config(ConfigError::Paywall(_)))
        ));
    }

    #[tokio::test]
    async fn price_below_one_atomic_unit_is_rejected() {
        let config = config(
            r#", "resources": [
                { "path": "/api/tick", "price": "0.0000001", "description": "Tick" }
            ]"#,
        );
        assert!(matches!(
            from_config(&config).await,
            Err(PaywallSetupError::Config(ConfigError::Paywall(
                ConfigurationError::UnpayablePrice { .. }
            )))
        ));
    }

    #[tokio::test]
    async fn zero_rate_limit_is_rejected() {
        let config = config(r#", "rateLimit": { "windowSeconds": 60, "maxRequests": 0 }"#);
        assert!(matches!(
            from_config(&config).await,
            Err(PaywallSetupError::Config(ConfigError::InvalidRateLimit))
        ));
    }
}
