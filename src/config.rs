//! Configuration of the paywall gateway server.
//!
//! Loaded once at startup from a JSON file. Every problem found here aborts
//! startup before the listener is bound.
//!
//! ```json
//! {
//!   "network": "base-sepolia",
//!   "payTo": "$PAYWALL_PAY_TO",
//!   "facilitatorUrl": "https://facilitator.x402.rs",
//!   "resources": [
//!     { "path": "/api/ai/market-analysis", "price": "$0.02", "description": "AI-powered market sentiment analysis" }
//!   ],
//!   "rateLimit": { "windowSeconds": 60, "maxRequests": 30 },
//!   "clientKey": { "trustedProxies": 1 }
//! }
//! ```

use alloy_primitives::Address;
use axum::http::HeaderName;
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use x402_paywall_types::config::LiteralOrEnv;
use x402_paywall_types::pricing::{CatalogError, FallbackPrice, ResourcePrice, ResourcePriceCatalog};
use x402_paywall_axum::rate_limit::ClientKeySource;
use x402_paywall_types::requirement::ConfigurationError;

/// CLI arguments for the paywall gateway.
#[derive(Parser, Debug)]
#[command(name = "x402-paywall")]
#[command(about = "Pay-per-request API gateway for x402 micropayments")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
///
/// `host` and `port` fall back to the `HOST` and `PORT` environment
/// variables, then to hardcoded defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default = "config_defaults::default_enabled")]
    enabled: bool,
    #[serde(default = "config_defaults::default_network")]
    network: String,
    pay_to: LiteralOrEnv<Address>,
    facilitator_url: LiteralOrEnv<Url>,
    #[serde(default = "config_defaults::default_max_timeout_seconds")]
    max_timeout_seconds: u64,
    #[serde(default = "config_defaults::default_settlement_timeout_seconds")]
    settlement_timeout_seconds: u64,
    #[serde(default = "config_defaults::default_allow_list")]
    allow_list: Vec<String>,
    #[serde(default)]
    default_price: FallbackPrice,
    #[serde(default)]
    resources: Vec<ResourcePrice>,
    #[serde(default)]
    rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    client_key: ClientKeyConfig,
    #[serde(default)]
    revenue_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub window_seconds: u64,
    pub max_requests: u32,
}

/// How rate-limited callers are identified.
///
/// `"forwardedHeaders"` (the default) takes the first `X-Forwarded-For` hop
/// and is only sound behind a proxy that overwrites that header.
/// `{ "trustedProxies": n }` counts `n` appending proxies from the right.
/// `{ "header": "cf-connecting-ip" }` reads one header set by the edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientKeyConfig {
    #[default]
    ForwardedHeaders,
    TrustedProxies(usize),
    Header(String),
}

pub mod config_defaults {
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    pub const DEFAULT_NETWORK: &str = "base-sepolia";
    pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;
    pub const DEFAULT_SETTLEMENT_TIMEOUT_SECONDS: u64 = 60;

    /// Returns the default port value with fallback: $PORT env var -> 8080
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HOST)
    }

    pub fn default_enabled() -> bool {
        true
    }

    pub fn default_network() -> String {
        DEFAULT_NETWORK.to_string()
    }

    pub fn default_max_timeout_seconds() -> u64 {
        DEFAULT_MAX_TIMEOUT_SECONDS
    }

    pub fn default_settlement_timeout_seconds() -> u64 {
        DEFAULT_SETTLEMENT_TIMEOUT_SECONDS
    }

    pub fn default_allow_list() -> Vec<String> {
        x402_paywall_axum::AllowList::DEFAULT_ENTRIES
            .iter()
            .map(|entry| entry.to_string())
            .collect()
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Invalid price catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Invalid paywall configuration: {0}")]
    Paywall(#[from] ConfigurationError),
    #[error("Rate limit needs a positive window and request budget")]
    InvalidRateLimit,
    #[error("Invalid client key source: {0}")]
    InvalidClientKey(String),
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn pay_to(&self) -> Address {
        *self.pay_to.inner()
    }

    pub fn facilitator_url(&self) -> &Url {
        self.facilitator_url.inner()
    }

    pub fn max_timeout_seconds(&self) -> u64 {
        self.max_timeout_seconds
    }

    pub fn settlement_timeout(&self) -> Duration {
        Duration::from_secs(self.settlement_timeout_seconds)
    }

    pub fn allow_list(&self) -> &[String] {
        &self.allow_list
    }

    pub fn revenue_log(&self) -> Option<&Path> {
        self.revenue_log.as_deref()
    }

    /// The configured rate limit, rejecting zero windows and budgets.
    pub fn rate_limit(&self) -> Result<Option<RateLimitConfig>, ConfigError> {
        match self.rate_limit {
            Some(limit) if limit.window_seconds == 0 || limit.max_requests == 0 => {
                Err(ConfigError::InvalidRateLimit)
            }
            other => Ok(other),
        }
    }

    /// How the rate limiter tells callers apart.
    pub fn client_key_source(&self) -> Result<ClientKeySource, ConfigError> {
        match &self.client_key {
            ClientKeyConfig::ForwardedHeaders => Ok(ClientKeySource::ForwardedHeaders),
            ClientKeyConfig::TrustedProxies(0) => Err(ConfigError::InvalidClientKey(
                "trustedProxies must be at least 1".to_string(),
            )),
            ClientKeyConfig::TrustedProxies(count) => Ok(ClientKeySource::TrustedProxies(*count)),
            ClientKeyConfig::Header(name) => HeaderName::try_from(name.as_str())
                .map(ClientKeySource::Header)
                .map_err(|_| ConfigError::InvalidClientKey(format!("{name:?} is not a header name"))),
        }
    }

    /// The price catalog: configured resources, or the built-in trading
    /// platform prices when none are configured.
    pub fn catalog(&self) -> Result<ResourcePriceCatalog, ConfigError> {
        let catalog = if self.resources.is_empty() {
            ResourcePriceCatalog::platform_defaults().with_fallback(self.default_price.clone())
        } else {
            ResourcePriceCatalog::new(self.resources.iter().cloned(), self.default_price.clone())?
        };
        Ok(catalog)
    }

    /// Load configuration from CLI arguments and JSON file.
    ///
    /// The config file path is determined by:
    /// 1. `--config <path>` CLI argument
    /// 2. `CONFIG` environment variable
    /// 3. `./config.json`
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use x402_paywall_types::pricing::HttpMethod;

    const MINIMAL: &str = r#"{
        "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
        "facilitatorUrl": "https://facilitator.example.com"
    }"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_json(MINIMAL).unwrap();
        assert!(config.enabled());
        assert_eq!(config.network(), "base-sepolia");
        assert_eq!(
            config.pay_to(),
            address!("0x209693Bc6afc0C5328bA36FaF03C514EF312287C")
        );
        assert_eq!(config.max_timeout_seconds(), 300);
        assert_eq!(config.settlement_timeout(), Duration::from_secs(60));
        assert!(config.allow_list().iter().any(|p| p == "/api/auth/*"));
        assert!(config.rate_limit().unwrap().is_none());
        assert_eq!(
            config.client_key_source().unwrap(),
            ClientKeySource::ForwardedHeaders
        );
        assert!(config.revenue_log().is_none());

        let catalog = config.catalog().unwrap();
        let price = catalog.price_for("/api/ai/trading-signals", HttpMethod::Get);
        assert_eq!(price.description, "AI-generated trading signals");
    }

    #[test]
    fn configured_resources_replace_builtin_catalog() {
        let config = Config::from_json(
            r#"{
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "facilitatorUrl": "https://facilitator.example.com",
                "defaultPrice": { "amount": "0.002", "description": "Metered access" },
                "resources": [
                    { "path": "/api/reports", "price": "$0.25", "description": "Quarterly report" },
                    { "path": "/api/reports", "method": "DELETE", "price": "1", "description": "Report removal" }
                ]
            }"#,
        )
        .unwrap();
        let catalog = config.catalog().unwrap();
        assert_eq!(
            catalog.price_for("/api/reports", HttpMethod::Get).description,
            "Quarterly report"
        );
        assert_eq!(
            catalog.price_for("/api/reports", HttpMethod::Delete).description,
            "Report removal"
        );
        assert_eq!(
            catalog.price_for("/api/ai/market-analysis", HttpMethod::Get).description,
            "Metered access"
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_price = r#"{
            "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
            "facilitatorUrl": "https://facilitator.example.com",
            "resources": [{ "path": "/api/x", "price": "0", "description": "free?" }]
        }"#;
        assert!(matches!(
            Config::from_json(zero_price),
            Err(ConfigError::JsonParse(_))
        ));

        let missing_pay_to = r#"{ "facilitatorUrl": "https://facilitator.example.com" }"#;
        assert!(Config::from_json(missing_pay_to).is_err());

        let bad_limit = r#"{
            "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
            "facilitatorUrl": "https://facilitator.example.com",
            "rateLimit": { "windowSeconds": 0, "maxRequests": 10 }
        }"#;
        let config = Config::from_json(bad_limit).unwrap();
        assert!(matches!(config.rate_limit(), Err(ConfigError::InvalidRateLimit)));
    }

    fn with_client_key(client_key: &str) -> Config {
        Config::from_json(&format!(
            r#"{{
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "facilitatorUrl": "https://facilitator.example.com",
                "clientKey": {client_key}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn client_key_source_is_configurable() {
        assert_eq!(
            with_client_key(r#"{ "trustedProxies": 2 }"#)
                .client_key_source()
                .unwrap(),
            ClientKeySource::TrustedProxies(2)
        );
        assert_eq!(
            with_client_key(r#"{ "header": "CF-Connecting-IP" }"#)
                .client_key_source()
                .unwrap(),
            ClientKeySource::Header(HeaderName::from_static("cf-connecting-ip"))
        );
        assert!(matches!(
            with_client_key(r#"{ "trustedProxies": 0 }"#).client_key_source(),
            Err(ConfigError::InvalidClientKey(_))
        ));
        assert!(matches!(
            with_client_key(r#"{ "header": "bad header" }"#).client_key_source(),
            Err(ConfigError::InvalidClientKey(_))
        ));
    }

    #[test]
    fn duplicate_resources_are_a_catalog_error() {
        let config = Config::from_json(
            r#"{
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "facilitatorUrl": "https://facilitator.example.com",
                "resources": [
                    { "path": "/api/x", "price": "0.1", "description": "a" },
                    { "path": "/api/x", "price": "0.2", "description": "b" }
                ]
            }"#,
        )
        .unwrap();
        assert!(matches!(config.catalog(), Err(ConfigError::Catalog(_))));
    }
}
