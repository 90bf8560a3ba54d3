//! Known networks and the stablecoin deployment the gateway charges in.
//!
//! The x402 v1 wire format names networks by a short string (`"base"`,
//! `"base-sepolia"`). Each known network maps to exactly one USDC deployment:
//! its contract address, its decimals, and the EIP-712 domain a wallet signs
//! against. The domain name and version travel to clients as the
//! requirement's `extra` field.

use alloy_primitives::{Address, address};

/// EIP-712 domain of a token contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEip712 {
    pub name: &'static str,
    pub version: &'static str,
}

/// A stablecoin deployment on a known network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetDeployment {
    /// x402 v1 network name, e.g. `"base-sepolia"`.
    pub network: &'static str,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Token contract address.
    pub address: Address,
    /// Number of decimals of the token.
    pub decimals: u32,
    pub eip712: TokenEip712,
}

/// USDC deployments on the networks the gateway accepts payment on.
pub static USDC_DEPLOYMENTS: &[AssetDeployment] = &[
    AssetDeployment {
        network: "base",
        chain_id: 8453,
        address: address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
        decimals: 6,
        eip712: TokenEip712 {
            name: "USD Coin",
            version: "2",
        },
    },
    AssetDeployment {
        network: "base-sepolia",
        chain_id: 84532,
        address: address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
        decimals: 6,
        eip712: TokenEip712 {
            name: "USDC",
            version: "2",
        },
    },
    AssetDeployment {
        network: "polygon",
        chain_id: 137,
        address: address!("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
        decimals: 6,
        eip712: TokenEip712 {
            name: "USDC",
            version: "2",
        },
    },
    AssetDeployment {
        network: "polygon-amoy",
        chain_id: 80002,
        address: address!("0x41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582"),
        decimals: 6,
        eip712: TokenEip712 {
            name: "USDC",
            version: "2",
        },
    },
    AssetDeployment {
        network: "avalanche",
        chain_id: 43114,
        address: address!("0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"),
        decimals: 6,
        eip712: TokenEip712 {
            name: "USD Coin",
            version: "2",
        },
    },
    AssetDeployment {
        network: "avalanche-fuji",
        chain_id: 43113,
        address: address!("0x5425890298aed601595a70AB815c96711a31Bc65"),
        decimals: 6,
        eip712: TokenEip712 {
            name: "USD Coin",
            version: "2",
        },
    },
];

/// Looks up the USDC deployment for a network name. Case-sensitive.
///
/// ```
/// use x402_paywall_types::networks::usdc_by_network;
///
/// let usdc = usdc_by_network("base-sepolia").unwrap();
/// assert_eq!(usdc.chain_id, 84532);
/// assert!(usdc_by_network("ethereum-classic").is_none());
/// ```
pub fn usdc_by_network(network: &str) -> Option<&'static AssetDeployment> {
    USDC_DEPLOYMENTS.iter().find(|d| d.network == network)
}

/// Names of every network with a known deployment.
pub fn known_network_names() -> impl Iterator<Item = &'static str> {
    USDC_DEPLOYMENTS.iter().map(|d| d.network)
}
