//! Payment rail networks.
//!
//! [`Network`] enumerates the blockchains a wallet can live on and a payment
//! can target. Kebab-case names are the wire format on both the control
//! channel and the wallet service.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Supported blockchains, mainnet and testnet.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Arc mainnet.
    #[serde(rename = "arc")]
    Arc,
    /// Arc testnet.
    #[serde(rename = "arc-testnet")]
    ArcTestnet,
    /// Base mainnet (chain ID 8453).
    #[serde(rename = "base")]
    Base,
    /// Base Sepolia testnet (chain ID 84532).
    #[serde(rename = "base-sepolia")]
    BaseSepolia,
    /// Ethereum mainnet (chain ID 1).
    #[serde(rename = "eth")]
    Eth,
    /// Ethereum Sepolia testnet (chain ID 11155111).
    #[serde(rename = "eth-sepolia")]
    EthSepolia,
    /// Avalanche C-Chain mainnet (chain ID 43114).
    #[serde(rename = "avalanche")]
    Avalanche,
    /// Avalanche Fuji testnet (chain ID 43113).
    #[serde(rename = "avalanche-fuji")]
    AvalancheFuji,
    /// Polygon mainnet (chain ID 137).
    #[serde(rename = "polygon")]
    Polygon,
    /// Polygon Amoy testnet (chain ID 80002).
    #[serde(rename = "polygon-amoy")]
    PolygonAmoy,
    /// Solana mainnet.
    #[serde(rename = "solana")]
    Solana,
    /// Solana devnet.
    #[serde(rename = "solana-devnet")]
    SolanaDevnet,
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Arc => write!(f, "arc"),
            Network::ArcTestnet => write!(f, "arc-testnet"),
            Network::Base => write!(f, "base"),
            Network::BaseSepolia => write!(f, "base-sepolia"),
            Network::Eth => write!(f, "eth"),
            Network::EthSepolia => write!(f, "eth-sepolia"),
            Network::Avalanche => write!(f, "avalanche"),
            Network::AvalancheFuji => write!(f, "avalanche-fuji"),
            Network::Polygon => write!(f, "polygon"),
            Network::PolygonAmoy => write!(f, "polygon-amoy"),
            Network::Solana => write!(f, "solana"),
            Network::SolanaDevnet => write!(f, "solana-devnet"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown network: {0}")]
pub struct UnknownNetwork(String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Network::variants()
            .iter()
            .find(|network| network.to_string() == s)
            .copied()
            .ok_or_else(|| UnknownNetwork(s.to_string()))
    }
}

impl Network {
    /// Return all known [`Network`] variants.
    pub fn variants() -> &'static [Network] {
        &[
            Network::Arc,
            Network::ArcTestnet,
            Network::Base,
            Network::BaseSepolia,
            Network::Eth,
            Network::EthSepolia,
            Network::Avalanche,
            Network::AvalancheFuji,
            Network::Polygon,
            Network::PolygonAmoy,
            Network::Solana,
            Network::SolanaDevnet,
        ]
    }

    pub fn is_testnet(&self) -> bool {
        matches!(
            self,
            Network::ArcTestnet
                | Network::BaseSepolia
                | Network::EthSepolia
                | Network::AvalancheFuji
                | Network::PolygonAmoy
                | Network::SolanaDevnet
        )
    }

    /// Token that pays for gas on this chain.
    pub fn gas_token(&self) -> &'static str {
        match self {
            Network::Arc | Network::ArcTestnet => "USDC",
            Network::Base | Network::BaseSepolia => "ETH",
            Network::Eth | Network::EthSepolia => "ETH",
            Network::Avalanche | Network::AvalancheFuji => "AVAX",
            Network::Polygon | Network::PolygonAmoy => "POL",
            Network::Solana | Network::SolanaDevnet => "SOL",
        }
    }
}
