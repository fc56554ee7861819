//! Settlement adapters, one per payment rail.
//!
//! Every rail implements [`ProtocolAdapter`]: a cheap applicability check,
//! a fee estimate, and the actual settlement. Adapters are deliberately
//! ignorant of guards and ledgers; routing picks one, the engine wraps it.

use async_trait::async_trait;

use crate::amount::MoneyAmount;
use crate::network::Network;
use crate::types::{PaymentRequest, PaymentResult, Route};
use crate::wallet::{Wallet, WalletError};

pub mod gateway;
pub mod transfer;
pub mod x402;

pub use gateway::GatewayAdapter;
pub use transfer::TransferAdapter;
pub use x402::{PAYMENT_RESPONSE_HEADER, PAYMENT_SIGNATURE_HEADER, X402Adapter};

/// Everything an adapter may look at while settling one payment.
#[derive(Debug, Clone, Copy)]
pub struct PaymentContext<'a> {
    pub request: &'a PaymentRequest,
    pub wallet: &'a Wallet,
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("wallet provider failure: {0}")]
    Wallet(#[from] WalletError),
    #[error("payment handshake failed: {0}")]
    Handshake(String),
    #[error("resource requires {required} but only {offered} was offered")]
    AmountExceedsOffer {
        required: MoneyAmount,
        offered: MoneyAmount,
    },
    #[error("no route can reach recipient {0}")]
    UnroutableRecipient(String),
    #[error("resource request failed: {0}")]
    Resource(#[from] reqwest::Error),
    #[error("invalid payment requirements: {0}")]
    Requirements(String),
}

/// A settlement rail.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn route(&self) -> Route;

    /// Whether this adapter can settle the request. Must be cheap and must
    /// not perform I/O; routing calls it on every candidate.
    fn can_handle(&self, ctx: &PaymentContext<'_>) -> bool;

    /// Flat fee estimate for simulation. Not charged anywhere.
    fn estimate_fee(&self, ctx: &PaymentContext<'_>) -> MoneyAmount;

    async fn execute(&self, ctx: &PaymentContext<'_>) -> Result<PaymentResult, AdapterError>;
}

/// Flat per-network fee estimates in USD terms. Testnets are free.
pub(crate) fn network_fee(network: Network) -> MoneyAmount {
    match network {
        Network::Eth => MoneyAmount::from_minor_units(150, 2),
        Network::Avalanche => MoneyAmount::from_minor_units(5, 2),
        Network::Base => MoneyAmount::from_minor_units(2, 2),
        Network::Polygon | Network::Arc => MoneyAmount::from_minor_units(1, 2),
        Network::Solana => MoneyAmount::from_minor_units(1, 3),
        Network::EthSepolia
        | Network::BaseSepolia
        | Network::AvalancheFuji
        | Network::PolygonAmoy
        | Network::ArcTestnet
        | Network::SolanaDevnet => MoneyAmount::ZERO,
    }
}
