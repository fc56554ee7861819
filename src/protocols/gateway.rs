//! Cross-chain settlement through the wallet service's bridging rail.
//!
//! Used when the recipient is a plain address on a different network than
//! the paying wallet. Bridged transfers confirm asynchronously, so results
//! usually report `submitted` with the hash trailing behind.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use crate::amount::MoneyAmount;
use crate::types::{CrosschainDestination, PaymentResult, PaymentStatus, Route};
use crate::wallet::WalletProvider;

use super::{AdapterError, PaymentContext, ProtocolAdapter, network_fee};

const DEFAULT_TOKEN: &str = "USDC";

pub struct GatewayAdapter<W> {
    provider: Arc<W>,
}

impl<W> GatewayAdapter<W> {
    pub fn new(provider: Arc<W>) -> Self {
        GatewayAdapter { provider }
    }
}

#[async_trait]
impl<W: WalletProvider> ProtocolAdapter for GatewayAdapter<W> {
    fn route(&self) -> Route {
        Route::Gateway
    }

    fn can_handle(&self, ctx: &PaymentContext<'_>) -> bool {
        ctx.request.recipient_url().is_none() && ctx.wallet.blockchain != ctx.request.network
    }

    /// Bridging pays gas on both ends.
    fn estimate_fee(&self, ctx: &PaymentContext<'_>) -> MoneyAmount {
        network_fee(ctx.wallet.blockchain).saturating_add(network_fee(ctx.request.network))
    }

    #[instrument(skip_all, fields(
        wallet_id = %ctx.wallet.id,
        source = %ctx.wallet.blockchain,
        destination = %ctx.request.network,
    ))]
    async fn execute(&self, ctx: &PaymentContext<'_>) -> Result<PaymentResult, AdapterError> {
        let token = ctx
            .request
            .metadata
            .get("token")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_TOKEN);
        let destination = CrosschainDestination {
            network: ctx.request.network,
            address: ctx.request.recipient.clone(),
            token: token.to_string(),
        };
        let receipt = self
            .provider
            .transfer_crosschain(&ctx.wallet.id, &destination, ctx.request.amount)
            .await?;
        let status = receipt.state.payment_status();
        if status == PaymentStatus::Failed {
            return Ok(PaymentResult::failed(
                ctx.request.amount,
                &ctx.request.recipient,
                Some(Route::Gateway),
                format!("bridged transfer ended in state {:?}", receipt.state),
            )
            .with_metadata("transaction_id", Value::String(receipt.transaction_id)));
        }
        Ok(PaymentResult::succeeded(
            ctx.request.amount,
            &ctx.request.recipient,
            Route::Gateway,
            status,
            receipt.transaction_id,
            receipt.tx_hash,
        ))
    }
}
