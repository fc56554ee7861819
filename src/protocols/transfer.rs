//! Same-chain stablecoin transfer, the default rail.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use crate::amount::MoneyAmount;
use crate::types::{PaymentResult, PaymentStatus, Route};
use crate::wallet::WalletProvider;

use super::{AdapterError, PaymentContext, ProtocolAdapter, network_fee};

/// Moves funds to an on-chain address on the wallet's own network.
pub struct TransferAdapter<W> {
    provider: Arc<W>,
}

impl<W> TransferAdapter<W> {
    pub fn new(provider: Arc<W>) -> Self {
        TransferAdapter { provider }
    }
}

#[async_trait]
impl<W: WalletProvider> ProtocolAdapter for TransferAdapter<W> {
    fn route(&self) -> Route {
        Route::Transfer
    }

    fn can_handle(&self, ctx: &PaymentContext<'_>) -> bool {
        ctx.request.recipient_url().is_none() && ctx.wallet.blockchain == ctx.request.network
    }

    fn estimate_fee(&self, ctx: &PaymentContext<'_>) -> MoneyAmount {
        network_fee(ctx.request.network)
    }

    #[instrument(skip_all, fields(wallet_id = %ctx.wallet.id, network = %ctx.request.network))]
    async fn execute(&self, ctx: &PaymentContext<'_>) -> Result<PaymentResult, AdapterError> {
        let receipt = self
            .provider
            .transfer(&ctx.wallet.id, &ctx.request.recipient, ctx.request.amount)
            .await?;
        let status = receipt.state.payment_status();
        if status == PaymentStatus::Failed {
            return Ok(PaymentResult::failed(
                ctx.request.amount,
                &ctx.request.recipient,
                Some(Route::Transfer),
                format!("transfer ended in state {:?}", receipt.state),
            )
            .with_metadata("transaction_id", Value::String(receipt.transaction_id)));
        }
        Ok(PaymentResult::succeeded(
            ctx.request.amount,
            &ctx.request.recipient,
            Route::Transfer,
            status,
            receipt.transaction_id,
            receipt.tx_hash,
        ))
    }
}
