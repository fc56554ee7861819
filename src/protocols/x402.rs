//! HTTP 402 payment handshake, x402 wire version 2.
//!
//! The recipient is a URL. We probe it, read the `requirements` body off
//! the 402 response, settle the demanded amount on-chain through the wallet
//! service, then retry the request carrying a base64 proof-of-payment
//! header. Settlement strictly precedes the retry: the resource never sees
//! a proof for money that has not moved. Failures after settlement are
//! reported as unsuccessful results that still carry the transaction
//! identifiers, since the funds are already gone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{instrument, warn};

use crate::amount::MoneyAmount;
use crate::types::{CrosschainDestination, PaymentResult, PaymentStatus, Route};
use crate::wallet::WalletProvider;

use super::{AdapterError, PaymentContext, ProtocolAdapter, network_fee};

/// Header carrying the base64-encoded [`SignedPayment`] on the retry.
pub const PAYMENT_SIGNATURE_HEADER: &str = "PAYMENT-SIGNATURE";
/// Header the resource sets to `authenticated` once it accepts the proof.
pub const PAYMENT_RESPONSE_HEADER: &str = "PAYMENT-RESPONSE";

/// Resources quote amounts in USDC base units.
pub const USDC_DECIMALS: u32 = 6;

const HASH_POLL_ATTEMPTS: u32 = 10;
const HASH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Body of the initial 402 response.
#[derive(Debug, Clone, Deserialize)]
struct PaymentRequiredResponse {
    requirements: PaymentRequirements,
}

/// What the resource demands. Field names follow the x402 wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: crate::network::Network,
    /// Required amount in base units of `token`, as a decimal string.
    pub amount: String,
    pub token: String,
    pub payment_address: String,
    pub resource: String,
    #[serde(default)]
    pub description: String,
}

/// Protocol version marker, always the literal `2` on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct X402Version2;

impl Serialize for X402Version2 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(2)
    }
}

impl<'de> Deserialize<'de> for X402Version2 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let version = u8::deserialize(deserializer)?;
        if version == 2 {
            Ok(X402Version2)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported x402 version: {version}"
            )))
        }
    }
}

/// Proof that settlement happened, sent back to the resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub transaction_hash: String,
    pub from_address: String,
    pub to_address: String,
    /// Settled amount in base units, echoing the quote.
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPayment {
    pub x402_version: X402Version2,
    pub payload: PaymentPayload,
}

/// Pays x402-protected HTTP resources.
pub struct X402Adapter<W> {
    provider: Arc<W>,
    client: reqwest::Client,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl<W> X402Adapter<W> {
    pub fn new(provider: Arc<W>, client: reqwest::Client) -> Self {
        X402Adapter {
            provider,
            client,
            poll_attempts: HASH_POLL_ATTEMPTS,
            poll_interval: HASH_POLL_INTERVAL,
        }
    }

    #[cfg(test)]
    fn with_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_interval = interval;
        self
    }
}

/// Unsuccessful outcome for a payment that already settled on-chain. Keeps
/// the transaction identifiers so the spend stays traceable.
fn settled_failure(
    ctx: &PaymentContext<'_>,
    amount: MoneyAmount,
    transaction_id: &str,
    tx_hash: Option<&str>,
    error: String,
) -> PaymentResult {
    let mut result =
        PaymentResult::failed(amount, &ctx.request.recipient, Some(Route::X402), error)
            .with_metadata("transaction_id", Value::String(transaction_id.to_string()));
    result.blockchain_tx = tx_hash.map(str::to_string);
    result
}

impl<W: WalletProvider> X402Adapter<W> {
    /// The transfer endpoint may answer before the chain assigns a hash.
    /// Poll until one shows up or the transaction dies. Transient lookup
    /// errors are logged and retried.
    async fn wait_for_hash(&self, transaction_id: &str) -> Option<String> {
        for attempt in 0..self.poll_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.poll_interval).await;
            }
            match self.provider.transaction(transaction_id).await {
                Ok(record) => {
                    if let Some(hash) = record.tx_hash {
                        return Some(hash);
                    }
                    if record.state.payment_status() == PaymentStatus::Failed {
                        return None;
                    }
                }
                Err(err) => {
                    warn!(%transaction_id, error = %err, "transaction hash poll failed");
                }
            }
        }
        None
    }
}

#[async_trait]
impl<W: WalletProvider> ProtocolAdapter for X402Adapter<W> {
    fn route(&self) -> Route {
        Route::X402
    }

    fn can_handle(&self, ctx: &PaymentContext<'_>) -> bool {
        ctx.request.recipient_url().is_some()
    }

    fn estimate_fee(&self, ctx: &PaymentContext<'_>) -> MoneyAmount {
        network_fee(ctx.request.network)
    }

    #[instrument(skip_all, fields(wallet_id = %ctx.wallet.id, recipient = %ctx.request.recipient))]
    async fn execute(&self, ctx: &PaymentContext<'_>) -> Result<PaymentResult, AdapterError> {
        let url = ctx
            .request
            .recipient_url()
            .ok_or_else(|| AdapterError::UnroutableRecipient(ctx.request.recipient.clone()))?;

        let probe = self.client.get(url.clone()).send().await?;
        if probe.status() != StatusCode::PAYMENT_REQUIRED {
            return Err(AdapterError::Handshake(format!(
                "expected 402 from {url}, got {}",
                probe.status()
            )));
        }
        let offer: PaymentRequiredResponse = probe
            .json()
            .await
            .map_err(|err| AdapterError::Requirements(err.to_string()))?;
        let requirements = offer.requirements;
        if requirements.scheme != "exact" {
            return Err(AdapterError::Requirements(format!(
                "unsupported scheme {:?}",
                requirements.scheme
            )));
        }
        let required = MoneyAmount::from_base_units(&requirements.amount, USDC_DECIMALS)
            .map_err(|err| {
                AdapterError::Requirements(format!(
                    "unreadable amount {:?}: {err}",
                    requirements.amount
                ))
            })?;
        if required > ctx.request.amount {
            return Err(AdapterError::AmountExceedsOffer {
                required,
                offered: ctx.request.amount,
            });
        }

        // Settle before anything signed reaches the resource.
        let receipt = if requirements.network == ctx.wallet.blockchain {
            self.provider
                .transfer(&ctx.wallet.id, &requirements.payment_address, required)
                .await?
        } else {
            let destination = CrosschainDestination {
                network: requirements.network,
                address: requirements.payment_address.clone(),
                token: requirements.token.clone(),
            };
            self.provider
                .transfer_crosschain(&ctx.wallet.id, &destination, required)
                .await?
        };
        if receipt.state.payment_status() == PaymentStatus::Failed {
            return Ok(settled_failure(
                ctx,
                required,
                &receipt.transaction_id,
                receipt.tx_hash.as_deref(),
                format!("settlement transfer ended in state {:?}", receipt.state),
            ));
        }

        let tx_hash = match receipt.tx_hash.clone() {
            Some(hash) => Some(hash),
            None => self.wait_for_hash(&receipt.transaction_id).await,
        };
        let Some(tx_hash) = tx_hash else {
            return Ok(settled_failure(
                ctx,
                required,
                &receipt.transaction_id,
                None,
                "settlement submitted but no transaction hash surfaced".to_string(),
            ));
        };

        let signed = SignedPayment {
            x402_version: X402Version2,
            payload: PaymentPayload {
                transaction_hash: tx_hash.clone(),
                from_address: ctx.wallet.address.clone(),
                to_address: requirements.payment_address.clone(),
                amount: requirements.amount.clone(),
            },
        };
        let signature = match serde_json::to_vec(&signed) {
            Ok(bytes) => BASE64_STANDARD.encode(bytes),
            Err(err) => {
                return Ok(settled_failure(
                    ctx,
                    required,
                    &receipt.transaction_id,
                    Some(&tx_hash),
                    format!("could not encode payment proof: {err}"),
                ));
            }
        };

        // One retry only. The proof is single-use as far as we are
        // concerned; a rejection here is final for this attempt.
        let retry = match self
            .client
            .get(url.clone())
            .header(PAYMENT_SIGNATURE_HEADER, signature)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                return Ok(settled_failure(
                    ctx,
                    required,
                    &receipt.transaction_id,
                    Some(&tx_hash),
                    format!("resource retry failed after settlement: {err}"),
                ));
            }
        };

        if retry.status() == StatusCode::OK {
            let authenticated = retry
                .headers()
                .get(PAYMENT_RESPONSE_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.eq_ignore_ascii_case("authenticated"))
                .unwrap_or(false);
            if authenticated {
                return Ok(PaymentResult::succeeded(
                    required,
                    &ctx.request.recipient,
                    Route::X402,
                    PaymentStatus::Confirmed,
                    receipt.transaction_id,
                    Some(tx_hash),
                )
                .with_metadata("resource", Value::String(requirements.resource)));
            }
            return Ok(settled_failure(
                ctx,
                required,
                &receipt.transaction_id,
                Some(&tx_hash),
                "resource answered 200 without acknowledging the payment".to_string(),
            ));
        }
        Ok(settled_failure(
            ctx,
            required,
            &receipt.transaction_id,
            Some(&tx_hash),
            format!("resource rejected settled payment with status {}", retry.status()),
        ))
    }
}
