//! Line-delimited JSON-RPC 2.0 over any byte stream, stdio in production.
//!
//! One request per line, one response per line, handled strictly in arrival
//! order. A line that is not JSON gets the standard `-32700` parse error
//! and the loop keeps going; a method that fails gets `-32603` with the
//! error display as `message` and the debug rendering as `data`. Anything
//! a method returns successfully is passed through as `result` untouched,
//! so scalar returns stay scalar on the wire.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::amount::MoneyAmount;
use crate::engine::{EngineError, PaymentEngine};
use crate::guards::{
    BudgetGuard, ConfirmGuard, Guard, GuardScope, RateLimitGuard, RecipientGuard, SingleTxGuard,
};
use crate::network::Network;
use crate::types::PaymentRequest;
use crate::wallet::{HttpWalletProvider, WalletError, WalletProvider};

const JSONRPC_VERSION: &str = "2.0";
const PARSE_ERROR: i64 = -32700;
const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Unknown method: {0}")]
    UnknownMethod(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error("could not encode response: {0}")]
    Encode(serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcErrorBody>,
    id: Value,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        RpcResponse {
            jsonrpc: JSONRPC_VERSION,
            result: Some(result),
            error: None,
            id,
        }
    }

    fn fail(id: Value, code: i64, message: String, data: Option<String>) -> Self {
        RpcResponse {
            jsonrpc: JSONRPC_VERSION,
            result: None,
            error: Some(RpcErrorBody { code, message, data }),
            id,
        }
    }
}

/// Missing or `null` params mean "no arguments".
fn parse<P: DeserializeOwned>(params: Value) -> Result<P, RpcError> {
    let params = if params.is_null() {
        Value::Object(Map::new())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|err| RpcError::InvalidParams(err.to_string()))
}

fn encode<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(RpcError::Encode)
}

fn guard_attached() -> Result<Value, RpcError> {
    Ok(serde_json::json!({ "success": true }))
}

#[derive(Deserialize)]
struct WalletIdParams {
    wallet_id: String,
}

#[derive(Deserialize)]
struct SetIdParams {
    wallet_set_id: String,
}

#[derive(Deserialize)]
struct IntentIdParams {
    intent_id: String,
}

#[derive(Deserialize)]
struct BalanceParams {
    wallet_id: String,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Deserialize)]
struct CreateWalletParams {
    wallet_set_id: String,
    blockchain: Network,
}

#[derive(Deserialize)]
struct CreateWalletSetParams {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct ListWalletsParams {
    #[serde(default)]
    wallet_set_id: Option<String>,
}

#[derive(Deserialize)]
struct BatchPayParams {
    requests: Vec<PaymentRequest>,
    #[serde(default)]
    concurrency: Option<usize>,
}

#[derive(Deserialize)]
struct CreateIntentParams {
    wallet_id: String,
    recipient: String,
    amount: MoneyAmount,
    #[serde(default)]
    network: Option<Network>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

#[derive(Deserialize)]
struct SyncTransactionParams {
    wallet_id: String,
    transaction_id: String,
}

/// Guard params are the wallet (or set) id plus the guard's own fields,
/// flattened alongside it.
#[derive(Deserialize)]
struct WalletScoped<T> {
    wallet_id: String,
    #[serde(flatten)]
    guard: T,
}

#[derive(Deserialize)]
struct SetScoped<T> {
    wallet_set_id: String,
    #[serde(flatten)]
    guard: T,
}

pub struct RpcServer<W = HttpWalletProvider> {
    engine: PaymentEngine<W>,
    default_concurrency: usize,
}

impl<W: WalletProvider + 'static> RpcServer<W> {
    pub fn new(engine: PaymentEngine<W>, default_concurrency: usize) -> Self {
        RpcServer {
            engine,
            default_concurrency,
        }
    }

    /// Reads newline-delimited requests until EOF or cancellation. Every
    /// response is compact JSON on a single line, flushed immediately.
    pub async fn serve<R, Wr>(
        &self,
        reader: R,
        writer: Wr,
        cancel: CancellationToken,
    ) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        Wr: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        let mut writer = writer;
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                debug!("input closed, shutting down");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_line(&line).await;
            let payload = match serde_json::to_vec(&response) {
                Ok(payload) => payload,
                Err(err) => {
                    // a response we built ourselves failed to serialize;
                    // degrade to a minimal internal error envelope
                    warn!(error = %err, "response serialization failed");
                    format!(
                        r#"{{"jsonrpc":"2.0","error":{{"code":{INTERNAL_ERROR},"message":"Internal error"}},"id":null}}"#
                    )
                    .into_bytes()
                }
            };
            writer.write_all(&payload).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> RpcResponse {
        let request: RpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "unparseable request line");
                return RpcResponse::fail(Value::Null, PARSE_ERROR, "Parse error".to_string(), None);
            }
        };
        let id = request.id.unwrap_or(Value::Null);
        match self.dispatch(&request.method, request.params).await {
            Ok(result) => RpcResponse::ok(id, result),
            Err(err) => {
                warn!(method = %request.method, error = %err, "request failed");
                RpcResponse::fail(id, INTERNAL_ERROR, err.to_string(), Some(format!("{err:?}")))
            }
        }
    }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "pay" => {
                let request: PaymentRequest = parse(params)?;
                encode(self.engine.pay(request).await?)
            }
            "simulate" => {
                let request: PaymentRequest = parse(params)?;
                encode(self.engine.simulate(request).await?)
            }
            "can_pay" => {
                let request: PaymentRequest = parse(params)?;
                encode(self.engine.can_pay(request).await?)
            }
            "detect_method" => {
                let request: PaymentRequest = parse(params)?;
                encode(self.engine.detect_method(request).await?)
            }
            "batch_pay" => {
                let batch: BatchPayParams = parse(params)?;
                let concurrency = batch.concurrency.unwrap_or(self.default_concurrency);
                encode(self.engine.batch_pay(batch.requests, concurrency).await?)
            }
            "get_balance" => {
                let balance: BalanceParams = parse(params)?;
                encode(
                    self.engine
                        .balance(&balance.wallet_id, balance.token.as_deref())
                        .await?,
                )
            }
            "create_wallet" => {
                let create: CreateWalletParams = parse(params)?;
                encode(
                    self.engine
                        .provider()
                        .create_wallet(&create.wallet_set_id, create.blockchain)
                        .await?,
                )
            }
            "create_wallet_set" => {
                let create: CreateWalletSetParams = parse(params)?;
                encode(
                    self.engine
                        .provider()
                        .create_wallet_set(create.name.as_deref())
                        .await?,
                )
            }
            "get_wallet" => {
                let wallet: WalletIdParams = parse(params)?;
                encode(self.engine.provider().wallet(&wallet.wallet_id).await?)
            }
            "list_wallets" => {
                let list: ListWalletsParams = parse(params)?;
                encode(
                    self.engine
                        .provider()
                        .wallets(list.wallet_set_id.as_deref())
                        .await?,
                )
            }
            "list_wallet_sets" => encode(self.engine.provider().wallet_sets().await?),
            "list_transactions" => {
                let list: WalletIdParams = parse(params)?;
                encode(self.engine.provider().transactions(&list.wallet_id).await?)
            }
            "create_payment_intent" => {
                let create: CreateIntentParams = parse(params)?;
                encode(
                    self.engine
                        .create_intent(
                            &create.wallet_id,
                            &create.recipient,
                            create.amount,
                            create.network,
                            create.metadata,
                        )
                        .await?,
                )
            }
            "get_payment_intent" => {
                let intent: IntentIdParams = parse(params)?;
                encode(self.engine.get_intent(&intent.intent_id).await?)
            }
            "confirm_payment_intent" => {
                let intent: IntentIdParams = parse(params)?;
                encode(self.engine.confirm_intent(&intent.intent_id).await?)
            }
            "cancel_payment_intent" => {
                let intent: IntentIdParams = parse(params)?;
                encode(self.engine.cancel_intent(&intent.intent_id).await?)
            }
            "add_budget_guard" => {
                let scoped: WalletScoped<BudgetGuard> = parse(params)?;
                self.engine.guards().attach(
                    GuardScope::Wallet(scoped.wallet_id),
                    Guard::Budget(scoped.guard),
                );
                guard_attached()
            }
            "add_budget_guard_for_set" => {
                let scoped: SetScoped<BudgetGuard> = parse(params)?;
                self.engine.guards().attach(
                    GuardScope::WalletSet(scoped.wallet_set_id),
                    Guard::Budget(scoped.guard),
                );
                guard_attached()
            }
            "add_rate_limit_guard" => {
                let scoped: WalletScoped<RateLimitGuard> = parse(params)?;
                self.engine.guards().attach(
                    GuardScope::Wallet(scoped.wallet_id),
                    Guard::RateLimit(scoped.guard),
                );
                guard_attached()
            }
            "add_rate_limit_guard_for_set" => {
                let scoped: SetScoped<RateLimitGuard> = parse(params)?;
                self.engine.guards().attach(
                    GuardScope::WalletSet(scoped.wallet_set_id),
                    Guard::RateLimit(scoped.guard),
                );
                guard_attached()
            }
            "add_single_tx_guard" => {
                let scoped: WalletScoped<SingleTxGuard> = parse(params)?;
                self.engine.guards().attach(
                    GuardScope::Wallet(scoped.wallet_id),
                    Guard::SingleTx(scoped.guard),
                );
                guard_attached()
            }
            "add_single_tx_guard_for_set" => {
                let scoped: SetScoped<SingleTxGuard> = parse(params)?;
                self.engine.guards().attach(
                    GuardScope::WalletSet(scoped.wallet_set_id),
                    Guard::SingleTx(scoped.guard),
                );
                guard_attached()
            }
            "add_recipient_guard" => {
                let scoped: WalletScoped<RecipientGuard> = parse(params)?;
                self.engine.guards().attach(
                    GuardScope::Wallet(scoped.wallet_id),
                    Guard::Recipient(scoped.guard),
                );
                guard_attached()
            }
            "add_recipient_guard_for_set" => {
                let scoped: SetScoped<RecipientGuard> = parse(params)?;
                self.engine.guards().attach(
                    GuardScope::WalletSet(scoped.wallet_set_id),
                    Guard::Recipient(scoped.guard),
                );
                guard_attached()
            }
            "add_confirm_guard" => {
                let scoped: WalletScoped<ConfirmGuard> = parse(params)?;
                self.engine.guards().attach(
                    GuardScope::Wallet(scoped.wallet_id),
                    Guard::Confirm(scoped.guard),
                );
                guard_attached()
            }
            "add_confirm_guard_for_set" => {
                let scoped: SetScoped<ConfirmGuard> = parse(params)?;
                self.engine.guards().attach(
                    GuardScope::WalletSet(scoped.wallet_set_id),
                    Guard::Confirm(scoped.guard),
                );
                guard_attached()
            }
            "list_guards" => {
                let list: WalletIdParams = parse(params)?;
                encode(
                    self.engine
                        .guards()
                        .guards_for_scope(&GuardScope::Wallet(list.wallet_id)),
                )
            }
            "list_guards_for_set" => {
                let list: SetIdParams = parse(params)?;
                encode(
                    self.engine
                        .guards()
                        .guards_for_scope(&GuardScope::WalletSet(list.wallet_set_id)),
                )
            }
            "sync_transaction" => {
                let sync: SyncTransactionParams = parse(params)?;
                encode(
                    self.engine
                        .sync_transaction(&sync.wallet_id, &sync.transaction_id)
                        .await?,
                )
            }
            "health" => Ok(serde_json::json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
            })),
            other => Err(RpcError::UnknownMethod(other.to_string())),
        }
    }
}
