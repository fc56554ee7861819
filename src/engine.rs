//! The payment engine.
//!
//! One entry point per RPC operation. `pay` runs the wallet's guard chain,
//! routes the request to a settlement adapter, and records the executed
//! attempt on the ledger. Guard rejections come back as unsuccessful
//! results and leave no ledger trace; infrastructure problems (unknown
//! wallet, provider I/O before anything moved) surface as errors instead.
//!
//! Payments for one wallet serialize on a per-wallet async lock, so the
//! guard evaluation and the spend it permits are atomic with respect to
//! other payments from the same wallet.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::amount::MoneyAmount;
use crate::batch::{self, BatchError};
use crate::guards::{GuardRegistry, GuardVerdict};
use crate::intents::{IntentError, IntentStatus, IntentStore, PaymentIntent};
use crate::ledger::{Ledger, LedgerEntry, SyncUpdate};
use crate::network::Network;
use crate::protocols::{
    GatewayAdapter, PaymentContext, ProtocolAdapter, TransferAdapter, X402Adapter,
};
use crate::router::PaymentRouter;
use crate::types::{BatchResult, PaymentRequest, PaymentResult, Route, SimulateResponse};
use crate::wallet::{HttpWalletProvider, Wallet, WalletError, WalletProvider};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Intent(#[from] IntentError),
    #[error(transparent)]
    Batch(#[from] BatchError),
}

pub struct PaymentEngine<W = HttpWalletProvider> {
    provider: Arc<W>,
    router: PaymentRouter,
    guards: GuardRegistry,
    ledger: Ledger,
    intents: IntentStore,
    wallet_locks: DashMap<String, Arc<Mutex<()>>>,
    execute_timeout: Duration,
}

impl<W: WalletProvider + 'static> PaymentEngine<W> {
    pub fn new(provider: Arc<W>, client: reqwest::Client, execute_timeout: Duration) -> Self {
        let router = PaymentRouter::new(vec![
            Arc::new(TransferAdapter::new(provider.clone())) as Arc<dyn ProtocolAdapter>,
            Arc::new(X402Adapter::new(provider.clone(), client)),
            Arc::new(GatewayAdapter::new(provider.clone())),
        ]);
        PaymentEngine {
            provider,
            router,
            guards: GuardRegistry::new(),
            ledger: Ledger::new(),
            intents: IntentStore::new(),
            wallet_locks: DashMap::new(),
            execute_timeout,
        }
    }

    pub fn provider(&self) -> &Arc<W> {
        &self.provider
    }

    pub fn guards(&self) -> &GuardRegistry {
        &self.guards
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn wallet_lock(&self, wallet_id: &str) -> Arc<Mutex<()>> {
        self.wallet_locks
            .entry(wallet_id.to_string())
            .or_default()
            .clone()
    }

    #[instrument(skip_all, err, fields(wallet_id = %request.wallet_id, amount = %request.amount))]
    pub async fn pay(&self, request: PaymentRequest) -> Result<PaymentResult, EngineError> {
        let wallet = self.provider.wallet(&request.wallet_id).await?;
        let lock = self.wallet_lock(&wallet.id);
        let _held = lock.lock().await;
        self.pay_locked(&wallet, request, false).await
    }

    /// Guard evaluation plus settlement. The caller holds the wallet lock.
    async fn pay_locked(
        &self,
        wallet: &Wallet,
        request: PaymentRequest,
        confirmation_provided: bool,
    ) -> Result<PaymentResult, EngineError> {
        let verdict = self.guards.evaluate(
            &wallet.id,
            wallet.wallet_set_id.as_deref(),
            &request,
            &self.ledger,
            confirmation_provided,
        );
        let guards_passed = match verdict {
            GuardVerdict::Rejected {
                guard,
                reason,
                guards_passed,
            } => {
                info!(wallet_id = %wallet.id, %guard, %reason, "payment rejected by guard");
                return Ok(PaymentResult::failed(
                    request.amount,
                    &request.recipient,
                    request.method,
                    format!("{guard}: {reason}"),
                )
                .with_guards(guards_passed));
            }
            GuardVerdict::ConfirmationRequired {
                guards_passed,
                threshold,
            } => {
                let reason = format!(
                    "confirmation required: amount {} exceeds threshold {threshold}",
                    request.amount
                );
                let amount = request.amount;
                let recipient = request.recipient.clone();
                let intent = self.intents.create(request, IntentStatus::Pending);
                info!(wallet_id = %wallet.id, intent_id = %intent.id, "payment parked for confirmation");
                return Ok(
                    PaymentResult::requires_confirmation(amount, recipient, reason, intent.id)
                        .with_guards(guards_passed),
                );
            }
            GuardVerdict::Approved { guards_passed } => guards_passed,
        };

        let ctx = PaymentContext {
            request: &request,
            wallet,
        };
        let Some(adapter) = self.router.detect(&ctx) else {
            return Ok(PaymentResult::failed(
                request.amount,
                &request.recipient,
                request.method,
                format!("no payment route for recipient {}", request.recipient),
            )
            .with_guards(guards_passed));
        };

        let result = match tokio::time::timeout(self.execute_timeout, adapter.execute(&ctx)).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                warn!(wallet_id = %wallet.id, route = %adapter.route(), error = %err, "payment execution failed");
                PaymentResult::failed(
                    request.amount,
                    &request.recipient,
                    Some(adapter.route()),
                    err.to_string(),
                )
            }
            Err(_) => PaymentResult::failed(
                request.amount,
                &request.recipient,
                Some(adapter.route()),
                format!(
                    "payment execution timed out after {}s",
                    self.execute_timeout.as_secs()
                ),
            ),
        };
        let result = result.with_guards(guards_passed);
        self.ledger
            .record_payment(&wallet.id, &result, request.purpose());
        info!(wallet_id = %wallet.id, success = result.success, route = ?result.method, "payment executed");
        Ok(result)
    }

    /// Dry run: guard verdict and routing only. Takes no locks, moves no
    /// money, and writes nothing.
    #[instrument(skip_all, err, fields(wallet_id = %request.wallet_id))]
    pub async fn simulate(&self, request: PaymentRequest) -> Result<SimulateResponse, EngineError> {
        let wallet = self.provider.wallet(&request.wallet_id).await?;
        let verdict = self.guards.evaluate(
            &wallet.id,
            wallet.wallet_set_id.as_deref(),
            &request,
            &self.ledger,
            false,
        );
        let ctx = PaymentContext {
            request: &request,
            wallet: &wallet,
        };
        let adapter = self.router.detect(&ctx);
        let route = adapter.map(|adapter| adapter.route());
        let estimated_fee = adapter.map(|adapter| adapter.estimate_fee(&ctx));
        Ok(match verdict {
            GuardVerdict::Rejected { guard, reason, .. } => SimulateResponse {
                would_succeed: false,
                route,
                reason: Some(format!("{guard}: {reason}")),
                estimated_fee,
            },
            GuardVerdict::ConfirmationRequired { threshold, .. } => SimulateResponse {
                would_succeed: route.is_some(),
                route,
                reason: Some(format!(
                    "would require confirmation: amount {} exceeds threshold {threshold}",
                    request.amount
                )),
                estimated_fee,
            },
            GuardVerdict::Approved { .. } => match route {
                Some(route) => SimulateResponse {
                    would_succeed: true,
                    route: Some(route),
                    reason: None,
                    estimated_fee,
                },
                None => SimulateResponse {
                    would_succeed: false,
                    route: None,
                    reason: Some(format!(
                        "no payment route for recipient {}",
                        request.recipient
                    )),
                    estimated_fee: None,
                },
            },
        })
    }

    /// Whether a route exists and the wallet balance covers the amount.
    /// Guards are not consulted; `simulate` answers that question.
    pub async fn can_pay(&self, request: PaymentRequest) -> Result<bool, EngineError> {
        let wallet = self.provider.wallet(&request.wallet_id).await?;
        let ctx = PaymentContext {
            request: &request,
            wallet: &wallet,
        };
        if self.router.detect(&ctx).is_none() {
            return Ok(false);
        }
        let balance = self.provider.balance(&wallet.id, None).await?;
        Ok(balance >= request.amount)
    }

    pub async fn detect_method(
        &self,
        request: PaymentRequest,
    ) -> Result<Option<Route>, EngineError> {
        let wallet = self.provider.wallet(&request.wallet_id).await?;
        let ctx = PaymentContext {
            request: &request,
            wallet: &wallet,
        };
        Ok(self.router.detect_route(&ctx))
    }

    pub async fn balance(
        &self,
        wallet_id: &str,
        token: Option<&str>,
    ) -> Result<MoneyAmount, EngineError> {
        Ok(self.provider.balance(wallet_id, token).await?)
    }

    /// Pays every request, at most `concurrency` at a time. A request that
    /// errors out never poisons its neighbours; the error becomes that
    /// slot's unsuccessful result.
    #[instrument(skip_all, err, fields(count = requests.len(), concurrency = concurrency))]
    pub async fn batch_pay(
        &self,
        requests: Vec<PaymentRequest>,
        concurrency: usize,
    ) -> Result<BatchResult, EngineError> {
        Ok(batch::run_batch(requests, concurrency, |request| {
            let amount = request.amount;
            let recipient = request.recipient.clone();
            let method = request.method;
            async move {
                match self.pay(request).await {
                    Ok(result) => result,
                    Err(err) => PaymentResult::failed(amount, recipient, method, err.to_string()),
                }
            }
        })
        .await?)
    }

    /// Creates an intent directly, without going through a confirm guard.
    /// The network defaults to the wallet's own chain.
    pub async fn create_intent(
        &self,
        wallet_id: &str,
        recipient: &str,
        amount: MoneyAmount,
        network: Option<Network>,
        metadata: Map<String, Value>,
    ) -> Result<PaymentIntent, EngineError> {
        let wallet = self.provider.wallet(wallet_id).await?;
        let request = PaymentRequest {
            wallet_id: wallet.id.clone(),
            recipient: recipient.to_string(),
            amount,
            network: network.unwrap_or(wallet.blockchain),
            method: None,
            metadata,
        };
        Ok(self.intents.create(request, IntentStatus::Created))
    }

    pub async fn get_intent(&self, intent_id: &str) -> Result<PaymentIntent, EngineError> {
        Ok(self.intents.get(intent_id).await?)
    }

    /// Replays the intent's frozen request with the confirm guard satisfied.
    /// Confirming an already-confirmed intent returns the stored result
    /// instead of paying twice.
    #[instrument(skip_all, err, fields(intent_id = %intent_id))]
    pub async fn confirm_intent(&self, intent_id: &str) -> Result<PaymentResult, EngineError> {
        let entry = self.intents.entry(intent_id)?;
        let mut record = entry.lock().await;
        if record.intent.status == IntentStatus::Confirmed {
            if let Some(result) = record.result.clone() {
                return Ok(result);
            }
        }
        if record.intent.status.is_terminal() {
            return Err(IntentError::NotConfirmable {
                id: intent_id.to_string(),
                status: record.intent.status,
            }
            .into());
        }
        let request = record.request.clone();
        let wallet = self.provider.wallet(&request.wallet_id).await?;
        let lock = self.wallet_lock(&wallet.id);
        let _held = lock.lock().await;
        let result = self
            .pay_locked(&wallet, request, true)
            .await?
            .with_metadata("intent_id", Value::String(intent_id.to_string()));
        record.set_status(if result.success {
            IntentStatus::Confirmed
        } else {
            IntentStatus::Failed
        });
        record.result = Some(result.clone());
        Ok(result)
    }

    /// Cancels an intent that has not reached a terminal status. A cancel
    /// racing a confirm waits on the intent lock and then reports the
    /// terminal status it finds.
    pub async fn cancel_intent(&self, intent_id: &str) -> Result<PaymentIntent, EngineError> {
        let entry = self.intents.entry(intent_id)?;
        let mut record = entry.lock().await;
        match record.intent.status {
            IntentStatus::Created | IntentStatus::Pending => {
                record.set_status(IntentStatus::Cancelled);
                Ok(record.intent.clone())
            }
            status => Err(IntentError::NotCancellable {
                id: intent_id.to_string(),
                status,
            }
            .into()),
        }
    }

    /// Refreshes the ledger from the provider's current view of one
    /// transaction, creating the entry if the spend happened out of band.
    #[instrument(skip_all, err, fields(wallet_id = %wallet_id, transaction_id = %transaction_id))]
    pub async fn sync_transaction(
        &self,
        wallet_id: &str,
        transaction_id: &str,
    ) -> Result<LedgerEntry, EngineError> {
        let record = self.provider.transaction(transaction_id).await?;
        let update = SyncUpdate {
            wallet_id: wallet_id.to_string(),
            transaction_id: Some(transaction_id.to_string()),
            tx_hash: record.tx_hash.clone(),
            status: Some(record.state.payment_status()),
            recipient: record.destination_address.clone(),
            amount: record.amounts.first().copied(),
            purpose: None,
        };
        Ok(self.ledger.sync(update))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guards::{
        BudgetGuard, ConfirmGuard, Guard, GuardScope, RecipientGuard, SingleTxGuard,
    };
    use crate::testing::{MockWalletProvider, WithoutHeader};
    use crate::timestamp::UnixTimestamp;
    use crate::types::PaymentStatus;
    use crate::wallet::{TransactionRecord, TransactionState};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine(provider: Arc<MockWalletProvider>) -> PaymentEngine<MockWalletProvider> {
        PaymentEngine::new(provider, reqwest::Client::new(), Duration::from_secs(30))
    }

    fn request(recipient: &str, amount: &str, network: Network) -> PaymentRequest {
        PaymentRequest {
            wallet_id: "w1".to_string(),
            recipient: recipient.to_string(),
            amount: MoneyAmount::parse(amount).unwrap(),
            network,
            method: None,
            metadata: Map::new(),
        }
    }

    fn base_wallet(provider: &MockWalletProvider) {
        provider.add_wallet(Wallet::test_fixture("w1", Network::Base));
    }

    #[tokio::test]
    async fn test_pay_routes_and_records() {
        let provider = Arc::new(MockWalletProvider::new());
        base_wallet(&provider);
        let engine = engine(provider.clone());

        let result = engine
            .pay(request("0xdest", "1.5", Network::Base))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.method, Some(Route::Transfer));
        assert_eq!(provider.transfer_count(), 1);

        let entries = engine.ledger().entries_for("w1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, MoneyAmount::parse("1.5").unwrap());
        assert_eq!(entries[0].status, PaymentStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_unknown_wallet_is_an_error_not_a_result() {
        let engine = engine(Arc::new(MockWalletProvider::new()));
        let err = engine
            .pay(request("0xdest", "1", Network::Base))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Wallet(WalletError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_guard_rejection_executes_nothing_and_records_nothing() {
        let provider = Arc::new(MockWalletProvider::new());
        base_wallet(&provider);
        let engine = engine(provider.clone());
        engine.guards().attach(
            GuardScope::Wallet("w1".to_string()),
            Guard::SingleTx(SingleTxGuard {
                max_amount: MoneyAmount::parse("1").unwrap(),
                min_amount: None,
            }),
        );

        let result = engine
            .pay(request("0xdest", "5", Network::Base))
            .await
            .unwrap();
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.starts_with("single_tx: "), "got {error}");
        assert_eq!(provider.transfer_count(), 0);
        assert!(engine.ledger().entries_for("w1").is_empty());
    }

    #[tokio::test]
    async fn test_budget_counts_only_executed_payments() {
        let provider = Arc::new(MockWalletProvider::new());
        base_wallet(&provider);
        let engine = engine(provider.clone());
        engine.guards().attach(
            GuardScope::Wallet("w1".to_string()),
            Guard::Budget(BudgetGuard {
                daily_limit: Some(MoneyAmount::parse("1").unwrap()),
                ..BudgetGuard::default()
            }),
        );

        let first = engine
            .pay(request("0xdest", "0.6", Network::Base))
            .await
            .unwrap();
        assert!(first.success);
        assert_eq!(first.guards_passed, vec!["budget".to_string()]);

        let second = engine
            .pay(request("0xdest", "0.6", Network::Base))
            .await
            .unwrap();
        assert!(!second.success);
        assert!(second.error.unwrap().contains("daily budget exceeded"));
        assert_eq!(provider.transfer_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_payments_cannot_overrun_a_budget() {
        let provider = Arc::new(MockWalletProvider::new());
        base_wallet(&provider);
        let engine = Arc::new(engine(provider.clone()));
        engine.guards().attach(
            GuardScope::Wallet("w1".to_string()),
            Guard::Budget(BudgetGuard {
                daily_limit: Some(MoneyAmount::parse("1").unwrap()),
                ..BudgetGuard::default()
            }),
        );

        let (a, b) = tokio::join!(
            engine.pay(request("0xdest", "0.7", Network::Base)),
            engine.pay(request("0xother", "0.7", Network::Base)),
        );
        let outcomes = [a.unwrap().success, b.unwrap().success];
        assert_eq!(
            outcomes.iter().filter(|success| **success).count(),
            1,
            "exactly one of the racing payments may fit the budget"
        );
        assert_eq!(provider.transfer_count(), 1);
    }

    #[tokio::test]
    async fn test_confirm_guard_parks_payment_and_confirm_executes_once() {
        let provider = Arc::new(MockWalletProvider::new());
        base_wallet(&provider);
        let engine = engine(provider.clone());
        engine.guards().attach(
            GuardScope::Wallet("w1".to_string()),
            Guard::Confirm(ConfirmGuard {
                threshold: MoneyAmount::parse("5").unwrap(),
            }),
        );

        let parked = engine
            .pay(request("0xdest", "10", Network::Base))
            .await
            .unwrap();
        assert!(!parked.success);
        assert_eq!(parked.status, PaymentStatus::Pending);
        assert_eq!(provider.transfer_count(), 0);
        let intent_id = parked.metadata["intent_id"].as_str().unwrap().to_string();

        let intent = engine.get_intent(&intent_id).await.unwrap();
        assert_eq!(intent.status, IntentStatus::Pending);

        let confirmed = engine.confirm_intent(&intent_id).await.unwrap();
        assert!(confirmed.success);
        assert_eq!(confirmed.metadata["intent_id"], json!(intent_id.clone()));
        assert_eq!(provider.transfer_count(), 1);
        assert_eq!(
            engine.get_intent(&intent_id).await.unwrap().status,
            IntentStatus::Confirmed
        );

        // confirming again replays the stored result, not the payment
        let again = engine.confirm_intent(&intent_id).await.unwrap();
        assert_eq!(again.transaction_id, confirmed.transaction_id);
        assert_eq!(provider.transfer_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_and_terminal_transitions() {
        let provider = Arc::new(MockWalletProvider::new());
        base_wallet(&provider);
        let engine = engine(provider.clone());

        let intent = engine
            .create_intent(
                "w1",
                "0xdest",
                MoneyAmount::parse("3").unwrap(),
                None,
                Map::new(),
            )
            .await
            .unwrap();
        assert_eq!(intent.status, IntentStatus::Created);

        let cancelled = engine.cancel_intent(&intent.id).await.unwrap();
        assert_eq!(cancelled.status, IntentStatus::Cancelled);

        let cancel_again = engine.cancel_intent(&intent.id).await.unwrap_err();
        assert!(matches!(
            cancel_again,
            EngineError::Intent(IntentError::NotCancellable { .. })
        ));
        let confirm_cancelled = engine.confirm_intent(&intent.id).await.unwrap_err();
        assert!(matches!(
            confirm_cancelled,
            EngineError::Intent(IntentError::NotConfirmable { .. })
        ));
        assert_eq!(provider.transfer_count(), 0);
    }

    #[tokio::test]
    async fn test_simulate_never_spends_or_records() {
        let provider = Arc::new(MockWalletProvider::new());
        base_wallet(&provider);
        let engine = engine(provider.clone());
        engine.guards().attach(
            GuardScope::Wallet("w1".to_string()),
            Guard::Recipient(RecipientGuard {
                allowed: Vec::new(),
                denied: vec!["0xbanned".to_string()],
            }),
        );

        let clean = engine
            .simulate(request("0xdest", "2", Network::Base))
            .await
            .unwrap();
        assert!(clean.would_succeed);
        assert_eq!(clean.route, Some(Route::Transfer));
        assert!(clean.reason.is_none());
        assert!(clean.estimated_fee.is_some());

        let blocked = engine
            .simulate(request("0xbanned", "2", Network::Base))
            .await
            .unwrap();
        assert!(!blocked.would_succeed);
        assert!(blocked.reason.unwrap().starts_with("recipient: "));

        assert_eq!(provider.transfer_count(), 0);
        assert!(engine.ledger().entries_for("w1").is_empty());
    }

    #[tokio::test]
    async fn test_can_pay_checks_route_and_balance() {
        let provider = Arc::new(MockWalletProvider::new());
        base_wallet(&provider);
        provider.set_balance("w1", MoneyAmount::parse("10").unwrap());
        let engine = engine(provider);

        assert!(engine
            .can_pay(request("0xdest", "5", Network::Base))
            .await
            .unwrap());
        assert!(!engine
            .can_pay(request("0xdest", "50", Network::Base))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_detect_method_matches_routing() {
        let provider = Arc::new(MockWalletProvider::new());
        base_wallet(&provider);
        let engine = engine(provider);

        assert_eq!(
            engine
                .detect_method(request("0xdest", "1", Network::Base))
                .await
                .unwrap(),
            Some(Route::Transfer)
        );
        assert_eq!(
            engine
                .detect_method(request("0xdest", "1", Network::Polygon))
                .await
                .unwrap(),
            Some(Route::Gateway)
        );
        assert_eq!(
            engine
                .detect_method(request("https://api.example.com/x", "1", Network::Base))
                .await
                .unwrap(),
            Some(Route::X402)
        );
    }

    #[tokio::test]
    async fn test_execution_timeout_becomes_failed_result() {
        let provider = Arc::new(
            MockWalletProvider::new().with_transfer_delay(Duration::from_millis(200)),
        );
        base_wallet(&provider);
        let engine =
            PaymentEngine::new(provider.clone(), reqwest::Client::new(), Duration::from_millis(50));

        let result = engine
            .pay(request("0xdest", "1", Network::Base))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
        // the attempt started, so it is on the ledger as failed
        let entries = engine.ledger().entries_for("w1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_provider_rejection_becomes_failed_result() {
        let provider = Arc::new(MockWalletProvider::new().rejecting_transfers());
        base_wallet(&provider);
        let engine = engine(provider);

        let result = engine
            .pay(request("0xdest", "1", Network::Base))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("insufficient balance"));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures_and_keeps_order() {
        let provider = Arc::new(MockWalletProvider::new());
        base_wallet(&provider);
        let engine = engine(provider);
        engine.guards().attach(
            GuardScope::Wallet("w1".to_string()),
            Guard::Recipient(RecipientGuard {
                allowed: Vec::new(),
                denied: vec!["0xbanned".to_string()],
            }),
        );

        let batch = engine
            .batch_pay(
                vec![
                    request("0xone", "1", Network::Base),
                    request("0xbanned", "1", Network::Base),
                    request("0xtwo", "1", Network::Base),
                ],
                2,
            )
            .await
            .unwrap();
        assert_eq!(batch.total, 3);
        assert_eq!(batch.succeeded, 2);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.results[1].recipient, "0xbanned");
        assert!(!batch.results[1].success);

        let zero = engine.batch_pay(Vec::new(), 0).await.unwrap_err();
        assert!(matches!(
            zero,
            EngineError::Batch(BatchError::ZeroConcurrency)
        ));
    }

    #[tokio::test]
    async fn test_x402_payment_flows_through_engine_and_ledger() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/report"))
            .and(wiremock::matchers::header_exists(
                crate::protocols::PAYMENT_SIGNATURE_HEADER,
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(crate::protocols::PAYMENT_RESPONSE_HEADER, "authenticated"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/report"))
            .and(WithoutHeader(crate::protocols::PAYMENT_SIGNATURE_HEADER))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "requirements": {
                    "scheme": "exact",
                    "network": "base",
                    "amount": "250000",
                    "token": "USDC",
                    "paymentAddress": "0xmerchant",
                    "resource": format!("{}/report", server.uri()),
                    "description": "quarterly report"
                }
            })))
            .mount(&server)
            .await;

        let provider = Arc::new(MockWalletProvider::new());
        base_wallet(&provider);
        let engine = engine(provider.clone());

        let result = engine
            .pay(request(
                &format!("{}/report", server.uri()),
                "1",
                Network::Base,
            ))
            .await
            .unwrap();
        assert!(result.success, "x402 should settle: {:?}", result.error);
        assert_eq!(result.method, Some(Route::X402));
        assert_eq!(result.amount, MoneyAmount::parse("0.25").unwrap());

        let entries = engine.ledger().entries_for("w1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, MoneyAmount::parse("0.25").unwrap());
        assert!(entries[0].tx_hash.is_some());
    }

    #[tokio::test]
    async fn test_sync_transaction_creates_then_updates() {
        let provider = Arc::new(MockWalletProvider::new());
        base_wallet(&provider);
        let engine = engine(provider.clone());

        let now = UnixTimestamp::now();
        provider.add_transaction(
            "w1",
            TransactionRecord {
                id: "tx-99".to_string(),
                state: TransactionState::Sent,
                tx_hash: Some("0xfeed".to_string()),
                amounts: vec![MoneyAmount::parse("4").unwrap()],
                source_address: Some("0xw1".to_string()),
                destination_address: Some("0xdest".to_string()),
                blockchain: Network::Base,
                fee_level: None,
                create_date: now,
                update_date: now,
            },
        );

        let created = engine.sync_transaction("w1", "tx-99").await.unwrap();
        assert_eq!(created.status, PaymentStatus::Submitted);
        assert_eq!(created.amount, MoneyAmount::parse("4").unwrap());

        // the provider later reports the same transaction confirmed
        provider.add_transaction(
            "w1",
            TransactionRecord {
                id: "tx-99".to_string(),
                state: TransactionState::Complete,
                tx_hash: Some("0xfeed".to_string()),
                amounts: vec![MoneyAmount::parse("4").unwrap()],
                source_address: Some("0xw1".to_string()),
                destination_address: Some("0xdest".to_string()),
                blockchain: Network::Base,
                fee_level: None,
                create_date: now,
                update_date: now,
            },
        );
        let updated = engine.sync_transaction("w1", "tx-99").await.unwrap();
        assert_eq!(updated.id, created.id, "sync must update in place");
        assert_eq!(updated.status, PaymentStatus::Confirmed);
    }
}
