//! Shared test doubles. Compiled only for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::amount::MoneyAmount;
use crate::network::Network;
use crate::timestamp::UnixTimestamp;
use crate::types::CrosschainDestination;
use crate::wallet::{
    AccountType, CustodyType, FeeLevel, TransactionRecord, TransactionState, TransferReceipt,
    Wallet, WalletError, WalletProvider, WalletSet, WalletState,
};

/// In-memory wallet service. Transfers succeed instantly unless one of the
/// builder knobs says otherwise.
#[derive(Default)]
pub(crate) struct MockWalletProvider {
    wallets: DashMap<String, Wallet>,
    wallet_sets: DashMap<String, WalletSet>,
    transactions: DashMap<String, TransactionRecord>,
    wallet_transactions: DashMap<String, Vec<String>>,
    balances: DashMap<String, MoneyAmount>,
    transfer_calls: AtomicUsize,
    crosschain_calls: AtomicUsize,
    fail_transfers: bool,
    reject_transfers: bool,
    defer_hashes: bool,
    transfer_delay: Option<Duration>,
}

impl MockWalletProvider {
    pub(crate) fn new() -> Self {
        MockWalletProvider::default()
    }

    /// Transfers come back in a terminal `failed` state.
    pub(crate) fn failing_transfers(mut self) -> Self {
        self.fail_transfers = true;
        self
    }

    /// The service refuses transfer submissions outright.
    pub(crate) fn rejecting_transfers(mut self) -> Self {
        self.reject_transfers = true;
        self
    }

    /// Transfer receipts omit the hash; it only shows up on lookup.
    pub(crate) fn with_deferred_hashes(mut self) -> Self {
        self.defer_hashes = true;
        self
    }

    pub(crate) fn with_transfer_delay(mut self, delay: Duration) -> Self {
        self.transfer_delay = Some(delay);
        self
    }

    pub(crate) fn add_wallet(&self, wallet: Wallet) {
        self.wallets.insert(wallet.id.clone(), wallet);
    }

    pub(crate) fn set_balance(&self, wallet_id: &str, amount: MoneyAmount) {
        self.balances.insert(wallet_id.to_string(), amount);
    }

    pub(crate) fn add_transaction(&self, wallet_id: &str, record: TransactionRecord) {
        self.wallet_transactions
            .entry(wallet_id.to_string())
            .or_default()
            .push(record.id.clone());
        self.transactions.insert(record.id.clone(), record);
    }

    pub(crate) fn transfer_count(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn crosschain_count(&self) -> usize {
        self.crosschain_calls.load(Ordering::SeqCst)
    }

    fn record(
        &self,
        wallet_id: &str,
        id: &str,
        tx_hash: Option<String>,
        state: TransactionState,
        destination: &str,
        amount: MoneyAmount,
    ) {
        let now = UnixTimestamp::now();
        let (source_address, blockchain) = self
            .wallets
            .get(wallet_id)
            .map(|wallet| (Some(wallet.address.clone()), wallet.blockchain))
            .unwrap_or((None, Network::Base));
        self.add_transaction(
            wallet_id,
            TransactionRecord {
                id: id.to_string(),
                state,
                tx_hash,
                amounts: vec![amount],
                source_address,
                destination_address: Some(destination.to_string()),
                blockchain,
                fee_level: Some(FeeLevel::Medium),
                create_date: now,
                update_date: now,
            },
        );
    }
}

#[async_trait]
impl WalletProvider for MockWalletProvider {
    async fn create_wallet_set(&self, name: Option<&str>) -> Result<WalletSet, WalletError> {
        let now = UnixTimestamp::now();
        let set = WalletSet {
            id: format!("set-{}", Uuid::now_v7()),
            name: name.map(str::to_string),
            custody_type: CustodyType::Developer,
            create_date: now,
            update_date: now,
        };
        self.wallet_sets.insert(set.id.clone(), set.clone());
        Ok(set)
    }

    async fn create_wallet(
        &self,
        wallet_set_id: &str,
        blockchain: Network,
    ) -> Result<Wallet, WalletError> {
        let now = UnixTimestamp::now();
        let id = format!("wallet-{}", Uuid::now_v7());
        let wallet = Wallet {
            address: format!("0x{}", Uuid::now_v7().simple()),
            id: id.clone(),
            blockchain,
            state: WalletState::Live,
            wallet_set_id: Some(wallet_set_id.to_string()),
            custody_type: CustodyType::Developer,
            account_type: AccountType::Eoa,
            create_date: now,
            update_date: now,
        };
        self.wallets.insert(id, wallet.clone());
        Ok(wallet)
    }

    async fn wallet(&self, wallet_id: &str) -> Result<Wallet, WalletError> {
        self.wallets
            .get(wallet_id)
            .map(|wallet| wallet.clone())
            .ok_or_else(|| WalletError::NotFound(wallet_id.to_string()))
    }

    async fn wallets(&self, wallet_set_id: Option<&str>) -> Result<Vec<Wallet>, WalletError> {
        let mut wallets: Vec<Wallet> = self
            .wallets
            .iter()
            .filter(|entry| match wallet_set_id {
                Some(set) => entry.wallet_set_id.as_deref() == Some(set),
                None => true,
            })
            .map(|entry| entry.clone())
            .collect();
        wallets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(wallets)
    }

    async fn wallet_sets(&self) -> Result<Vec<WalletSet>, WalletError> {
        let mut sets: Vec<WalletSet> = self.wallet_sets.iter().map(|entry| entry.clone()).collect();
        sets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sets)
    }

    async fn balance(
        &self,
        wallet_id: &str,
        _token: Option<&str>,
    ) -> Result<MoneyAmount, WalletError> {
        if !self.wallets.contains_key(wallet_id) {
            return Err(WalletError::NotFound(wallet_id.to_string()));
        }
        Ok(self
            .balances
            .get(wallet_id)
            .map(|balance| *balance)
            .unwrap_or(MoneyAmount::parse("1000").unwrap()))
    }

    async fn transactions(&self, wallet_id: &str) -> Result<Vec<TransactionRecord>, WalletError> {
        let ids = self
            .wallet_transactions
            .get(wallet_id)
            .map(|ids| ids.clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| self.transactions.get(id).map(|record| record.clone()))
            .collect())
    }

    async fn transaction(&self, transaction_id: &str) -> Result<TransactionRecord, WalletError> {
        self.transactions
            .get(transaction_id)
            .map(|record| record.clone())
            .ok_or_else(|| WalletError::NotFound(transaction_id.to_string()))
    }

    async fn transfer(
        &self,
        wallet_id: &str,
        recipient: &str,
        amount: MoneyAmount,
    ) -> Result<TransferReceipt, WalletError> {
        if !self.wallets.contains_key(wallet_id) {
            return Err(WalletError::NotFound(wallet_id.to_string()));
        }
        if let Some(delay) = self.transfer_delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject_transfers {
            return Err(WalletError::Rejected("insufficient balance".to_string()));
        }
        let call = self.transfer_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("tx-{call}");
        if self.fail_transfers {
            self.record(wallet_id, &id, None, TransactionState::Failed, recipient, amount);
            return Ok(TransferReceipt {
                transaction_id: id,
                tx_hash: None,
                state: TransactionState::Failed,
            });
        }
        let hash = format!("0xhash{call}");
        if self.defer_hashes {
            self.record(
                wallet_id,
                &id,
                Some(hash),
                TransactionState::Confirmed,
                recipient,
                amount,
            );
            return Ok(TransferReceipt {
                transaction_id: id,
                tx_hash: None,
                state: TransactionState::Sent,
            });
        }
        self.record(
            wallet_id,
            &id,
            Some(hash.clone()),
            TransactionState::Confirmed,
            recipient,
            amount,
        );
        Ok(TransferReceipt {
            transaction_id: id,
            tx_hash: Some(hash),
            state: TransactionState::Confirmed,
        })
    }

    async fn transfer_crosschain(
        &self,
        wallet_id: &str,
        destination: &CrosschainDestination,
        amount: MoneyAmount,
    ) -> Result<TransferReceipt, WalletError> {
        if !self.wallets.contains_key(wallet_id) {
            return Err(WalletError::NotFound(wallet_id.to_string()));
        }
        if let Some(delay) = self.transfer_delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject_transfers {
            return Err(WalletError::Rejected("insufficient balance".to_string()));
        }
        let call = self.crosschain_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("xtx-{call}");
        if self.fail_transfers {
            self.record(
                wallet_id,
                &id,
                None,
                TransactionState::Failed,
                &destination.address,
                amount,
            );
            return Ok(TransferReceipt {
                transaction_id: id,
                tx_hash: None,
                state: TransactionState::Failed,
            });
        }
        let hash = format!("0xbridge{call}");
        self.record(
            wallet_id,
            &id,
            Some(hash.clone()),
            TransactionState::Initiated,
            &destination.address,
            amount,
        );
        Ok(TransferReceipt {
            transaction_id: id,
            tx_hash: Some(hash),
            state: TransactionState::Initiated,
        })
    }
}

/// Wiremock matcher that passes only when the named header is absent.
/// Keeps paired mocks disjoint instead of relying on mount order.
pub(crate) struct WithoutHeader(pub &'static str);

impl wiremock::Match for WithoutHeader {
    fn matches(&self, request: &wiremock::Request) -> bool {
        !request.headers.contains_key(self.0)
    }
}
