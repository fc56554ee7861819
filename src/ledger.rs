//! Payment ledger.
//!
//! Every executed payment lands here, and externally observed settlement
//! events merge in through [`Ledger::sync`]. Guard counters are derived
//! views over this history: an entry counts toward spend and rate tallies
//! once its status is submitted or confirmed, never while pending or after
//! failure. The store is in-memory and scan-based, sized for one sidecar
//! process.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::amount::MoneyAmount;
use crate::timestamp::UnixTimestamp;
use crate::types::{PaymentResult, PaymentStatus};

/// Durable record of a completed or attempted payment, independent of any
/// intent lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub wallet_id: String,
    pub recipient: String,
    pub amount: MoneyAmount,
    pub status: PaymentStatus,
    pub tx_hash: Option<String>,
    pub purpose: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: UnixTimestamp,
    pub updated_at: UnixTimestamp,
}

/// Fields accepted from an external settlement observation. An entry is
/// matched through its on-chain hash or, for entries recorded before the
/// chain assigned one, through the provider transaction id kept in
/// metadata. A hash is only ever written from `tx_hash`; transaction ids
/// never masquerade as hashes.
#[derive(Debug, Clone, Default)]
pub struct SyncUpdate {
    pub wallet_id: String,
    pub transaction_id: Option<String>,
    pub tx_hash: Option<String>,
    pub status: Option<PaymentStatus>,
    pub recipient: Option<String>,
    pub amount: Option<MoneyAmount>,
    pub purpose: Option<String>,
}

#[derive(Debug, Default)]
pub struct Ledger {
    entries: DashMap<String, LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger::default()
    }

    /// Records the outcome of an adapter execution.
    pub fn record_payment(
        &self,
        wallet_id: &str,
        result: &PaymentResult,
        purpose: Option<String>,
    ) -> LedgerEntry {
        let now = UnixTimestamp::now();
        let mut metadata = result.metadata.clone();
        if let Some(transaction_id) = &result.transaction_id {
            metadata.insert(
                "transaction_id".to_string(),
                Value::String(transaction_id.clone()),
            );
        }
        let entry = LedgerEntry {
            id: format!("ledger-{}", Uuid::now_v7()),
            wallet_id: wallet_id.to_string(),
            recipient: result.recipient.clone(),
            amount: result.amount,
            status: result.status,
            tx_hash: result.blockchain_tx.clone(),
            purpose,
            metadata,
            created_at: now,
            updated_at: now,
        };
        self.insert(entry.clone());
        entry
    }

    pub fn insert(&self, entry: LedgerEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    pub fn get(&self, entry_id: &str) -> Option<LedgerEntry> {
        self.entries.get(entry_id).map(|entry| entry.clone())
    }

    /// Entries for one wallet, oldest first.
    pub fn entries_for(&self, wallet_id: &str) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.wallet_id == wallet_id)
            .map(|entry| entry.clone())
            .collect();
        entries.sort_by_key(|entry| entry.created_at);
        entries
    }

    /// Sum of spend-counting amounts recorded at or after `cutoff`.
    pub fn spent_since(&self, wallet_id: &str, cutoff: UnixTimestamp) -> MoneyAmount {
        self.entries
            .iter()
            .filter(|entry| {
                entry.wallet_id == wallet_id
                    && entry.status.counts_as_spend()
                    && entry.created_at >= cutoff
            })
            .fold(MoneyAmount::ZERO, |total, entry| {
                total.saturating_add(entry.amount)
            })
    }

    /// Number of spend-counting payments recorded at or after `cutoff`.
    pub fn payments_since(&self, wallet_id: &str, cutoff: UnixTimestamp) -> usize {
        self.entries
            .iter()
            .filter(|entry| {
                entry.wallet_id == wallet_id
                    && entry.status.counts_as_spend()
                    && entry.created_at >= cutoff
            })
            .count()
    }

    /// All-time spend-counting total for a wallet.
    pub fn total_spent(&self, wallet_id: &str) -> MoneyAmount {
        self.spent_since(wallet_id, UnixTimestamp::from_secs(0))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reconciles an externally observed transaction. Matching is by wallet
    /// plus hash, falling back to the provider transaction id recorded in
    /// entry metadata: a match updates status, purpose, and the updated
    /// timestamp in place (filling in a hash the entry was still missing),
    /// while no match becomes a fresh entry carrying exactly what the
    /// observation reported.
    pub fn sync(&self, update: SyncUpdate) -> LedgerEntry {
        let existing = self.entries.iter().find_map(|entry| {
            if entry.wallet_id != update.wallet_id {
                return None;
            }
            let matches_hash =
                entry.tx_hash.is_some() && entry.tx_hash.as_deref() == update.tx_hash.as_deref();
            let matches_id = update.transaction_id.is_some()
                && entry.metadata.get("transaction_id").and_then(Value::as_str)
                    == update.transaction_id.as_deref();
            if matches_hash || matches_id {
                Some(entry.id.clone())
            } else {
                None
            }
        });

        if let Some(entry_id) = existing {
            if let Some(mut entry) = self.entries.get_mut(&entry_id) {
                if entry.tx_hash.is_none() {
                    entry.tx_hash = update.tx_hash.clone();
                }
                if let Some(status) = update.status {
                    entry.status = status;
                }
                if let Some(purpose) = update.purpose {
                    entry.purpose = Some(purpose);
                }
                entry.updated_at = UnixTimestamp::now();
                return entry.clone();
            }
        }

        let now = UnixTimestamp::now();
        let mut metadata = Map::new();
        if let Some(transaction_id) = &update.transaction_id {
            metadata.insert(
                "transaction_id".to_string(),
                Value::String(transaction_id.clone()),
            );
        }
        let entry = LedgerEntry {
            id: format!("ledger-{}", Uuid::now_v7()),
            wallet_id: update.wallet_id,
            recipient: update.recipient.unwrap_or_default(),
            amount: update.amount.unwrap_or(MoneyAmount::ZERO),
            status: update.status.unwrap_or(PaymentStatus::Confirmed),
            tx_hash: update.tx_hash,
            purpose: update.purpose,
            metadata,
            created_at: now,
            updated_at: now,
        };
        self.insert(entry.clone());
        entry
    }
}
