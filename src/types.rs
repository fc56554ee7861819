//! Core payment data model.
//!
//! The key objects are [`PaymentRequest`] and [`PaymentResult`], which encode
//! a payment order and its definite outcome, plus the route and status
//! vocabularies shared by the router, guards, and the control channel.
//! Everything here serializes with snake_case keys, decimals as strings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fmt::Display;
use url::Url;

use crate::amount::MoneyAmount;
use crate::network::Network;

/// The rail a payment settles on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// Direct wallet-to-wallet transfer on one chain.
    Transfer,
    /// HTTP 402 handshake against a paywalled resource.
    X402,
    /// Cross-chain transfer through a bridging service.
    Gateway,
}

impl Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Transfer => write!(f, "transfer"),
            Route::X402 => write!(f, "x402"),
            Route::Gateway => write!(f, "gateway"),
        }
    }
}

/// Lifecycle of a single payment execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Parked awaiting an explicit confirmation step.
    Pending,
    /// Accepted by the wallet service, not yet final on chain.
    Submitted,
    /// Final on chain or acknowledged by the paid resource.
    Confirmed,
    Failed,
}

impl PaymentStatus {
    /// Whether an entry in this status counts toward spend and rate tallies.
    /// Failed attempts and parked payments never do.
    pub fn counts_as_spend(&self) -> bool {
        matches!(self, PaymentStatus::Submitted | PaymentStatus::Confirmed)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Submitted => write!(f, "submitted"),
            PaymentStatus::Confirmed => write!(f, "confirmed"),
            PaymentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A single payment order. Immutable once constructed; the engine clones it
/// into intents and batch slots rather than mutating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub wallet_id: String,
    /// Chain address or, for the x402 rail, an `http(s)` URL.
    pub recipient: String,
    pub amount: MoneyAmount,
    pub network: Network,
    /// Optional protocol hint. The router honors it only when the named rail
    /// is actually applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Route>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl PaymentRequest {
    /// The recipient parsed as an `http(s)` URL, when it is one. Non-URL
    /// recipients are chain addresses.
    pub fn recipient_url(&self) -> Option<Url> {
        Url::parse(&self.recipient)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
    }

    /// Free-form purpose tag carried in metadata, recorded on the ledger.
    pub fn purpose(&self) -> Option<String> {
        self.metadata
            .get("purpose")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Definite outcome of one payment attempt.
///
/// `success` pairs with a transaction identifier and never with an error;
/// a failure always names its reason and never claims a completed
/// transaction. The one nuance is a payment that settled on-chain before a
/// later step failed: its `blockchain_tx` survives so the spend stays
/// traceable. Build through [`PaymentResult::succeeded`],
/// [`PaymentResult::failed`], or [`PaymentResult::requires_confirmation`]
/// to keep the pairing intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResult {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub blockchain_tx: Option<String>,
    pub amount: MoneyAmount,
    pub recipient: String,
    pub method: Option<Route>,
    pub status: PaymentStatus,
    pub error: Option<String>,
    #[serde(default)]
    pub guards_passed: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl PaymentResult {
    pub fn succeeded(
        amount: MoneyAmount,
        recipient: impl Into<String>,
        method: Route,
        status: PaymentStatus,
        transaction_id: impl Into<String>,
        blockchain_tx: Option<String>,
    ) -> Self {
        PaymentResult {
            success: true,
            transaction_id: Some(transaction_id.into()),
            blockchain_tx,
            amount,
            recipient: recipient.into(),
            method: Some(method),
            status,
            error: None,
            guards_passed: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn failed(
        amount: MoneyAmount,
        recipient: impl Into<String>,
        method: Option<Route>,
        error: impl Into<String>,
    ) -> Self {
        PaymentResult {
            success: false,
            transaction_id: None,
            blockchain_tx: None,
            amount,
            recipient: recipient.into(),
            method,
            status: PaymentStatus::Failed,
            error: Some(error.into()),
            guards_passed: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// A payment parked behind a confirmation guard: not successful, not
    /// failed, waiting on an explicit confirmation call against the intent
    /// named in `metadata.intent_id`.
    pub fn requires_confirmation(
        amount: MoneyAmount,
        recipient: impl Into<String>,
        reason: impl Into<String>,
        intent_id: impl Into<String>,
    ) -> Self {
        let mut metadata = Map::new();
        metadata.insert("intent_id".to_string(), Value::String(intent_id.into()));
        PaymentResult {
            success: false,
            transaction_id: None,
            blockchain_tx: None,
            amount,
            recipient: recipient.into(),
            method: None,
            status: PaymentStatus::Pending,
            error: Some(reason.into()),
            guards_passed: Vec::new(),
            metadata,
        }
    }

    pub fn with_guards(mut self, guards_passed: Vec<String>) -> Self {
        self.guards_passed = guards_passed;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Dry-run verdict for a payment, route and fee included when resolvable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulateResponse {
    pub would_succeed: bool,
    pub route: Option<Route>,
    /// First failing guard or routing problem, or the pending-confirmation
    /// notice. Absent when the payment would sail through.
    pub reason: Option<String>,
    pub estimated_fee: Option<MoneyAmount>,
}

/// Aggregate outcome of a batch submission. `results` matches input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<PaymentResult>,
}

impl BatchResult {
    pub fn from_results(results: Vec<PaymentResult>) -> Self {
        let succeeded = results.iter().filter(|result| result.success).count();
        BatchResult {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }
}

/// Where a cross-chain transfer lands: target chain, address, and token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrosschainDestination {
    pub network: Network,
    pub address: String,
    pub token: String,
}
