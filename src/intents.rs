//! Payment intents, the confirm-before-pay holding area.
//!
//! An intent freezes a payment request until someone explicitly confirms or
//! cancels it. Confirmation replays the frozen request through the engine
//! with the confirm guard satisfied. Each record sits behind its own async
//! mutex, so a cancel that races a confirm waits for the confirm to finish
//! and then sees a terminal status instead of half-done state.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::amount::MoneyAmount;
use crate::timestamp::UnixTimestamp;
use crate::types::{PaymentRequest, PaymentResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Created,
    Pending,
    Confirmed,
    Cancelled,
    Failed,
}

impl IntentStatus {
    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IntentStatus::Confirmed | IntentStatus::Cancelled | IntentStatus::Failed
        )
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntentStatus::Created => "created",
            IntentStatus::Pending => "pending",
            IntentStatus::Confirmed => "confirmed",
            IntentStatus::Cancelled => "cancelled",
            IntentStatus::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub wallet_id: String,
    pub recipient: String,
    pub amount: MoneyAmount,
    pub status: IntentStatus,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: UnixTimestamp,
    pub updated_at: UnixTimestamp,
}

#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("unknown intent: {0}")]
    NotFound(String),
    #[error("intent {id} is {status} and cannot be confirmed")]
    NotConfirmable { id: String, status: IntentStatus },
    #[error("intent {id} is {status} and cannot be cancelled")]
    NotCancellable { id: String, status: IntentStatus },
}

/// Intent plus the frozen request it replays on confirmation, and the
/// result once one exists.
#[derive(Debug)]
pub(crate) struct IntentRecord {
    pub(crate) intent: PaymentIntent,
    pub(crate) request: PaymentRequest,
    pub(crate) result: Option<PaymentResult>,
}

impl IntentRecord {
    pub(crate) fn set_status(&mut self, status: IntentStatus) {
        self.intent.status = status;
        self.intent.updated_at = UnixTimestamp::now();
    }
}

#[derive(Debug, Default)]
pub struct IntentStore {
    records: DashMap<String, Arc<Mutex<IntentRecord>>>,
}

impl IntentStore {
    pub fn new() -> Self {
        IntentStore::default()
    }

    pub fn create(&self, request: PaymentRequest, status: IntentStatus) -> PaymentIntent {
        let now = UnixTimestamp::now();
        let intent = PaymentIntent {
            id: format!("intent-{}", Uuid::now_v7()),
            wallet_id: request.wallet_id.clone(),
            recipient: request.recipient.clone(),
            amount: request.amount,
            status,
            metadata: request.metadata.clone(),
            created_at: now,
            updated_at: now,
        };
        self.records.insert(
            intent.id.clone(),
            Arc::new(Mutex::new(IntentRecord {
                intent: intent.clone(),
                request,
                result: None,
            })),
        );
        intent
    }

    pub async fn get(&self, intent_id: &str) -> Result<PaymentIntent, IntentError> {
        let record = self.entry(intent_id)?;
        let record = record.lock().await;
        Ok(record.intent.clone())
    }

    pub(crate) fn entry(&self, intent_id: &str) -> Result<Arc<Mutex<IntentRecord>>, IntentError> {
        self.records
            .get(intent_id)
            .map(|record| record.clone())
            .ok_or_else(|| IntentError::NotFound(intent_id.to_string()))
    }
}
