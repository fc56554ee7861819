//! Spending policy guards.
//!
//! Guards vet every outgoing payment before an adapter runs. The set is
//! closed and the evaluation order is fixed: recipient filter, then
//! per-transaction bounds, then rate limit, then budget, then the
//! confirmation threshold. Evaluation is fail-fast; the first rejection
//! names the guard and the reason, and later guards are never consulted.
//! Checks read already-recorded ledger history and never write anything.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::amount::MoneyAmount;
use crate::ledger::Ledger;
use crate::timestamp::UnixTimestamp;
use crate::types::PaymentRequest;

pub const SECONDS_PER_HOUR: u64 = 3_600;
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Guard kinds in evaluation order. The derived `Ord` is the chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    Recipient,
    SingleTx,
    RateLimit,
    Budget,
    Confirm,
}

/// Caps cumulative spend per wallet over rolling windows. Any combination
/// of limits may be set; each is enforced independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetGuard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<MoneyAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_limit: Option<MoneyAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_limit: Option<MoneyAmount>,
}

impl BudgetGuard {
    fn check(&self, request: &PaymentRequest, ledger: &Ledger) -> Result<(), String> {
        let now = UnixTimestamp::now();
        if let Some(limit) = self.daily_limit {
            let cutoff = now.saturating_sub(SECONDS_PER_DAY);
            let spent = ledger.spent_since(&request.wallet_id, cutoff);
            if spent.saturating_add(request.amount) > limit {
                return Err(format!(
                    "daily budget exceeded: {spent} already spent, {} requested, limit {limit}",
                    request.amount
                ));
            }
        }
        if let Some(limit) = self.hourly_limit {
            let cutoff = now.saturating_sub(SECONDS_PER_HOUR);
            let spent = ledger.spent_since(&request.wallet_id, cutoff);
            if spent.saturating_add(request.amount) > limit {
                return Err(format!(
                    "hourly budget exceeded: {spent} already spent, {} requested, limit {limit}",
                    request.amount
                ));
            }
        }
        if let Some(limit) = self.total_limit {
            let spent = ledger.total_spent(&request.wallet_id);
            if spent.saturating_add(request.amount) > limit {
                return Err(format!(
                    "total budget exhausted: {spent} already spent, {} requested, limit {limit}",
                    request.amount
                ));
            }
        }
        Ok(())
    }
}

/// Caps how many payments a wallet may make per rolling window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitGuard {
    pub max_payments: u32,
    pub window_secs: u64,
}

impl RateLimitGuard {
    fn check(&self, request: &PaymentRequest, ledger: &Ledger) -> Result<(), String> {
        let cutoff = UnixTimestamp::now().saturating_sub(self.window_secs);
        let count = ledger.payments_since(&request.wallet_id, cutoff);
        if count >= self.max_payments as usize {
            return Err(format!(
                "rate limit exceeded: {count} payments in the last {}s, limit {}",
                self.window_secs, self.max_payments
            ));
        }
        Ok(())
    }
}

/// Bounds a single payment to `[min_amount, max_amount]`, inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleTxGuard {
    pub max_amount: MoneyAmount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<MoneyAmount>,
}

impl SingleTxGuard {
    fn check(&self, request: &PaymentRequest) -> Result<(), String> {
        if request.amount > self.max_amount {
            return Err(format!(
                "amount {} exceeds per-transaction maximum {}",
                request.amount, self.max_amount
            ));
        }
        if let Some(min_amount) = self.min_amount {
            if request.amount < min_amount {
                return Err(format!(
                    "amount {} is below per-transaction minimum {min_amount}",
                    request.amount
                ));
            }
        }
        Ok(())
    }
}

/// Filters recipients. The deny-list always wins; a non-empty allow-list
/// additionally requires membership.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipientGuard {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub denied: Vec<String>,
}

impl RecipientGuard {
    fn check(&self, request: &PaymentRequest) -> Result<(), String> {
        let recipient = request.recipient.as_str();
        if self.denied.iter().any(|denied| denied == recipient) {
            return Err(format!("recipient {recipient} is deny-listed"));
        }
        if !self.allowed.is_empty() && !self.allowed.iter().any(|allowed| allowed == recipient) {
            return Err(format!("recipient {recipient} is not on the allow-list"));
        }
        Ok(())
    }
}

/// Flags payments strictly above `threshold` as requiring an explicit
/// confirmation step. Never rejects on its own: an unconfirmed payment is
/// parked as a pending intent, not failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmGuard {
    pub threshold: MoneyAmount,
}

impl ConfirmGuard {
    fn requires_confirmation(&self, amount: MoneyAmount) -> bool {
        amount > self.threshold
    }
}

/// One attached guard. Serialized with a `kind` tag alongside the guard's
/// own fields, e.g. `{"kind":"budget","daily_limit":"100"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Guard {
    Budget(BudgetGuard),
    RateLimit(RateLimitGuard),
    SingleTx(SingleTxGuard),
    Recipient(RecipientGuard),
    Confirm(ConfirmGuard),
}

impl Guard {
    pub fn kind(&self) -> GuardKind {
        match self {
            Guard::Budget(_) => GuardKind::Budget,
            Guard::RateLimit(_) => GuardKind::RateLimit,
            Guard::SingleTx(_) => GuardKind::SingleTx,
            Guard::Recipient(_) => GuardKind::Recipient,
            Guard::Confirm(_) => GuardKind::Confirm,
        }
    }

    /// Stable name used in `guards_passed` lists and rejection reasons.
    pub fn name(&self) -> &'static str {
        match self {
            Guard::Budget(_) => "budget",
            Guard::RateLimit(_) => "rate_limit",
            Guard::SingleTx(_) => "single_tx",
            Guard::Recipient(_) => "recipient",
            Guard::Confirm(_) => "confirm",
        }
    }
}

/// Where a guard attaches: one wallet, or every wallet in a set. Set guards
/// share configuration but count usage per member wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GuardScope {
    Wallet(String),
    WalletSet(String),
}

/// Outcome of running a wallet's guard chain against one request.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardVerdict {
    Approved {
        guards_passed: Vec<String>,
    },
    /// A confirm guard wants explicit approval before the money moves.
    ConfirmationRequired {
        guards_passed: Vec<String>,
        threshold: MoneyAmount,
    },
    Rejected {
        guard: &'static str,
        reason: String,
        guards_passed: Vec<String>,
    },
}

enum GuardCheck {
    Pass,
    NeedsConfirmation { threshold: MoneyAmount },
    Fail(String),
}

fn check_guard(
    guard: &Guard,
    request: &PaymentRequest,
    ledger: &Ledger,
    confirmation_provided: bool,
) -> GuardCheck {
    let outcome = match guard {
        Guard::Recipient(recipient) => recipient.check(request),
        Guard::SingleTx(single_tx) => single_tx.check(request),
        Guard::RateLimit(rate_limit) => rate_limit.check(request, ledger),
        Guard::Budget(budget) => budget.check(request, ledger),
        Guard::Confirm(confirm) => {
            if !confirmation_provided && confirm.requires_confirmation(request.amount) {
                return GuardCheck::NeedsConfirmation {
                    threshold: confirm.threshold,
                };
            }
            Ok(())
        }
    };
    match outcome {
        Ok(()) => GuardCheck::Pass,
        Err(reason) => GuardCheck::Fail(reason),
    }
}

/// Guard attachments, keyed by scope.
#[derive(Debug, Default)]
pub struct GuardRegistry {
    by_scope: DashMap<GuardScope, Vec<Guard>>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        GuardRegistry::default()
    }

    pub fn attach(&self, scope: GuardScope, guard: Guard) {
        self.by_scope.entry(scope).or_default().push(guard);
    }

    pub fn guards_for_scope(&self, scope: &GuardScope) -> Vec<Guard> {
        self.by_scope
            .get(scope)
            .map(|guards| guards.clone())
            .unwrap_or_default()
    }

    /// Effective chain for a wallet: its own guards plus its set's, sorted
    /// into the fixed evaluation order. The sort is stable, so attachment
    /// order breaks ties within one kind.
    pub fn chain_for(&self, wallet_id: &str, wallet_set_id: Option<&str>) -> Vec<Guard> {
        let mut chain = self.guards_for_scope(&GuardScope::Wallet(wallet_id.to_string()));
        if let Some(wallet_set_id) = wallet_set_id {
            chain.extend(self.guards_for_scope(&GuardScope::WalletSet(wallet_set_id.to_string())));
        }
        chain.sort_by_key(Guard::kind);
        chain
    }

    /// Runs the chain. `confirmation_provided` marks an explicitly confirmed
    /// payment, which satisfies any confirm guard.
    pub fn evaluate(
        &self,
        wallet_id: &str,
        wallet_set_id: Option<&str>,
        request: &PaymentRequest,
        ledger: &Ledger,
        confirmation_provided: bool,
    ) -> GuardVerdict {
        let chain = self.chain_for(wallet_id, wallet_set_id);
        let mut guards_passed = Vec::with_capacity(chain.len());
        for guard in &chain {
            match check_guard(guard, request, ledger, confirmation_provided) {
                GuardCheck::Pass => guards_passed.push(guard.name().to_string()),
                GuardCheck::NeedsConfirmation { threshold } => {
                    return GuardVerdict::ConfirmationRequired {
                        guards_passed,
                        threshold,
                    };
                }
                GuardCheck::Fail(reason) => {
                    return GuardVerdict::Rejected {
                        guard: guard.name(),
                        reason,
                        guards_passed,
                    };
                }
            }
        }
        GuardVerdict::Approved { guards_passed }
    }
}
