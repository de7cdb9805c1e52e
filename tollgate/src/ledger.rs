//! The credit ledger: per-user balances plus the append-only transaction log.
//!
//! This is the only component in the gateway allowed to mutate balances.
//! Every other component calls [`CreditLedger::debit`], [`CreditLedger::refund`]
//! or [`CreditLedger::grant`] and uses the returned [`Transaction`]; nothing
//! else read-modify-writes an account.
//!
//! ## Consistency model
//!
//! Mutations are linearizable per user: each account lives behind its own
//! `tokio::sync::Mutex` inside a `DashMap`, so two concurrent debits against
//! the same account serialize, while unrelated accounts proceed fully in
//! parallel. A debit's read-check-decrement-append happens entirely under the
//! account lock, so no partial write is ever observable and two debits whose
//! combined amount exceeds the balance can never both succeed.
//!
//! Amounts are integer milli-credits throughout, which keeps the core
//! invariant (`remaining == total - used`, and replaying the log reproduces
//! the balance exactly) checkable with exact arithmetic.

use crate::errors::{Error, Result};
use crate::types::{MilliCredits, RequestId, Tier, TransactionId, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Credits charged at admission of a generation request
    Debit,
    /// Credits returned after provider exhaustion
    Refund,
    /// Credits added by the external billing collaborator
    Grant,
}

/// Immutable ledger entry. Appended exactly once per successful ledger call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    /// Always positive; the kind determines the direction
    pub amount: MilliCredits,
    pub balance_before: MilliCredits,
    pub balance_after: MilliCredits,
    pub reason: String,
    /// For debits and refunds, the generation request this entry belongs to
    pub related_request_id: Option<RequestId>,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time snapshot of one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub total_credits: MilliCredits,
    pub used_credits: MilliCredits,
    pub tier: Tier,
}

impl Account {
    fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            total_credits: 0,
            used_credits: 0,
            tier: Tier::default(),
        }
    }

    /// Derived: `total - used`. Never negative while the debit precondition holds.
    pub fn remaining_credits(&self) -> MilliCredits {
        self.total_credits - self.used_credits
    }
}

/// Everything the ledger tracks for one account, guarded by one mutex.
#[derive(Debug)]
struct AccountState {
    account: Account,
    /// Append-only, oldest first
    transactions: Vec<Transaction>,
    /// Request IDs that already received their (single) refund
    refunded_requests: HashSet<RequestId>,
}

impl AccountState {
    fn new(user_id: UserId) -> Self {
        Self {
            account: Account::empty(user_id),
            transactions: Vec::new(),
            refunded_requests: HashSet::new(),
        }
    }

    fn append(
        &mut self,
        kind: TransactionKind,
        amount: MilliCredits,
        balance_before: MilliCredits,
        reason: &str,
        related_request_id: Option<RequestId>,
    ) -> Transaction {
        let tx = Transaction {
            id: Uuid::new_v4(),
            user_id: self.account.user_id,
            kind,
            amount,
            balance_before,
            balance_after: self.account.remaining_credits(),
            reason: reason.to_string(),
            related_request_id,
            created_at: Utc::now(),
        };
        self.transactions.push(tx.clone());
        tx
    }
}

/// The gateway's financial ledger. Cheap to clone via `Arc` at the callers.
#[derive(Debug, Default)]
pub struct CreditLedger {
    accounts: DashMap<UserId, Arc<Mutex<AccountState>>>,
}

impl CreditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or lazily create) the lock cell for one account. The `DashMap`
    /// guard is dropped before the caller awaits the mutex, so shard locks
    /// are never held across an await point.
    fn cell(&self, user_id: UserId) -> Arc<Mutex<AccountState>> {
        self.accounts
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(AccountState::new(user_id))))
            .value()
            .clone()
    }

    /// Atomically charge `amount` milli-credits against the account.
    ///
    /// Fails with [`Error::InsufficientCredits`] when the remaining balance
    /// cannot cover the amount, in which case nothing was written.
    pub async fn debit(
        &self,
        user_id: UserId,
        amount: MilliCredits,
        reason: &str,
        related_request_id: Option<RequestId>,
    ) -> Result<Transaction> {
        require_positive(amount)?;
        let cell = self.cell(user_id);
        let mut state = cell.lock().await;

        let before = state.account.remaining_credits();
        if before < amount {
            return Err(Error::InsufficientCredits {
                required: amount,
                available: before,
            });
        }

        state.account.used_credits += amount;
        Ok(state.append(TransactionKind::Debit, amount, before, reason, related_request_id))
    }

    /// Atomically return a previous debit.
    ///
    /// At most one refund may reference a given `related_request_id`; a
    /// second attempt fails with [`Error::AlreadyRefunded`] and changes
    /// nothing.
    pub async fn refund(&self, user_id: UserId, amount: MilliCredits, related_request_id: RequestId, reason: &str) -> Result<Transaction> {
        require_positive(amount)?;
        let cell = self.cell(user_id);
        let mut state = cell.lock().await;

        if state.refunded_requests.contains(&related_request_id) {
            return Err(Error::AlreadyRefunded {
                request_id: related_request_id,
            });
        }
        if state.account.used_credits < amount {
            // A refund must mirror a prior debit; refunding more than was
            // ever used would push remaining above total.
            return Err(Error::BadRequest {
                message: format!(
                    "Refund of {amount} exceeds used credits {} for user {user_id}",
                    state.account.used_credits
                ),
            });
        }

        let before = state.account.remaining_credits();
        state.account.used_credits -= amount;
        state.refunded_requests.insert(related_request_id);
        Ok(state.append(TransactionKind::Refund, amount, before, reason, Some(related_request_id)))
    }

    /// Add credits to the account. Called only via the external billing
    /// grant endpoint; idempotency of that call is the billing system's
    /// responsibility.
    pub async fn grant(&self, user_id: UserId, amount: MilliCredits, reason: &str) -> Result<Transaction> {
        require_positive(amount)?;
        let cell = self.cell(user_id);
        let mut state = cell.lock().await;

        let before = state.account.remaining_credits();
        state.account.total_credits += amount;
        Ok(state.append(TransactionKind::Grant, amount, before, reason, None))
    }

    /// Read-only balance snapshot. Users without any ledger history get a
    /// zeroed account; nothing is inserted.
    pub async fn balance(&self, user_id: UserId) -> Account {
        match self.accounts.get(&user_id) {
            Some(cell) => {
                let cell = cell.value().clone();
                let state = cell.lock().await;
                state.account.clone()
            }
            None => Account::empty(user_id),
        }
    }

    /// Record the tier last seen for this account (informational; policy
    /// enforcement always uses the tier on the incoming request).
    pub async fn note_tier(&self, user_id: UserId, tier: Tier) {
        let cell = self.cell(user_id);
        let mut state = cell.lock().await;
        state.account.tier = tier;
    }

    /// Transaction history, newest first, with skip/limit pagination.
    pub async fn transactions(&self, user_id: UserId, skip: usize, limit: usize) -> Vec<Transaction> {
        match self.accounts.get(&user_id) {
            Some(cell) => {
                let cell = cell.value().clone();
                let state = cell.lock().await;
                state.transactions.iter().rev().skip(skip).take(limit).cloned().collect()
            }
            None => Vec::new(),
        }
    }
}

fn require_positive(amount: MilliCredits) -> Result<()> {
    if amount <= 0 {
        return Err(Error::BadRequest {
            message: format!("Amount must be greater than zero, got {amount}"),
        });
    }
    Ok(())
}
