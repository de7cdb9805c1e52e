use crate::ledger::{Account, Transaction, TransactionKind};
use crate::types::{MilliCredits, RequestId, Tier, TransactionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `GET /api/v1/credits/{user_id}`.
#[derive(Debug, Serialize)]
pub struct UserBalanceResponse {
    pub user_id: UserId,
    pub tier: Tier,
    pub total_credits: MilliCredits,
    pub used_credits: MilliCredits,
    pub remaining_credits: MilliCredits,
}

impl From<Account> for UserBalanceResponse {
    fn from(account: Account) -> Self {
        Self {
            user_id: account.user_id,
            tier: account.tier,
            remaining_credits: account.remaining_credits(),
            total_credits: account.total_credits,
            used_credits: account.used_credits,
        }
    }
}

/// One ledger entry as returned by the transactions listing.
#[derive(Debug, Serialize)]
pub struct CreditTransactionResponse {
    pub id: TransactionId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: MilliCredits,
    pub balance_before: MilliCredits,
    pub balance_after: MilliCredits,
    pub reason: String,
    pub related_request_id: Option<RequestId>,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for CreditTransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            user_id: tx.user_id,
            kind: tx.kind,
            amount: tx.amount,
            balance_before: tx.balance_before,
            balance_after: tx.balance_after,
            reason: tx.reason,
            related_request_id: tx.related_request_id,
            created_at: tx.created_at,
        }
    }
}

/// Query parameters for the transactions listing.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

/// Body of `POST /api/v1/credits/{user_id}/grant`.
#[derive(Debug, Deserialize)]
pub struct GrantCreditsRequest {
    /// Milli-credits to add; must be positive
    pub amount: MilliCredits,
    pub reason: Option<String>,
}
