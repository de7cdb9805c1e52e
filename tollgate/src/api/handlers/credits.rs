use crate::{
    AppState,
    api::models::credits::{CreditTransactionResponse, GrantCreditsRequest, ListTransactionsQuery, UserBalanceResponse},
    errors::Result,
    types::UserId,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

/// Get a user's credit balance.
///
/// Users with no ledger history get a zeroed balance rather than a 404;
/// an account exists from the ledger's point of view as soon as anyone
/// asks about it.
pub async fn get_balance(State(state): State<AppState>, Path(user_id): Path<UserId>) -> Result<Json<UserBalanceResponse>> {
    let account = state.ledger.balance(user_id).await;
    Ok(Json(UserBalanceResponse::from(account)))
}

/// List a user's credit transactions, newest first.
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<Vec<CreditTransactionResponse>>> {
    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);

    let transactions = state.ledger.transactions(user_id, skip, limit).await;
    Ok(Json(transactions.into_iter().map(CreditTransactionResponse::from).collect()))
}

/// Add credits to a user's account.
///
/// The sole external write path into `total_credits`; called by the
/// billing system after a purchase. Idempotency of the purchase itself is
/// the billing system's responsibility.
pub async fn grant_credits(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(data): Json<GrantCreditsRequest>,
) -> Result<(StatusCode, Json<CreditTransactionResponse>)> {
    let reason = data.reason.as_deref().unwrap_or("credit grant");
    let transaction = state.ledger.grant(user_id, data.amount, reason).await?;

    Ok((StatusCode::CREATED, Json(CreditTransactionResponse::from(transaction))))
}
