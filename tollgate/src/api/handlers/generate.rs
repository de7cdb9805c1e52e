use crate::{
    AppState,
    api::models::generate::{GenerateRequest, GenerateResponse, RequestStatusResponse},
    errors::{Error, Result},
    types::RequestId,
};
use axum::{
    extract::{Path, State},
    response::Json,
};

/// Run one gated generation call.
///
/// Admission (policy check, debit) happens before any provider is
/// contacted; the error responses map directly onto admission outcomes:
/// 402 insufficient credits, 403 model not allowed, 503 every provider
/// failed (in which case the debit was already refunded).
pub async fn generate(State(state): State<AppState>, Json(data): Json<GenerateRequest>) -> Result<Json<GenerateResponse>> {
    let outcome = state
        .orchestrator
        .clone()
        .handle(data.user_id, data.tier, data.operation_type, &data.model, data.payload)
        .await?;

    Ok(Json(GenerateResponse::from(outcome)))
}

/// Inspect one generation request record.
pub async fn get_request(State(state): State<AppState>, Path(request_id): Path<RequestId>) -> Result<Json<RequestStatusResponse>> {
    let request = state.orchestrator.requests().get(request_id).ok_or_else(|| Error::NotFound {
        resource: "GenerationRequest".to_string(),
        id: request_id.to_string(),
    })?;

    Ok(Json(RequestStatusResponse::from(request)))
}
