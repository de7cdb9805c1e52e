use crate::orchestrator::GenerationOutcome;
use crate::requests::{GenerationRequest, RequestState};
use crate::types::{MilliCredits, OperationType, ProviderId, RequestId, Tier, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /api/v1/generate`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub user_id: UserId,
    /// Tier the caller is entitled to; asserted by the upstream gateway
    #[serde(default)]
    pub tier: Tier,
    pub operation_type: OperationType,
    pub model: String,
    /// Opaque provider payload, forwarded as-is
    #[serde(default)]
    pub payload: Value,
}

/// Body of a successful `POST /api/v1/generate`.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub request_id: RequestId,
    /// The provider's response body, untouched
    pub result: Value,
    pub provider_used: ProviderId,
    pub model_used: String,
    pub credits_remaining: MilliCredits,
}

impl From<GenerationOutcome> for GenerateResponse {
    fn from(outcome: GenerationOutcome) -> Self {
        Self {
            request_id: outcome.request_id,
            result: outcome.body,
            provider_used: outcome.provider,
            model_used: outcome.model,
            credits_remaining: outcome.credits_remaining,
        }
    }
}

/// Body of `GET /api/v1/requests/{request_id}`.
#[derive(Debug, Serialize)]
pub struct RequestStatusResponse {
    pub id: RequestId,
    pub user_id: UserId,
    pub operation_type: OperationType,
    pub requested_model: String,
    pub credit_cost: MilliCredits,
    pub state: RequestState,
    pub chosen_provider: Option<ProviderId>,
    pub actual_provider_cost: Option<MilliCredits>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<GenerationRequest> for RequestStatusResponse {
    fn from(request: GenerationRequest) -> Self {
        Self {
            id: request.id,
            user_id: request.user_id,
            operation_type: request.operation_type,
            requested_model: request.requested_model,
            credit_cost: request.credit_cost,
            state: request.state,
            chosen_provider: request.chosen_provider,
            actual_provider_cost: request.actual_provider_cost,
            created_at: request.created_at,
            completed_at: request.completed_at,
        }
    }
}
