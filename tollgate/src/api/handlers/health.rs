use crate::{AppState, api::models::health::HealthResponse, types::ProviderId};
use axum::{extract::State, response::Json};

/// Gateway health: breaker state per provider plus the model allowlist.
///
/// Always returns 200; a degraded provider shows up in the body, not in
/// the status code. Liveness probing belongs to `/healthz`.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let providers = state
        .orchestrator
        .router()
        .breakers()
        .snapshot(&[ProviderId::Google, ProviderId::OpenRouter]);

    Json(HealthResponse {
        status: "ok",
        providers,
        allowed_models_by_tier: state.policy.allowed_models_by_tier(),
    })
}
