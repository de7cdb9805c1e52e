use crate::breaker::ProviderHealth;
use crate::policy::AllowedModel;
use crate::types::Tier;
use serde::Serialize;
use std::collections::HashMap;

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub providers: Vec<ProviderHealth>,
    pub allowed_models_by_tier: HashMap<Tier, Vec<AllowedModel>>,
}
