//! Model policy: the per-tier allowlist of (operation, model) pairs with
//! their milli-credit costs, and the ordered provider fallback table.
//!
//! This is a pure lookup structure built once from [`Config`](crate::config::Config)
//! at startup; it holds no mutable state. Absence of a pair from a tier's
//! table is a hard [`ModelNotAllowed`](crate::errors::Error::ModelNotAllowed)
//! rejection, never a fallback to a default price. That rule is what stops an
//! unexpectedly expensive model from being silently substituted into a
//! request.

use crate::config::{PolicyConfig, RoutingConfig};
use crate::errors::{Error, Result};
use crate::types::{MilliCredits, OperationType, ProviderId, Tier};
use std::collections::HashMap;

pub struct ModelPolicy {
    /// (tier, operation, model) -> cost in milli-credits
    prices: HashMap<(Tier, OperationType, String), MilliCredits>,
    /// operation -> ordered fallback candidates
    candidates: HashMap<OperationType, Vec<ProviderId>>,
}

impl ModelPolicy {
    pub fn new(policy: &PolicyConfig, routing: &RoutingConfig) -> Self {
        let mut prices = HashMap::new();
        for (tier, entries) in &policy.tiers {
            for entry in entries {
                prices.insert((*tier, entry.operation, entry.model.clone()), entry.cost);
            }
        }
        Self {
            prices,
            candidates: routing.candidates.clone(),
        }
    }

    /// Price of running `model` for `operation` on `tier`, in milli-credits.
    pub fn cost_of(&self, tier: Tier, operation: OperationType, model: &str) -> Result<MilliCredits> {
        self.prices
            .get(&(tier, operation, model.to_string()))
            .copied()
            .ok_or_else(|| Error::ModelNotAllowed {
                tier,
                operation,
                model: model.to_string(),
            })
    }

    /// Ordered provider fallback list for an operation type. The order here
    /// is the entire routing policy.
    pub fn candidates_for(&self, operation: OperationType) -> &[ProviderId] {
        self.candidates.get(&operation).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Allowed models per tier, for the health endpoint.
    pub fn allowed_models_by_tier(&self) -> HashMap<Tier, Vec<AllowedModel>> {
        let mut by_tier: HashMap<Tier, Vec<AllowedModel>> = HashMap::new();
        for ((tier, operation, model), cost) in &self.prices {
            by_tier.entry(*tier).or_default().push(AllowedModel {
                operation: *operation,
                model: model.clone(),
                cost: *cost,
            });
        }
        for models in by_tier.values_mut() {
            models.sort_by(|a, b| a.model.cmp(&b.model).then_with(|| a.operation.cmp(&b.operation)));
        }
        by_tier
    }
}

/// One allowlist entry as exposed on the health endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AllowedModel {
    pub operation: OperationType,
    pub model: String,
    pub cost: MilliCredits,
}
