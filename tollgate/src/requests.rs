//! Generation request records and their lifecycle state machine.
//!
//! One [`GenerationRequest`] exists per admitted gateway call. The record is
//! written only by the orchestrator; everything else reads snapshots. The
//! state machine is explicit data rather than nested callback logic, so the
//! transitions are testable on their own:
//!
//! ```text
//! Admitted -> Dispatched -> Succeeded            (terminal)
//!                        -> Failed -> Refunded   (terminal)
//! ```
//!
//! No other transition is valid; in particular, refunding a request that is
//! not in `Failed` is rejected. That rule is what makes "refund exactly once,
//! and only after real exhaustion" checkable.

use crate::errors::{Error, Result};
use crate::types::{MilliCredits, OperationType, ProviderId, RequestId, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Lifecycle state of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Admitted,
    Dispatched,
    Succeeded,
    Failed,
    Refunded,
}

impl RequestState {
    fn can_transition_to(self, next: RequestState) -> bool {
        matches!(
            (self, next),
            (RequestState::Admitted, RequestState::Dispatched)
                | (RequestState::Dispatched, RequestState::Succeeded)
                | (RequestState::Dispatched, RequestState::Failed)
                | (RequestState::Failed, RequestState::Refunded)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, RequestState::Succeeded | RequestState::Refunded)
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestState::Admitted => "admitted",
            RequestState::Dispatched => "dispatched",
            RequestState::Succeeded => "succeeded",
            RequestState::Failed => "failed",
            RequestState::Refunded => "refunded",
        };
        write!(f, "{s}")
    }
}

/// One admitted gateway call.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub id: RequestId,
    pub user_id: UserId,
    pub operation_type: OperationType,
    pub requested_model: String,
    /// Credits debited at admission, milli-credits
    pub credit_cost: MilliCredits,
    pub state: RequestState,
    pub chosen_provider: Option<ProviderId>,
    /// Upstream cost as reported by the provider, filled by reconciliation
    pub actual_provider_cost: Option<MilliCredits>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationRequest {
    pub fn new(id: RequestId, user_id: UserId, operation_type: OperationType, requested_model: &str, credit_cost: MilliCredits) -> Self {
        Self {
            id,
            user_id,
            operation_type,
            requested_model: requested_model.to_string(),
            credit_cost,
            state: RequestState::Admitted,
            chosen_provider: None,
            actual_provider_cost: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    fn transition(&mut self, next: RequestState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// In-memory store of generation request records, keyed by request ID.
/// Mutated only through the named transition methods below.
#[derive(Debug, Default)]
pub struct RequestLog {
    requests: DashMap<RequestId, GenerationRequest>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, request: GenerationRequest) {
        self.requests.insert(request.id, request);
    }

    pub fn get(&self, id: RequestId) -> Option<GenerationRequest> {
        self.requests.get(&id).map(|r| r.clone())
    }

    fn update<F>(&self, id: RequestId, f: F) -> Result<()>
    where
        F: FnOnce(&mut GenerationRequest) -> Result<()>,
    {
        let mut entry = self.requests.get_mut(&id).ok_or_else(|| Error::NotFound {
            resource: "GenerationRequest".to_string(),
            id: id.to_string(),
        })?;
        f(entry.value_mut())
    }

    pub fn mark_dispatched(&self, id: RequestId) -> Result<()> {
        self.update(id, |r| r.transition(RequestState::Dispatched))
    }

    pub fn mark_succeeded(&self, id: RequestId, provider: ProviderId) -> Result<()> {
        self.update(id, |r| {
            r.transition(RequestState::Succeeded)?;
            r.chosen_provider = Some(provider);
            Ok(())
        })
    }

    pub fn mark_failed(&self, id: RequestId) -> Result<()> {
        self.update(id, |r| r.transition(RequestState::Failed))
    }

    pub fn mark_refunded(&self, id: RequestId) -> Result<()> {
        self.update(id, |r| r.transition(RequestState::Refunded))
    }

    /// Reconciliation write: records the upstream cost without touching state.
    pub fn set_actual_cost(&self, id: RequestId, cost: MilliCredits) -> Result<()> {
        self.update(id, |r| {
            r.actual_provider_cost = Some(cost);
            Ok(())
        })
    }
}
