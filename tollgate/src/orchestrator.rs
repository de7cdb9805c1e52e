//! The fallback orchestrator: the gateway's outer control loop.
//!
//! `handle` is the single entry point for a generation call. It runs
//! admission (policy check, then the one-and-only debit), routes across
//! providers, and finalizes the [`GenerationRequest`] record no matter what
//! happened. On total provider exhaustion it refunds the debit before the
//! caller ever sees the error, so a `503` always means "your balance is
//! already restored".
//!
//! The gateway never returns a partial success: either a provider returned
//! a usable result and the charge stands, or it did not and the charge is
//! refunded before the response is sent.
//!
//! Once a request is admitted it has been charged, so it must reach a
//! terminal state even if the HTTP client goes away. The post-admission
//! work therefore runs in a spawned task; dropping the `handle` future
//! cannot cancel the refund path.

use crate::errors::{Error, Result};
use crate::ledger::CreditLedger;
use crate::policy::ModelPolicy;
use crate::reconcile::MarginTracker;
use crate::requests::{GenerationRequest, RequestLog};
use crate::router::{ProviderRouter, RouteOutcome};
use crate::types::{MilliCredits, OperationType, ProviderId, RequestId, Tier, TransactionId, UserId, abbrev_uuid};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Result of admission: the request record exists and the debit committed.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub request_id: RequestId,
    pub transaction_id: TransactionId,
    pub cost: MilliCredits,
}

/// Successful gateway response, before serialization.
#[derive(Debug)]
pub struct GenerationOutcome {
    pub request_id: RequestId,
    pub body: Value,
    pub provider: ProviderId,
    pub model: String,
    pub credits_remaining: MilliCredits,
}

pub struct Orchestrator {
    ledger: Arc<CreditLedger>,
    policy: Arc<ModelPolicy>,
    router: ProviderRouter,
    requests: RequestLog,
    margins: Arc<MarginTracker>,
    request_deadline: Duration,
}

impl Orchestrator {
    pub fn new(
        ledger: Arc<CreditLedger>,
        policy: Arc<ModelPolicy>,
        router: ProviderRouter,
        margins: Arc<MarginTracker>,
        request_deadline: Duration,
    ) -> Self {
        Self {
            ledger,
            policy,
            router,
            requests: RequestLog::new(),
            margins,
            request_deadline,
        }
    }

    pub fn router(&self) -> &ProviderRouter {
        &self.router
    }

    pub fn requests(&self) -> &RequestLog {
        &self.requests
    }

    pub fn margins(&self) -> &Arc<MarginTracker> {
        &self.margins
    }

    /// Admit or reject a request before any provider is contacted.
    ///
    /// Policy first (a disallowed model never touches the ledger), then the
    /// debit. This is the single point where money changes hands: exactly
    /// once per request, at admission.
    pub async fn preflight(&self, user_id: UserId, tier: Tier, operation: OperationType, model: &str) -> Result<Admitted> {
        let cost = self.policy.cost_of(tier, operation, model)?;

        let request_id = Uuid::new_v4();
        let transaction = self
            .ledger
            .debit(user_id, cost, &format!("{operation} generation with {model}"), Some(request_id))
            .await?;

        self.ledger.note_tier(user_id, tier).await;
        self.requests
            .insert(GenerationRequest::new(request_id, user_id, operation, model, cost));

        tracing::info!(
            request = %abbrev_uuid(&request_id),
            user = %abbrev_uuid(&user_id),
            %tier,
            model,
            cost,
            "Request admitted"
        );

        Ok(Admitted {
            request_id,
            transaction_id: transaction.id,
            cost,
        })
    }

    /// Top-level entry point for one generation call.
    pub async fn handle(
        self: Arc<Self>,
        user_id: UserId,
        tier: Tier,
        operation: OperationType,
        model: &str,
        payload: Value,
    ) -> Result<GenerationOutcome> {
        let admitted = self.preflight(user_id, tier, operation, model).await?;

        // The request is charged; run it to a terminal state server-side
        // even if the caller disconnects.
        let model = model.to_string();
        let task = tokio::spawn(Arc::clone(&self).dispatch(admitted, user_id, tier, operation, model, payload));

        match task.await {
            Ok(result) => result,
            Err(e) => Err(Error::Other(anyhow::anyhow!("generation task panicked: {e}"))),
        }
    }

    async fn dispatch(
        self: Arc<Self>,
        admitted: Admitted,
        user_id: UserId,
        tier: Tier,
        operation: OperationType,
        model: String,
        payload: Value,
    ) -> Result<GenerationOutcome> {
        let request_id = admitted.request_id;
        self.requests.mark_dispatched(request_id)?;

        let deadline = Instant::now() + self.request_deadline;
        let candidates = self.policy.candidates_for(operation);
        let outcome = self.router.route(operation, &model, &payload, candidates, deadline).await;

        match outcome {
            RouteOutcome::Routed { response, provider } => {
                self.requests.mark_succeeded(request_id, provider)?;

                let remaining = self.ledger.balance(user_id).await.remaining_credits();
                tracing::info!(
                    request = %abbrev_uuid(&request_id),
                    provider = %provider,
                    model,
                    remaining,
                    "Generation succeeded"
                );

                // Reconciliation is out-of-band; it must never delay or fail
                // the response.
                let this = Arc::clone(&self);
                let actual_cost = response.actual_cost;
                let charged = admitted.cost;
                tokio::spawn(async move {
                    this.margins.record(&this.requests, request_id, tier, charged, actual_cost);
                });

                Ok(GenerationOutcome {
                    request_id,
                    body: response.body,
                    provider,
                    model,
                    credits_remaining: remaining,
                })
            }
            RouteOutcome::Exhausted => {
                self.requests.mark_failed(request_id)?;

                self.ledger
                    .refund(user_id, admitted.cost, request_id, "all providers unavailable")
                    .await?;
                self.requests.mark_refunded(request_id)?;

                tracing::warn!(
                    request = %abbrev_uuid(&request_id),
                    user = %abbrev_uuid(&user_id),
                    model,
                    refunded = admitted.cost,
                    "All providers exhausted, debit refunded"
                );

                Err(Error::AllProvidersUnavailable)
            }
        }
    }
}
