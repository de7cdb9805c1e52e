//! Cost reconciliation: best-effort margin accounting after a request
//! succeeds.
//!
//! The orchestrator spawns [`MarginTracker::record`] fire-and-forget; it
//! stores the upstream-reported cost on the request record and accumulates
//! per-tier totals of credits charged versus actual provider cost. Nothing
//! here can affect the request path or the ledger: a reconciliation failure
//! is logged and dropped.

use crate::requests::RequestLog;
use crate::types::{MilliCredits, RequestId, Tier};
use dashmap::DashMap;
use serde::Serialize;

/// Running totals for one tier, milli-credits.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TierMargin {
    /// Requests that completed successfully
    pub requests: u64,
    /// Credits debited from user accounts
    pub credits_charged_total: MilliCredits,
    /// Upstream cost, summed over requests where the provider reported one
    pub actual_cost_total: MilliCredits,
    /// Requests whose provider reported no cost
    pub unreported: u64,
}

/// Per-tier aggregate of charged credits vs. actual upstream cost.
#[derive(Debug, Default)]
pub struct MarginTracker {
    totals: DashMap<Tier, TierMargin>,
}

impl MarginTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful request. Never fails the caller: problems are
    /// logged at warn and swallowed.
    pub fn record(&self, requests: &RequestLog, request_id: RequestId, tier: Tier, charged: MilliCredits, actual: Option<MilliCredits>) {
        if let Some(actual) = actual
            && let Err(e) = requests.set_actual_cost(request_id, actual)
        {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to record actual provider cost");
        }

        let mut totals = self.totals.entry(tier).or_default();
        totals.requests += 1;
        totals.credits_charged_total += charged;
        match actual {
            Some(actual) => totals.actual_cost_total += actual,
            None => totals.unreported += 1,
        }

        tracing::debug!(
            request_id = %request_id,
            tier = %tier,
            charged,
            actual = ?actual,
            "Reconciled request cost"
        );
    }

    /// Snapshot of the totals for one tier.
    pub fn margin_for(&self, tier: Tier) -> TierMargin {
        self.totals.get(&tier).map(|t| *t).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::GenerationRequest;
    use crate::types::OperationType;
    use uuid::Uuid;

    #[test]
    fn test_accumulates_per_tier() {
        let tracker = MarginTracker::new();
        let requests = RequestLog::new();

        tracker.record(&requests, Uuid::new_v4(), Tier::Free, 1000, Some(400));
        tracker.record(&requests, Uuid::new_v4(), Tier::Free, 2000, Some(900));
        tracker.record(&requests, Uuid::new_v4(), Tier::Premium, 4000, None);

        let free = tracker.margin_for(Tier::Free);
        assert_eq!(free.requests, 2);
        assert_eq!(free.credits_charged_total, 3000);
        assert_eq!(free.actual_cost_total, 1300);
        assert_eq!(free.unreported, 0);

        let premium = tracker.margin_for(Tier::Premium);
        assert_eq!(premium.requests, 1);
        assert_eq!(premium.unreported, 1);
    }

    #[test]
    fn test_writes_actual_cost_onto_request() {
        let tracker = MarginTracker::new();
        let requests = RequestLog::new();
        let id = Uuid::new_v4();
        requests.insert(GenerationRequest::new(id, Uuid::new_v4(), OperationType::Text, "gemini-2.5-flash", 1000));

        tracker.record(&requests, id, Tier::Free, 1000, Some(650));
        assert_eq!(requests.get(id).unwrap().actual_provider_cost, Some(650));
    }

    #[test]
    fn test_missing_request_is_swallowed() {
        let tracker = MarginTracker::new();
        let requests = RequestLog::new();
        // Request was never inserted; record must not panic or fail
        tracker.record(&requests, Uuid::new_v4(), Tier::Free, 1000, Some(100));
        assert_eq!(tracker.margin_for(Tier::Free).requests, 1);
    }
}
