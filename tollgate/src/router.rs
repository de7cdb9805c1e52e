//! Provider routing with sequential fallback.
//!
//! Given an admitted request and the policy's ordered candidate list, the
//! router tries one provider at a time: skip candidates whose breaker is
//! unavailable, bound each call with the per-call timeout, report every
//! outcome back to the breaker registry, and stop at the first success.
//! Fallback is strictly sequential, never parallel, so the upstream is
//! never double-charged and two conflicting successes cannot occur.
//!
//! A route-wide deadline caps the whole loop; once it passes, remaining
//! candidates are not attempted and the route is exhausted (which the
//! orchestrator turns into a refund, same as ordinary exhaustion).

use crate::breaker::CircuitBreakerRegistry;
use crate::providers::{Provider, ProviderResponse};
use crate::types::{OperationType, ProviderId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Result of routing one request across the candidate list.
#[derive(Debug)]
pub enum RouteOutcome {
    /// A provider produced a usable result
    Routed {
        response: ProviderResponse,
        provider: ProviderId,
    },
    /// Every candidate was skipped, failed, or timed out
    Exhausted,
}

pub struct ProviderRouter {
    providers: HashMap<ProviderId, Arc<dyn Provider>>,
    breakers: Arc<CircuitBreakerRegistry>,
    per_call_timeout: Duration,
}

impl ProviderRouter {
    pub fn new(providers: HashMap<ProviderId, Arc<dyn Provider>>, breakers: Arc<CircuitBreakerRegistry>, per_call_timeout: Duration) -> Self {
        Self {
            providers,
            breakers,
            per_call_timeout,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Try each candidate in order until one succeeds or the deadline passes.
    pub async fn route(
        &self,
        operation: OperationType,
        model: &str,
        payload: &Value,
        candidates: &[ProviderId],
        deadline: Instant,
    ) -> RouteOutcome {
        for &candidate in candidates {
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(model, "Request deadline exceeded before trying all candidates");
                break;
            }

            let Some(provider) = self.providers.get(&candidate) else {
                tracing::error!(provider = %candidate, "Candidate has no configured provider client");
                continue;
            };

            if !self.breakers.is_available(candidate) {
                tracing::debug!(provider = %candidate, "Skipping candidate: circuit breaker open");
                continue;
            }

            // A single call never gets more than the per-call timeout, and
            // never more than what remains of the overall deadline.
            let call_budget = self.per_call_timeout.min(deadline - now);

            match tokio::time::timeout(call_budget, provider.generate(operation, model, payload)).await {
                Ok(Ok(response)) => {
                    self.breakers.record_outcome(candidate, true);
                    tracing::info!(provider = %candidate, model, "Provider call succeeded");
                    return RouteOutcome::Routed {
                        response,
                        provider: candidate,
                    };
                }
                Ok(Err(e)) => {
                    self.breakers.record_outcome(candidate, false);
                    tracing::warn!(provider = %candidate, model, error = %e, "Provider call failed, trying next candidate");
                }
                Err(_) => {
                    self.breakers.record_outcome(candidate, false);
                    tracing::warn!(
                        provider = %candidate,
                        model,
                        timeout = ?call_budget,
                        "Provider call timed out, trying next candidate"
                    );
                }
            }
        }

        RouteOutcome::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use crate::test_utils::FakeProvider;
    use serde_json::json;

    fn breakers() -> Arc<CircuitBreakerRegistry> {
        Arc::new(CircuitBreakerRegistry::new(&BreakerConfig {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }))
    }

    fn router_with(providers: Vec<Arc<FakeProvider>>, breakers: Arc<CircuitBreakerRegistry>) -> ProviderRouter {
        let map: HashMap<ProviderId, Arc<dyn Provider>> = providers.into_iter().map(|p| (p.id(), p as Arc<dyn Provider>)).collect();
        ProviderRouter::new(map, breakers, Duration::from_secs(30))
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(300)
    }

    #[tokio::test]
    async fn test_first_candidate_success() {
        let google = FakeProvider::healthy(ProviderId::Google);
        let openrouter = FakeProvider::healthy(ProviderId::OpenRouter);
        let router = router_with(vec![google.clone(), openrouter.clone()], breakers());

        let outcome = router
            .route(
                OperationType::Text,
                "gemini-2.5-flash",
                &json!({}),
                &[ProviderId::Google, ProviderId::OpenRouter],
                far_deadline(),
            )
            .await;

        let RouteOutcome::Routed { provider, .. } = outcome else {
            panic!("expected routed outcome");
        };
        assert_eq!(provider, ProviderId::Google);
        assert_eq!(google.calls(), 1);
        assert_eq!(openrouter.calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_on_failure() {
        let google = FakeProvider::failing(ProviderId::Google);
        let openrouter = FakeProvider::healthy(ProviderId::OpenRouter);
        let router = router_with(vec![google.clone(), openrouter.clone()], breakers());

        let outcome = router
            .route(
                OperationType::Text,
                "gemini-2.5-flash",
                &json!({}),
                &[ProviderId::Google, ProviderId::OpenRouter],
                far_deadline(),
            )
            .await;

        let RouteOutcome::Routed { provider, .. } = outcome else {
            panic!("expected routed outcome");
        };
        assert_eq!(provider, ProviderId::OpenRouter);
        assert_eq!(google.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_on_timeout() {
        // Primary hangs for longer than the per-call timeout
        let google = FakeProvider::hanging(ProviderId::Google, Duration::from_secs(120));
        let openrouter = FakeProvider::healthy(ProviderId::OpenRouter);
        let router = router_with(vec![google.clone(), openrouter.clone()], breakers());

        let outcome = router
            .route(
                OperationType::Text,
                "gemini-2.5-flash",
                &json!({}),
                &[ProviderId::Google, ProviderId::OpenRouter],
                Instant::now() + Duration::from_secs(300),
            )
            .await;

        let RouteOutcome::Routed { provider, .. } = outcome else {
            panic!("expected routed outcome");
        };
        assert_eq!(provider, ProviderId::OpenRouter);
    }

    #[tokio::test]
    async fn test_exhausted_when_all_fail() {
        let google = FakeProvider::failing(ProviderId::Google);
        let openrouter = FakeProvider::failing(ProviderId::OpenRouter);
        let router = router_with(vec![google, openrouter], breakers());

        let outcome = router
            .route(
                OperationType::Text,
                "gemini-2.5-flash",
                &json!({}),
                &[ProviderId::Google, ProviderId::OpenRouter],
                far_deadline(),
            )
            .await;

        assert!(matches!(outcome, RouteOutcome::Exhausted));
    }

    #[tokio::test]
    async fn test_open_breaker_skips_provider_without_calling_it() {
        let breakers = breakers();
        // Trip the Google breaker
        for _ in 0..5 {
            breakers.record_outcome(ProviderId::Google, false);
        }

        let google = FakeProvider::healthy(ProviderId::Google);
        let openrouter = FakeProvider::healthy(ProviderId::OpenRouter);
        let router = router_with(vec![google.clone(), openrouter.clone()], breakers);

        let outcome = router
            .route(
                OperationType::Text,
                "gemini-2.5-flash",
                &json!({}),
                &[ProviderId::Google, ProviderId::OpenRouter],
                far_deadline(),
            )
            .await;

        let RouteOutcome::Routed { provider, .. } = outcome else {
            panic!("expected routed outcome");
        };
        assert_eq!(provider, ProviderId::OpenRouter);
        assert_eq!(google.calls(), 0, "open provider must not be attempted");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_is_exhaustion() {
        let google = FakeProvider::healthy(ProviderId::Google);
        let router = router_with(vec![google.clone()], breakers());

        let deadline = Instant::now();
        tokio::time::advance(Duration::from_millis(1)).await;

        let outcome = router
            .route(OperationType::Text, "gemini-2.5-flash", &json!({}), &[ProviderId::Google], deadline)
            .await;

        assert!(matches!(outcome, RouteOutcome::Exhausted));
        assert_eq!(google.calls(), 0);
    }

    #[tokio::test]
    async fn test_failures_feed_the_breaker() {
        let breakers = breakers();
        let google = FakeProvider::failing(ProviderId::Google);
        let router = router_with(vec![google.clone()], breakers.clone());

        for _ in 0..5 {
            let outcome = router
                .route(OperationType::Text, "gemini-2.5-flash", &json!({}), &[ProviderId::Google], far_deadline())
                .await;
            assert!(matches!(outcome, RouteOutcome::Exhausted));
        }

        // Breaker is now open; the provider is no longer attempted
        assert_eq!(google.calls(), 5);
        router
            .route(OperationType::Text, "gemini-2.5-flash", &json!({}), &[ProviderId::Google], far_deadline())
            .await;
        assert_eq!(google.calls(), 5);
    }
}
