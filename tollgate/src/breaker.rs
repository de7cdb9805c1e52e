//! Per-provider circuit breaking.
//!
//! Each provider degrades independently: a registry entry tracks
//! Closed/Open/HalfOpen state plus a consecutive-failure counter, and the
//! router consults [`CircuitBreakerRegistry::is_available`] before every
//! dispatch. There is no global stop-the-world switch; state lives in a
//! `DashMap` keyed by provider, so unrelated providers never contend on a
//! shared lock.
//!
//! The registry is an explicit instance injected into the router (and into
//! tests), not module-level state, so every test case can run against an
//! isolated registry.
//!
//! Valid transitions, enforced here and nowhere else:
//! Closed→Open (failure threshold reached), Open→HalfOpen (cooldown
//! elapsed), HalfOpen→Closed (trial success), HalfOpen→Open (trial failure).
//! During HalfOpen at most one trial probe is in flight at a time; the slot
//! is acquired by `is_available` and released by `record_outcome`.
//!
//! Time is measured with `tokio::time::Instant` so cooldown behavior is
//! testable under a paused runtime clock.

use crate::config::BreakerConfig;
use crate::types::ProviderId;
use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Health state of one provider's breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Set while the single half-open trial probe is in flight
    trial_in_flight: bool,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
        }
    }
}

/// Snapshot of one provider's health, for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub id: ProviderId,
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// Registry of per-provider breaker state.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    states: DashMap<ProviderId, BreakerState>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreakerRegistry {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            states: DashMap::new(),
            failure_threshold: config.failure_threshold,
            cooldown: config.cooldown,
        }
    }

    /// Whether the router may dispatch to this provider right now.
    ///
    /// Closed: always. Open: only once the cooldown has elapsed, in which
    /// case the breaker moves to HalfOpen and this call claims the single
    /// trial slot. HalfOpen: only if no trial probe is already in flight.
    ///
    /// A `true` return during HalfOpen claims the trial slot; the caller
    /// must follow up with [`record_outcome`](Self::record_outcome).
    pub fn is_available(&self, provider: ProviderId) -> bool {
        let mut entry = self.states.entry(provider).or_insert_with(BreakerState::new);
        match entry.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = entry.opened_at.is_some_and(|at| at.elapsed() >= self.cooldown);
                if cooled_down {
                    entry.state = CircuitState::HalfOpen;
                    entry.trial_in_flight = true;
                    tracing::info!(provider = %provider, "Circuit breaker half-open, allowing trial probe");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if entry.trial_in_flight {
                    false
                } else {
                    entry.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record the result of a provider call and advance the state machine.
    pub fn record_outcome(&self, provider: ProviderId, success: bool) {
        let mut entry = self.states.entry(provider).or_insert_with(BreakerState::new);
        entry.trial_in_flight = false;

        if success {
            entry.consecutive_failures = 0;
            if entry.state == CircuitState::HalfOpen {
                tracing::info!(provider = %provider, "Circuit breaker closed after successful trial");
                entry.state = CircuitState::Closed;
                entry.opened_at = None;
            }
            return;
        }

        entry.consecutive_failures += 1;
        match entry.state {
            CircuitState::Closed if entry.consecutive_failures >= self.failure_threshold => {
                tracing::warn!(
                    provider = %provider,
                    failures = entry.consecutive_failures,
                    "Circuit breaker opened"
                );
                entry.state = CircuitState::Open;
                entry.opened_at = Some(Instant::now());
            }
            CircuitState::HalfOpen => {
                tracing::warn!(provider = %provider, "Trial probe failed, circuit breaker re-opened");
                entry.state = CircuitState::Open;
                entry.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }

    /// Per-provider health snapshot for the given providers, in the order given.
    pub fn snapshot(&self, providers: &[ProviderId]) -> Vec<ProviderHealth> {
        providers
            .iter()
            .map(|&id| match self.states.get(&id) {
                Some(entry) => ProviderHealth {
                    id,
                    state: entry.state,
                    consecutive_failures: entry.consecutive_failures,
                },
                None => ProviderHealth {
                    id,
                    state: CircuitState::Closed,
                    consecutive_failures: 0,
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(threshold: u32, cooldown: Duration) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(&BreakerConfig {
            failure_threshold: threshold,
            cooldown,
        })
    }

    #[tokio::test]
    async fn test_opens_after_threshold_failures() {
        let registry = registry(5, Duration::from_secs(30));
        for _ in 0..4 {
            registry.record_outcome(ProviderId::Google, false);
            assert!(registry.is_available(ProviderId::Google));
        }
        registry.record_outcome(ProviderId::Google, false);
        assert!(!registry.is_available(ProviderId::Google));

        let health = &registry.snapshot(&[ProviderId::Google])[0];
        assert_eq!(health.state, CircuitState::Open);
        assert_eq!(health.consecutive_failures, 5);
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let registry = registry(3, Duration::from_secs(30));
        registry.record_outcome(ProviderId::Google, false);
        registry.record_outcome(ProviderId::Google, false);
        registry.record_outcome(ProviderId::Google, true);
        registry.record_outcome(ProviderId::Google, false);
        registry.record_outcome(ProviderId::Google, false);
        // Never reached 3 in a row
        assert!(registry.is_available(ProviderId::Google));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_allows_single_trial_probe() {
        let registry = registry(1, Duration::from_secs(30));
        registry.record_outcome(ProviderId::Google, false);
        assert!(!registry.is_available(ProviderId::Google));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!registry.is_available(ProviderId::Google));

        tokio::time::advance(Duration::from_secs(1)).await;
        // First caller gets the trial slot, a concurrent second caller does not
        assert!(registry.is_available(ProviderId::Google));
        assert!(!registry.is_available(ProviderId::Google));
        assert_eq!(registry.snapshot(&[ProviderId::Google])[0].state, CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let registry = registry(1, Duration::from_secs(10));
        registry.record_outcome(ProviderId::OpenRouter, false);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(registry.is_available(ProviderId::OpenRouter));

        registry.record_outcome(ProviderId::OpenRouter, true);
        let health = &registry.snapshot(&[ProviderId::OpenRouter])[0];
        assert_eq!(health.state, CircuitState::Closed);
        assert_eq!(health.consecutive_failures, 0);
        assert!(registry.is_available(ProviderId::OpenRouter));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_fresh_cooldown() {
        let registry = registry(1, Duration::from_secs(10));
        registry.record_outcome(ProviderId::Google, false);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(registry.is_available(ProviderId::Google));

        registry.record_outcome(ProviderId::Google, false);
        assert_eq!(registry.snapshot(&[ProviderId::Google])[0].state, CircuitState::Open);

        // The cooldown restarts from the re-open, not the original open
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!registry.is_available(ProviderId::Google));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(registry.is_available(ProviderId::Google));
    }

    #[tokio::test]
    async fn test_providers_degrade_independently() {
        let registry = registry(1, Duration::from_secs(30));
        registry.record_outcome(ProviderId::Google, false);
        assert!(!registry.is_available(ProviderId::Google));
        assert!(registry.is_available(ProviderId::OpenRouter));
    }
}
