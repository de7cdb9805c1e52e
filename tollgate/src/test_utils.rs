//! Shared test doubles and fixtures.
//!
//! Compiled only for tests. The central piece is [`FakeProvider`], a
//! scripted [`Provider`] that lets routing and orchestration tests run
//! without any network or mock server.

use crate::breaker::CircuitBreakerRegistry;
use crate::config::Config;
use crate::ledger::CreditLedger;
use crate::orchestrator::Orchestrator;
use crate::policy::ModelPolicy;
use crate::providers::{Provider, ProviderError, ProviderResponse};
use crate::reconcile::MarginTracker;
use crate::router::ProviderRouter;
use crate::types::{MilliCredits, OperationType, ProviderId};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

enum Behavior {
    Succeed { actual_cost: Option<MilliCredits> },
    Fail,
    Hang(Duration),
}

/// A scripted provider with a call counter.
pub struct FakeProvider {
    id: ProviderId,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl FakeProvider {
    fn new(id: ProviderId, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id,
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    /// Always succeeds, reports no upstream cost.
    pub fn healthy(id: ProviderId) -> Arc<Self> {
        Self::new(id, Behavior::Succeed { actual_cost: None })
    }

    /// Always succeeds and reports the given upstream cost.
    pub fn reporting_cost(id: ProviderId, actual_cost: MilliCredits) -> Arc<Self> {
        Self::new(
            id,
            Behavior::Succeed {
                actual_cost: Some(actual_cost),
            },
        )
    }

    /// Always fails with an upstream 503.
    pub fn failing(id: ProviderId) -> Arc<Self> {
        Self::new(id, Behavior::Fail)
    }

    /// Sleeps for `delay` before answering, to trip the per-call timeout.
    pub fn hanging(id: ProviderId, delay: Duration) -> Arc<Self> {
        Self::new(id, Behavior::Hang(delay))
    }

    /// Number of `generate` calls this fake has received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn generate(&self, _operation: OperationType, model: &str, _payload: &serde_json::Value) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed { actual_cost } => Ok(ProviderResponse {
                body: json!({"result": format!("{model} output from {}", self.id)}),
                actual_cost: *actual_cost,
            }),
            Behavior::Fail => Err(ProviderError::Status {
                status: 503,
                body: "upstream unavailable".to_string(),
            }),
            Behavior::Hang(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(ProviderResponse {
                    body: json!({"result": "late"}),
                    actual_cost: None,
                })
            }
        }
    }
}

/// An orchestrator over the default config's policy and the given fakes,
/// with a fresh ledger and breaker registry.
pub fn test_orchestrator(providers: Vec<Arc<FakeProvider>>) -> Arc<Orchestrator> {
    let config = Config::default();
    let ledger = Arc::new(CreditLedger::new());
    test_orchestrator_with(providers, &config, ledger)
}

/// A full `TestServer` over the default config, fake providers, and a
/// fresh ledger. The returned state shares the server's ledger and
/// orchestrator, for seeding credits and inspecting outcomes.
pub fn test_app(providers: Vec<Arc<FakeProvider>>) -> (axum_test::TestServer, crate::AppState) {
    let config = Config::default();
    let ledger = Arc::new(CreditLedger::new());
    let orchestrator = test_orchestrator_with(providers, &config, Arc::clone(&ledger));
    let policy = Arc::new(ModelPolicy::new(&config.policy, &config.routing));

    let state = crate::AppState::builder()
        .config(config)
        .ledger(ledger)
        .policy(policy)
        .orchestrator(orchestrator)
        .build();

    let router = crate::build_router(&state).expect("Failed to build router");
    let server = axum_test::TestServer::new(router).expect("Failed to create test server");
    (server, state)
}

pub fn test_orchestrator_with(providers: Vec<Arc<FakeProvider>>, config: &Config, ledger: Arc<CreditLedger>) -> Arc<Orchestrator> {
    let policy = Arc::new(ModelPolicy::new(&config.policy, &config.routing));
    let breakers = Arc::new(CircuitBreakerRegistry::new(&config.breaker));
    let map: HashMap<ProviderId, Arc<dyn Provider>> = providers.into_iter().map(|p| (p.id(), p as Arc<dyn Provider>)).collect();
    let router = ProviderRouter::new(map, breakers, config.routing.per_call_timeout);
    Arc::new(Orchestrator::new(
        ledger,
        policy,
        router,
        Arc::new(MarginTracker::new()),
        config.routing.request_deadline,
    ))
}
