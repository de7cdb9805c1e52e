//! # tollgate: Cost-Control Gateway for AI Generation
//!
//! `tollgate` sits between application backends and paid AI generation
//! providers. Every generation call passes through admission control before
//! any provider sees it: the requested model is checked against the caller's
//! tier allowlist, the call's fixed credit price is debited from the user's
//! balance, and only then does the request go upstream. The financial
//! exposure of a misbehaving client is bounded by its credit balance, by
//! construction.
//!
//! ## Overview
//!
//! Teams putting AI features in front of users face the same failure modes:
//! a retry loop burning money against a paid API, a user hammering a model
//! their plan does not cover, a provider outage cascading into the product.
//! `tollgate` addresses these with a small set of cooperating components:
//!
//! - The **credit ledger** ([`ledger`]) owns balances and the append-only
//!   transaction log. Debits are linearizable per user, a balance can never
//!   go negative, and a request is refunded at most once.
//! - The **model policy** ([`policy`]) is a per-tier allowlist of
//!   (operation, model) pairs with fixed milli-credit prices. Absence means
//!   hard rejection, never a default price.
//! - The **circuit breaker registry** ([`breaker`]) tracks per-provider
//!   health so a failing provider is skipped instead of hammered.
//! - The **provider router** ([`router`]) tries candidates strictly in
//!   order, bounding each call with a timeout, until one succeeds.
//! - The **orchestrator** ([`orchestrator`]) ties it together and owns the
//!   money-safety rule: charge exactly once at admission, refund exactly
//!   once if every provider fails, never both keep the charge and fail the
//!   request.
//! - **Cost reconciliation** ([`reconcile`]) compares the fixed price
//!   charged with the cost the provider actually reported, off the request
//!   path.
//!
//! ## Request Flow
//!
//! `POST /api/v1/generate` → policy check (403 on a disallowed model) →
//! debit (402 on insufficient credits) → sequential provider fallback
//! (Google first, then OpenRouter) → on success the response body comes
//! back untouched with `provider_used` and `credits_remaining` attached; on
//! total exhaustion the debit is refunded before the 503 is returned.
//!
//! Once admitted, a request runs to a terminal state in a spawned task, so
//! a client disconnect can never strand a charge without its refund.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use tollgate::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = tollgate::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     tollgate::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config)?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod breaker;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod orchestrator;
pub mod policy;
pub mod providers;
pub mod reconcile;
pub mod requests;
pub mod router;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use crate::breaker::CircuitBreakerRegistry;
use crate::ledger::CreditLedger;
use crate::orchestrator::Orchestrator;
use crate::policy::ModelPolicy;
use crate::reconcile::MarginTracker;
use crate::router::ProviderRouter;
use axum::http::HeaderValue;
use axum::{
    Router,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info};

/// Application state shared across all request handlers.
///
/// Handlers reach the orchestrator for the generation path and the ledger
/// and policy directly for the read-only endpoints. Everything is behind an
/// `Arc`, so the state clones cheaply per request.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub ledger: Arc<CreditLedger>,
    pub policy: Arc<ModelPolicy>,
    pub orchestrator: Arc<Orchestrator>,
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        origins.push(origin.parse::<HeaderValue>()?);
    }

    Ok(CorsLayer::new().allow_origin(origins))
}

/// Build the application router with all endpoints and middleware.
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/generate", post(api::handlers::generate::generate))
        .route("/requests/{request_id}", get(api::handlers::generate::get_request))
        .route("/credits/{user_id}", get(api::handlers::credits::get_balance))
        .route("/credits/{user_id}/transactions", get(api::handlers::credits::list_transactions))
        .route("/credits/{user_id}/grant", post(api::handlers::credits::grant_credits))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/health", get(api::handlers::health::health))
        .with_state(state.clone())
        .nest("/api/v1", api_routes)
        .layer(create_cors_layer(&state.config)?)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// The assembled gateway, ready to serve.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Wire up the ledger, policy, breakers, providers, and orchestrator
    /// from configuration.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        tracing::debug!("Starting gateway with configuration: {:#?}", config);

        let ledger = Arc::new(CreditLedger::new());
        let policy = Arc::new(ModelPolicy::new(&config.policy, &config.routing));
        let breakers = Arc::new(CircuitBreakerRegistry::new(&config.breaker));
        let providers = providers::build_providers(&config.providers);
        let provider_router = ProviderRouter::new(providers, breakers, config.routing.per_call_timeout);
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&ledger),
            Arc::clone(&policy),
            provider_router,
            Arc::new(MarginTracker::new()),
            config.routing.request_deadline,
        ));

        let state = AppState::builder()
            .config(config.clone())
            .ledger(ledger)
            .policy(policy)
            .orchestrator(orchestrator)
            .build();

        let router = build_router(&state)?;

        Ok(Self { router, config })
    }

    /// Start serving until the shutdown future resolves.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Gateway listening on http://{bind_addr}");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
