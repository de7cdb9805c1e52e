//! Upstream provider clients.
//!
//! The router talks to providers through the [`Provider`] trait, so tests
//! can substitute scripted fakes and the HTTP clients here stay thin. Two
//! real backends exist, matching the production fallback chain: Google's
//! Gemini `generateContent` API and OpenRouter's OpenAI-compatible chat
//! completions API.
//!
//! The generation payload is opaque to the gateway: it is forwarded to the
//! provider as-is, with only the model identifier injected where the
//! provider's wire format requires it (URL path for Google, body field for
//! OpenRouter). The gateway never constructs prompts.

use crate::config::{ProviderConfig, ProvidersConfig};
use crate::types::{MilliCredits, OperationType, ProviderId};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Failure of a single provider call. Absorbed by the router's fallback
/// loop; never surfaced to callers directly.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no API key configured for {0}")]
    NotConfigured(ProviderId),
}

/// Successful provider response.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// The provider's response body, returned to the caller untouched
    pub body: Value,
    /// Upstream cost in milli-credits, when the provider reports one.
    /// Consumed by cost reconciliation only.
    pub actual_cost: Option<MilliCredits>,
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Run one generation call. The router bounds this with its per-call
    /// timeout; implementations do not need their own.
    async fn generate(&self, operation: OperationType, model: &str, payload: &Value) -> Result<ProviderResponse, ProviderError>;
}

/// Build the provider map from configuration.
pub fn build_providers(config: &ProvidersConfig) -> HashMap<ProviderId, Arc<dyn Provider>> {
    let client = reqwest::Client::new();
    let mut providers: HashMap<ProviderId, Arc<dyn Provider>> = HashMap::new();
    providers.insert(
        ProviderId::Google,
        Arc::new(GoogleProvider::new(client.clone(), &config.google)),
    );
    providers.insert(
        ProviderId::OpenRouter,
        Arc::new(OpenRouterProvider::new(client, &config.openrouter)),
    );
    providers
}

/// Google Gemini `generateContent` client. The model is addressed in the
/// URL path; the payload is already in Gemini request format.
pub struct GoogleProvider {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl GoogleProvider {
    pub fn new(client: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Google
    }

    async fn generate(&self, _operation: OperationType, model: &str, payload: &Value) -> Result<ProviderResponse, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::NotConfigured(ProviderId::Google))?;

        let url = self
            .base_url
            .join(&format!("/v1beta/models/{model}:generateContent"))
            .map_err(|e| ProviderError::Status {
                status: 0,
                body: format!("invalid model in URL: {e}"),
            })?;

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        // Gemini does not report a monetary cost in the response; leave
        // actual_cost unset and let reconciliation record the gap.
        Ok(ProviderResponse { body, actual_cost: None })
    }
}

/// OpenRouter chat-completions client. OpenRouter models are namespaced
/// (`google/gemini-2.5-flash`), so the declared model is injected into the
/// payload under its namespaced name.
pub struct OpenRouterProvider {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl OpenRouterProvider {
    pub fn new(client: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn openrouter_model(model: &str) -> String {
        format!("google/{model}")
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenRouter
    }

    async fn generate(&self, _operation: OperationType, model: &str, payload: &Value) -> Result<ProviderResponse, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured(ProviderId::OpenRouter))?;

        let url = self.base_url.join("/api/v1/chat/completions").map_err(|e| ProviderError::Status {
            status: 0,
            body: format!("invalid URL: {e}"),
        })?;

        // Forward the payload as-is, overriding only the model field with
        // OpenRouter's namespaced identifier.
        let mut body = payload.clone();
        if let Value::Object(map) = &mut body {
            map.insert("model".to_string(), Value::String(Self::openrouter_model(model)));
        }

        let response = self.client.post(url).bearer_auth(api_key).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        // OpenRouter reports usage cost in credits; convert to fixed-point.
        let actual_cost = body
            .get("usage")
            .and_then(|usage| usage.get("cost"))
            .and_then(Value::as_f64)
            .map(|credits| (credits * 1000.0).round() as MilliCredits);

        Ok(ProviderResponse { body, actual_cost })
    }
}
