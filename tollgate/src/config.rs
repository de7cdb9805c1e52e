//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `TOLLGATE_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `TOLLGATE_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `TOLLGATE_BREAKER__FAILURE_THRESHOLD=3` sets the `breaker.failure_threshold` field.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port` - HTTP server binding
//! - **Providers**: `providers.google`, `providers.openrouter` - upstream base URLs and API keys
//! - **Routing**: `routing.per_call_timeout`, `routing.request_deadline`, `routing.candidates`
//! - **Breaker**: `breaker.failure_threshold`, `breaker.cooldown`
//! - **Policy**: `policy.tiers` - the per-tier (operation, model) -> cost allowlist
//! - **CORS**: `cors.allowed_origins`
//!
//! Every field has a compiled-in default, so the gateway starts with no config file at all
//! (pointed at the real Google/OpenRouter endpoints, with the canonical pricing table).

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use url::Url;

use crate::types::{MilliCredits, OperationType, ProviderId, Tier};

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "TOLLGATE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Upstream provider connection settings, keyed by provider
    pub providers: ProvidersConfig,
    /// Provider routing and fallback settings
    pub routing: RoutingConfig,
    /// Circuit breaker thresholds shared by all providers
    pub breaker: BreakerConfig,
    /// Per-tier model allowlist and pricing
    pub policy: PolicyConfig,
    /// CORS settings for browser-facing deployments
    pub cors: CorsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            providers: ProvidersConfig::default(),
            routing: RoutingConfig::default(),
            breaker: BreakerConfig::default(),
            policy: PolicyConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

/// Connection settings for one upstream provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL of the provider API
    pub base_url: Url,
    /// API key; if unset, requests to this provider will fail and the
    /// breaker will route around it
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Upstream provider endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvidersConfig {
    pub google: ProviderConfig,
    pub openrouter: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            google: ProviderConfig {
                base_url: Url::parse("https://generativelanguage.googleapis.com").expect("valid default URL"),
                api_key: None,
            },
            openrouter: ProviderConfig {
                base_url: Url::parse("https://openrouter.ai").expect("valid default URL"),
                api_key: None,
            },
        }
    }
}

/// Provider routing and fallback settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingConfig {
    /// Bound on a single provider call; a call exceeding this is treated as
    /// a failure and the router advances to the next candidate
    #[serde(with = "humantime_serde")]
    pub per_call_timeout: Duration,
    /// Bound on the whole fallback loop for one request; exceeding it is
    /// treated as exhaustion (and triggers the normal refund path)
    #[serde(with = "humantime_serde")]
    pub request_deadline: Duration,
    /// Ordered fallback candidates per operation type. The order here is the
    /// complete routing policy; there is no other fallback logic.
    pub candidates: HashMap<OperationType, Vec<ProviderId>>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            per_call_timeout: Duration::from_secs(30),
            request_deadline: Duration::from_secs(120),
            candidates: HashMap::from([
                (OperationType::Text, vec![ProviderId::Google, ProviderId::OpenRouter]),
                (OperationType::Image, vec![ProviderId::Google, ProviderId::OpenRouter]),
            ]),
        }
    }
}

/// Circuit breaker thresholds, shared by all providers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerConfig {
    /// Consecutive failures before a provider's breaker opens
    pub failure_threshold: u32,
    /// How long an open breaker waits before allowing a half-open trial probe
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// One allowlist entry: a (operation, model) pair and its price.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelPrice {
    pub operation: OperationType,
    pub model: String,
    /// Price in milli-credits (1 credit = 1000)
    pub cost: MilliCredits,
}

/// Per-tier model allowlist and pricing.
///
/// Absence of a (operation, model) pair from a tier's list is a hard
/// rejection at admission, not a fallback to a default price.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    pub tiers: HashMap<Tier, Vec<ModelPrice>>,
}

impl Default for PolicyConfig {
    /// The canonical pricing table, in milli-credits. The upstream pricing
    /// sheets disagreed with each other (1/1.5/2 credits in one place,
    /// 2/3/4/5 in another); this table is the single source of truth.
    fn default() -> Self {
        fn price(operation: OperationType, model: &str, cost: MilliCredits) -> ModelPrice {
            ModelPrice {
                operation,
                model: model.to_string(),
                cost,
            }
        }

        use OperationType::{Image, Text};

        let free = vec![
            price(Text, "gemini-2.5-flash-lite", 500),
            price(Text, "gemini-2.5-flash", 1000),
            price(Image, "gemini-2.5-flash-image-preview", 2000),
        ];

        let mut standard = free.clone();
        standard.push(price(Text, "gemini-1.5-pro", 2000));

        let mut premium = standard.clone();
        premium.push(price(Image, "gemini-1.5-pro", 4000));

        Self {
            tiers: HashMap::from([(Tier::Free, free), (Tier::Standard, standard), (Tier::Premium, premium)]),
        }
    }
}

/// CORS settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins; "*" allows any origin
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        Self::figment(args).extract()
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("TOLLGATE_").split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_without_config_file() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "")?;

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            let config = Config::load(&args)?;

            assert_eq!(config.port, 8000);
            assert_eq!(config.breaker.failure_threshold, 5);
            assert_eq!(config.routing.per_call_timeout, Duration::from_secs(30));
            // Canonical table is present for every tier
            assert!(config.policy.tiers.contains_key(&Tier::Free));
            assert!(config.policy.tiers.contains_key(&Tier::Premium));
            Ok(())
        });
    }

    #[test]
    fn test_yaml_and_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 9100
breaker:
  failure_threshold: 3
  cooldown: 10s
routing:
  per_call_timeout: 5s
  request_deadline: 20s
  candidates:
    text: [openrouter]
    image: [google, openrouter]
"#,
            )?;

            jail.set_env("TOLLGATE_HOST", "127.0.0.1");
            jail.set_env("TOLLGATE_BREAKER__COOLDOWN", "45s");

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            let config = Config::load(&args)?;

            // Env vars should override
            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.breaker.cooldown, Duration::from_secs(45));

            // YAML values should be preserved
            assert_eq!(config.port, 9100);
            assert_eq!(config.breaker.failure_threshold, 3);
            assert_eq!(config.routing.candidates[&OperationType::Text], vec![ProviderId::OpenRouter]);

            Ok(())
        });
    }

    #[test]
    fn test_unknown_provider_in_candidates_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
routing:
  candidates:
    text: [google, shadow-llm]
"#,
            )?;

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            assert!(Config::load(&args).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_custom_pricing_table() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
policy:
  tiers:
    free:
      - { operation: text, model: tiny-model, cost: 100 }
"#,
            )?;

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            let config = Config::load(&args)?;
            let free = &config.policy.tiers[&Tier::Free];
            assert_eq!(free.len(), 1);
            assert_eq!(free[0].model, "tiny-model");
            assert_eq!(free[0].cost, 100);
            Ok(())
        });
    }
}
