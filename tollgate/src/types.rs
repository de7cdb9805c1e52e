//! Common type definitions shared across the gateway.
//!
//! All entity IDs are UUIDs wrapped in type aliases for better type safety:
//!
//! - [`UserId`]: account holder identifier
//! - [`RequestId`]: generation request identifier
//! - [`TransactionId`]: ledger transaction identifier
//!
//! Credit amounts everywhere in the crate are [`MilliCredits`]: integer
//! fixed-point with 1 credit = 1000 milli-credits. Integer arithmetic keeps
//! the ledger invariant exactly checkable; fractional credit prices from
//! upstream pricing sheets are converted once, at configuration load.

use serde::Deserialize;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type RequestId = Uuid;
pub type TransactionId = Uuid;

/// Fixed-point credit amount: 1 credit = 1000 milli-credits.
pub type MilliCredits = i64;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// The kind of generation being requested. The payload itself is opaque to
/// the gateway; this is the only semantic dimension (besides the model name)
/// that pricing and routing depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Text,
    Image,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::Text => write!(f, "text"),
            OperationType::Image => write!(f, "image"),
        }
    }
}

/// Subscription tier of an account. Determines which (operation, model)
/// pairs are permitted and what they cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Standard,
    Premium,
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Free
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Free => write!(f, "free"),
            Tier::Standard => write!(f, "standard"),
            Tier::Premium => write!(f, "premium"),
        }
    }
}

/// Closed set of upstream providers the router can dispatch to.
///
/// Keeping this a tagged enum (rather than free-form strings) means the
/// fallback order in configuration is checked at deserialization time and
/// an unknown provider can never silently enter the candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Google,
    OpenRouter,
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderId::Google => write!(f, "google"),
            ProviderId::OpenRouter => write!(f, "openrouter"),
        }
    }
}
