use crate::types::{MilliCredits, OperationType, RequestId, Tier};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// The account balance cannot cover the cost of the requested operation.
    /// No ledger mutation occurred.
    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: MilliCredits, available: MilliCredits },

    /// The (tier, operation, model) combination is not in the allowlist.
    /// Absence is a hard rejection, never a fallback to a default price.
    #[error("Model '{model}' is not allowed for {operation} on the {tier} tier")]
    ModelNotAllowed {
        tier: Tier,
        operation: OperationType,
        model: String,
    },

    /// Every candidate provider failed or timed out. By the time this error
    /// reaches the caller their balance has already been restored.
    #[error("All providers unavailable")]
    AllProvidersUnavailable,

    /// A refund already exists for this generation request.
    #[error("Request {request_id} has already been refunded")]
    AlreadyRefunded { request_id: RequestId },

    /// A generation request was asked to make a transition its state machine
    /// does not permit.
    #[error("Invalid request state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            Error::ModelNotAllowed { .. } => StatusCode::FORBIDDEN,
            Error::AllProvidersUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Error::AlreadyRefunded { .. } => StatusCode::CONFLICT,
            Error::InvalidStateTransition { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code for the JSON body.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InsufficientCredits { .. } => "insufficient_credits",
            Error::ModelNotAllowed { .. } => "model_not_allowed",
            Error::AllProvidersUnavailable => "all_providers_unavailable",
            Error::AlreadyRefunded { .. } => "already_refunded",
            Error::InvalidStateTransition { .. } => "invalid_state_transition",
            Error::BadRequest { .. } => "bad_request",
            Error::NotFound { .. } => "not_found",
            Error::Other(_) => "internal_error",
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::InsufficientCredits { required, available } => {
                format!("Insufficient credits: required {required}, available {available}")
            }
            Error::ModelNotAllowed { tier, operation, model } => {
                format!("Model '{model}' is not allowed for {operation} on the {tier} tier")
            }
            Error::AllProvidersUnavailable => "All providers unavailable; your credits have been refunded".to_string(),
            Error::AlreadyRefunded { request_id } => format!("Request {request_id} has already been refunded"),
            Error::InvalidStateTransition { .. } | Error::Other(_) => "Internal server error".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::InvalidStateTransition { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::AllProvidersUnavailable => {
                tracing::warn!("Provider exhaustion: {}", self);
            }
            Error::AlreadyRefunded { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
            Error::InsufficientCredits { .. } | Error::ModelNotAllowed { .. } | Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = json!({
            "error": self.code(),
            "message": self.user_message(),
        });

        (status, axum::response::Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
