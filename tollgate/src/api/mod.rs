//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! The API is divided into three functional areas:
//!
//! - **Generation** (`/api/v1/generate`, `/api/v1/requests/*`): the gated
//!   generation call and inspection of its request records
//! - **Credits** (`/api/v1/credits/*`): balance, transaction history, and
//!   the billing grant endpoint
//! - **Health** (`/health`, `/healthz`): provider breaker states, the
//!   per-tier model allowlist, and a plain liveness probe

pub mod handlers;
pub mod models;
