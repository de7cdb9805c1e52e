//! Request/response data structures for the HTTP API.

pub mod credits;
pub mod generate;
pub mod health;
