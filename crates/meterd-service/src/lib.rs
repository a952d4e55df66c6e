//! meterd HTTP API service.
//!
//! This crate exposes the entitlement engine over HTTP:
//!
//! - Entitlement and grant management
//! - Value (balance) queries and history reconstruction
//! - Period resets
//! - Usage event ingestion
//!
//! # Authentication
//!
//! Two API-key schemes:
//!
//! 1. **Service keys** (`x-api-key`) - for metering pipelines reporting
//!    usage and for read queries.
//! 2. **Admin keys** (`x-admin-key`) - for entitlement and grant mutation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers stay async for routing consistency

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
