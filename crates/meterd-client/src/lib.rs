//! meterd client SDK.
//!
//! This crate provides a client library for services to interact with the
//! meterd entitlement API: usage reporting, access checks, and value
//! queries.
//!
//! # Example
//!
//! ```no_run
//! use meterd_client::{MeterClient, UsageRequest};
//!
//! # async fn example() -> Result<(), meterd_client::ClientError> {
//! let client = MeterClient::new(
//!     "http://meterd.metering.svc:8080",
//!     "your-service-api-key",
//! );
//!
//! // Report usage against an entitlement
//! let response = client.report_usage(UsageRequest {
//!     event_id: "evt_123".to_string(),
//!     entitlement_id: "7c9e6679-7425-40de-944b-e07fc1f90ae7".to_string(),
//!     quantity: 42,
//!     timestamp: None,
//!     metadata: None,
//! }).await?;
//!
//! println!("Cumulative usage: {}", response.usage_total);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, MeterClient};
pub use error::ClientError;
pub use types::*;
