//! Core types for the meterd entitlement engine.
//!
//! This crate provides the foundational types used throughout meterd:
//!
//! - **Identifiers**: `EntitlementId`, `SubjectId`, `GrantId`, `ResetId`
//! - **Entitlements**: `Entitlement`, `EntitlementKind`, `EntitlementValue`
//! - **Grants**: `Grant`, `RolloverPolicy`, `Recurrence`
//! - **Periods**: `UsagePeriod`, `WindowSize`
//! - **Usage**: `UsageEvent`
//! - **Resets**: `ResetEvent`, `GrantRollover`
//!
//! # Amounts
//!
//! All quantities (grant amounts, usage, balances) are `i64` integer base
//! units. Balance arithmetic never touches floating point, so repeated
//! burn-down recomputation is exact and reproducible.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod entitlement;
pub mod error;
pub mod grant;
pub mod ids;
pub mod period;
pub mod reset;
pub mod usage;

pub use entitlement::{Entitlement, EntitlementKind, EntitlementValue};
pub use error::{MeterError, Result};
pub use grant::{Grant, Recurrence, RecurrenceInterval, RolloverPolicy};
pub use ids::{EntitlementId, GrantId, IdError, ResetId, SubjectId};
pub use period::{UsagePeriod, WindowSize};
pub use reset::{GrantRollover, ResetEvent};
pub use usage::UsageEvent;
