//! The meterd entitlement engine.
//!
//! This crate ties the grant ledger, usage accumulator, burn-down
//! calculator, period reset engine, and history reconstructor together
//! behind one `Engine` facade:
//!
//! - **Ledger mutations** (entitlement/grant creation, void, usage
//!   recording, reset) are serialized per entitlement via an in-process
//!   lock registry; reset persistence is a single atomic write batch.
//! - **Reads** (value queries, burn-down and windowed history) are pure
//!   computations over the ledger and never mutate stored state.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use meterd_core::{Entitlement, EntitlementKind, SubjectId};
//! use meterd_engine::{Engine, GrantParams};
//! use meterd_store::RocksStore;
//!
//! # async fn example() -> meterd_core::Result<()> {
//! let store = Arc::new(RocksStore::open("/tmp/meterd-db").map_err(meterd_core::MeterError::from)?);
//! let engine = Engine::new(store);
//!
//! let ent = engine
//!     .create_entitlement(SubjectId::generate(), "api_requests".into(), EntitlementKind::Metered)
//!     .await?;
//!
//! let value = engine.entitlement_value(&ent.id, chrono::Utc::now())?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod balance;
pub mod history;
pub mod locks;
pub mod meter;
pub mod reset;

mod engine;

pub use balance::GrantBalance;
pub use engine::{Engine, GrantParams};
pub use history::{BurndownSegment, GrantBurn, UsageWindow};
pub use locks::{EntitlementLocks, LockRegistry, SubjectFeatureLocks};
pub use meter::{StoreMeter, UsageMeter};
