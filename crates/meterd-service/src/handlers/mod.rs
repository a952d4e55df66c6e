//! HTTP request handlers.

pub mod entitlements;
pub mod grants;
pub mod health;
pub mod usage;
