//! uplift-core: value assessment engine for a managed fraud service.
//!
//! InputProfile → UpliftEngine::compute() → Assessment → breakdown::explain().

pub mod breakdown;
pub mod chargeback;
pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod funnel;
pub mod patch;
pub mod profile;
pub mod types;
