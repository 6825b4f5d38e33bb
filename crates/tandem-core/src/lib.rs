//! # tandem-core
//!
//! Core types, traits, and configuration for the tandem link aggregation
//! engine.
//!
//! This crate provides the rating and link data structures, the storage
//! traits implemented by `tandem-db` and the in-memory store, and the
//! explicit [`EngineConfig`] every engine is constructed with.

pub mod config;
pub mod defaults;
pub mod error;
pub mod filter;
pub mod logging;
pub mod models;
pub mod retention;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::{EngineConfig, RatingValues};
pub use error::{Error, Result};
pub use filter::{DistributionOptions, IdFilter, QueryOptions, RankingOptions};
pub use models::*;
pub use retention::{HorizonUnit, RetentionHorizon};
pub use traits::*;
