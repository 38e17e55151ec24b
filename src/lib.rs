//! xtickers Library
//!
//! Cross-exchange ticker normalization, rolling volume estimation and wallet
//! status reconciliation

pub mod config;
pub mod error;
pub mod market;
pub mod types;

pub use error::{EngineError, EngineResult};
