//! Shared types and models for the Venue Operations Platform
//!
//! This crate contains the inventory ledger's domain models and validation
//! helpers, shared between the backend and its API clients.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
