//! HTTP handlers

pub mod event;
pub mod health;
pub mod inventory;

pub use event::*;
pub use health::*;
pub use inventory::*;
