//! Domain models for the Venue Operations Platform inventory ledger

mod deduction;
mod inventory;
mod menu;

pub use deduction::*;
pub use inventory::*;
pub use menu::*;
