//! Business logic services for the inventory ledger

pub mod deduction;
pub mod inventory;
pub mod requirements;

pub use inventory::InventoryService;
