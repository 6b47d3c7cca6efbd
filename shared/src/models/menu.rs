//! Menu and event inputs consumed by the ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-serving quantity of a raw material required by a dish.
///
/// Owned by menu management; the ledger only reads it. The material's
/// name and unit ride along for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngredientRatio {
    pub menu_item_id: Uuid,
    pub inventory_item_id: Uuid,
    pub quantity_per_serving: Decimal,
    /// Unit the ratio was entered in
    pub unit: String,
    pub material_name: String,
    pub material_unit: String,
}

/// A dish chosen for an event with its serving count
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MenuSelection {
    pub menu_item_id: Uuid,
    pub quantity: i32,
}

/// Finalized menu of an event as provided by the booking subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMenu {
    pub event_id: Uuid,
    /// Branch hosting the event
    pub branch_id: Uuid,
    pub guest_count: i32,
    pub selections: Vec<MenuSelection>,
}

/// Input for deducting stock for an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductForEventInput {
    pub event_id: Uuid,
    pub menu_items: Vec<MenuSelection>,
    pub guest_count: i32,
}
