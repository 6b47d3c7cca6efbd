//! Deduction results and shortfall reports

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Total quantity of one material needed by an event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaterialRequirement {
    pub inventory_item_id: Uuid,
    pub name: String,
    pub unit: String,
    pub required: Decimal,
}

/// One material deducted for an event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeductionLine {
    pub inventory_item_id: Uuid,
    pub name: String,
    pub deducted: Decimal,
    pub remaining: Decimal,
    pub unit: String,
}

/// A material whose post-deduction balance is at or below its threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LowStockWarning {
    pub inventory_item_id: Uuid,
    pub name: String,
    pub current_stock: Decimal,
    pub min_stock_level: Decimal,
}

/// Successful deduction payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeductionOutcome {
    pub deducted: Vec<DeductionLine>,
    pub warnings: Vec<LowStockWarning>,
}

impl DeductionOutcome {
    pub fn is_empty(&self) -> bool {
        self.deducted.is_empty()
    }
}

/// A material that cannot cover its requirement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shortfall {
    pub inventory_item_id: Uuid,
    pub material: String,
    pub required: Decimal,
    pub available: Decimal,
    pub unit: String,
}

impl std::fmt::Display for Shortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: need {} {}, have {} {}",
            self.material, self.required, self.unit, self.available, self.unit
        )
    }
}
