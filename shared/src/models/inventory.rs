//! Inventory ledger models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::validation::{ledger_quantity, non_negative_decimal, within_ledger_range};

/// A raw material tracked by the ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    /// Unit of measure (e.g., "kg", "litre", "pcs")
    pub unit: String,
    pub current_stock: Decimal,
    pub min_stock_level: Decimal,
    pub cost_per_unit: Decimal,
    pub branch_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Whether the balance sits at or below the reorder threshold
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.min_stock_level
    }
}

/// Kind of a stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Purchase,
    Adjustment,
    Return,
    Deduction,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Purchase => "PURCHASE",
            MovementKind::Adjustment => "ADJUSTMENT",
            MovementKind::Return => "RETURN",
            MovementKind::Deduction => "DEDUCTION",
        }
    }

    /// Apply a movement of this kind to a balance.
    ///
    /// `ADJUSTMENT` carries an absolute value, every other kind a delta.
    /// Returns `None` when the result does not fit a `Decimal`.
    pub fn apply(&self, balance: Decimal, quantity: Decimal) -> Option<Decimal> {
        match self {
            MovementKind::Purchase | MovementKind::Return => balance.checked_add(quantity),
            MovementKind::Deduction => balance.checked_sub(quantity),
            MovementKind::Adjustment => Some(quantity),
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown movement kind
#[derive(Debug, thiserror::Error)]
#[error("unknown stock movement kind: {0}")]
pub struct UnknownMovementKind(pub String);

impl std::str::FromStr for MovementKind {
    type Err = UnknownMovementKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PURCHASE" => Ok(MovementKind::Purchase),
            "ADJUSTMENT" => Ok(MovementKind::Adjustment),
            "RETURN" => Ok(MovementKind::Return),
            "DEDUCTION" => Ok(MovementKind::Deduction),
            other => Err(UnknownMovementKind(other.to_string())),
        }
    }
}

/// Kinds accepted by a manual stock adjustment.
///
/// Deductions only happen through event menu finalization, so they are not
/// representable here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentKind {
    /// Stock received from a supplier (delta)
    Purchase,
    /// Stock returned to the shelf (delta)
    Return,
    /// Physical count correction (absolute)
    Adjustment,
}

impl AdjustmentKind {
    pub fn movement_kind(&self) -> MovementKind {
        match self {
            AdjustmentKind::Purchase => MovementKind::Purchase,
            AdjustmentKind::Return => MovementKind::Return,
            AdjustmentKind::Adjustment => MovementKind::Adjustment,
        }
    }

    /// New balance after applying `quantity` with this kind, or `None`
    /// when it leaves the ledger's range
    pub fn apply(&self, current: Decimal, quantity: Decimal) -> Option<Decimal> {
        self.movement_kind()
            .apply(current, quantity)
            .filter(|balance| within_ledger_range(*balance))
    }
}

/// An append-only audit entry for one balance change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockMovement {
    pub id: Uuid,
    pub inventory_item_id: Uuid,
    #[serde(rename = "type")]
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub event_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Rebuild a balance from a movement history ordered oldest first.
///
/// `None` if an intermediate balance overflows.
pub fn replay_balance(movements: &[StockMovement]) -> Option<Decimal> {
    movements
        .iter()
        .try_fold(Decimal::ZERO, |balance, m| m.kind.apply(balance, m.quantity))
}

/// Item detail with its most recent movements (newest first)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItemDetail {
    #[serde(flatten)]
    pub item: InventoryItem,
    pub stock_movements: Vec<StockMovement>,
}

/// Row returned by the low-stock query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LowStockItem {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub current_stock: Decimal,
    pub min_stock_level: Decimal,
    pub branch_id: Uuid,
}

impl LowStockItem {
    /// Balance minus threshold; the more negative, the more critical
    pub fn deficit(&self) -> Decimal {
        self.current_stock - self.min_stock_level
    }
}

impl From<&InventoryItem> for LowStockItem {
    fn from(item: &InventoryItem) -> Self {
        Self {
            id: item.id,
            name: item.name.clone(),
            category: item.category.clone(),
            unit: item.unit.clone(),
            current_stock: item.current_stock,
            min_stock_level: item.min_stock_level,
            branch_id: item.branch_id,
        }
    }
}

/// Input for a manual stock adjustment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustmentInput {
    #[serde(rename = "type")]
    pub kind: AdjustmentKind,
    pub quantity: Decimal,
    pub notes: Option<String>,
}

/// Input for creating an inventory item
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateInventoryItemInput {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: String,
    #[validate(length(min = 2, message = "Category must be at least 2 characters"))]
    pub category: String,
    #[validate(length(min = 1, message = "Unit is required"))]
    pub unit: String,
    #[serde(default)]
    #[validate(custom = "ledger_quantity")]
    pub current_stock: Decimal,
    #[serde(default)]
    #[validate(custom = "ledger_quantity")]
    pub min_stock_level: Decimal,
    #[serde(default)]
    #[validate(custom = "non_negative_decimal")]
    pub cost_per_unit: Decimal,
    /// Falls back to the caller's branch when omitted
    pub branch_id: Option<Uuid>,
}

/// Partial update of an inventory item.
///
/// The balance is not editable here; it only moves through adjustments and
/// deductions so that the movement log stays replayable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateInventoryItemInput {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 2, message = "Category must be at least 2 characters"))]
    pub category: Option<String>,
    #[validate(length(min = 1, message = "Unit is required"))]
    pub unit: Option<String>,
    #[validate(custom = "ledger_quantity")]
    pub min_stock_level: Option<Decimal>,
    #[validate(custom = "non_negative_decimal")]
    pub cost_per_unit: Option<Decimal>,
    pub branch_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

impl UpdateInventoryItemInput {
    /// Apply the present fields onto an item
    pub fn apply_to(&self, item: &mut InventoryItem) {
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(category) = &self.category {
            item.category = category.clone();
        }
        if let Some(unit) = &self.unit {
            item.unit = unit.clone();
        }
        if let Some(level) = self.min_stock_level {
            item.min_stock_level = level;
        }
        if let Some(cost) = self.cost_per_unit {
            item.cost_per_unit = cost;
        }
        if let Some(branch_id) = self.branch_id {
            item.branch_id = branch_id;
        }
        if let Some(active) = self.is_active {
            item.is_active = active;
        }
    }
}

/// Fully resolved item ready to be inserted
#[derive(Debug, Clone)]
pub struct NewInventoryItem {
    pub name: String,
    pub category: String,
    pub unit: String,
    pub current_stock: Decimal,
    pub min_stock_level: Decimal,
    pub cost_per_unit: Decimal,
    pub branch_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn movement(kind: MovementKind, quantity: i64) -> StockMovement {
        StockMovement {
            id: Uuid::new_v4(),
            inventory_item_id: Uuid::nil(),
            kind,
            quantity: Decimal::from(quantity),
            event_id: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_adjustment_is_absolute() {
        let current = Decimal::from(50);
        assert_eq!(
            AdjustmentKind::Adjustment.apply(current, Decimal::from(200)),
            Some(Decimal::from(200))
        );
        assert_eq!(
            AdjustmentKind::Purchase.apply(current, Decimal::from(200)),
            Some(Decimal::from(250))
        );
        assert_eq!(
            AdjustmentKind::Return.apply(current, Decimal::from(5)),
            Some(Decimal::from(55))
        );
    }

    #[test]
    fn test_apply_out_of_range_is_none() {
        let current = Decimal::from(10);
        assert_eq!(MovementKind::Purchase.apply(current, Decimal::MAX), None);
        assert_eq!(MovementKind::Deduction.apply(Decimal::MIN, Decimal::ONE), None);
        // Fits a Decimal but not the ledger column
        assert_eq!(AdjustmentKind::Purchase.apply(current, Decimal::MAX - current), None);
        assert_eq!(AdjustmentKind::Adjustment.apply(current, Decimal::MAX), None);
    }

    #[test]
    fn test_replay_overflow_is_none() {
        let mut history = vec![movement(MovementKind::Purchase, 1)];
        history.push(StockMovement {
            quantity: Decimal::MAX,
            ..movement(MovementKind::Purchase, 0)
        });
        assert_eq!(replay_balance(&history), None);
    }

    #[test]
    fn test_replay_balance() {
        let history = vec![
            movement(MovementKind::Adjustment, 100),
            movement(MovementKind::Purchase, 50),
            movement(MovementKind::Deduction, 30),
            movement(MovementKind::Return, 5),
        ];
        // 100 + 50 - 30 + 5
        assert_eq!(replay_balance(&history), Some(Decimal::from(125)));
    }

    #[test]
    fn test_replay_adjustment_resets_history() {
        let history = vec![
            movement(MovementKind::Purchase, 50),
            movement(MovementKind::Adjustment, 200),
        ];
        assert_eq!(replay_balance(&history), Some(Decimal::from(200)));
    }

    #[test]
    fn test_movement_kind_wire_format() {
        let json = serde_json::to_string(&MovementKind::Deduction).unwrap();
        assert_eq!(json, "\"DEDUCTION\"");
        assert_eq!(MovementKind::from_str("RETURN").unwrap(), MovementKind::Return);
        assert!(MovementKind::from_str("return").is_err());
    }

    #[test]
    fn test_adjustment_kind_rejects_deduction() {
        let parsed = serde_json::from_str::<StockAdjustmentInput>(
            r#"{"type": "DEDUCTION", "quantity": "5"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_create_input_validation() {
        let input = CreateInventoryItemInput {
            name: "R".to_string(),
            category: "Grains".to_string(),
            unit: "kg".to_string(),
            current_stock: Decimal::ZERO,
            min_stock_level: Decimal::from(-1),
            cost_per_unit: Decimal::ZERO,
            branch_id: None,
        };
        let errors = input.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("min_stock_level"));
        assert!(!fields.contains_key("category"));
    }

    mod replay_properties {
        use super::*;
        use proptest::prelude::*;

        fn kind() -> impl Strategy<Value = MovementKind> {
            prop_oneof![
                Just(MovementKind::Purchase),
                Just(MovementKind::Return),
                Just(MovementKind::Adjustment),
                Just(MovementKind::Deduction),
            ]
        }

        proptest! {
            /// Replaying a history equals folding each movement onto the balance
            #[test]
            fn prop_replay_matches_stepwise_apply(
                steps in prop::collection::vec((kind(), 1i64..1000), 0..40)
            ) {
                let history: Vec<StockMovement> =
                    steps.iter().map(|(k, q)| movement(*k, *q)).collect();

                let mut balance = Decimal::ZERO;
                for m in &history {
                    balance = m.kind.apply(balance, m.quantity).unwrap();
                }

                prop_assert_eq!(replay_balance(&history), Some(balance));
            }

            /// Everything before the last ADJUSTMENT is irrelevant to the balance
            #[test]
            fn prop_last_adjustment_anchors_balance(
                before in prop::collection::vec((kind(), 1i64..1000), 0..20),
                anchor in 0i64..1000,
                after in prop::collection::vec(1i64..100, 0..20),
            ) {
                let mut history: Vec<StockMovement> =
                    before.iter().map(|(k, q)| movement(*k, *q)).collect();
                history.push(movement(MovementKind::Adjustment, anchor));
                history.extend(after.iter().map(|q| movement(MovementKind::Purchase, *q)));

                let expected = Decimal::from(anchor + after.iter().sum::<i64>());
                prop_assert_eq!(replay_balance(&history), Some(expected));
            }
        }
    }
}
