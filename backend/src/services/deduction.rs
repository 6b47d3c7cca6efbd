//! Sufficiency check and deduction planning over locked ledger rows
//!
//! Stores lock the rows, hand their balances to [`plan_deduction`] and then
//! write exactly what the plan says. Nothing in here touches storage.

use std::collections::HashMap;

use rust_decimal::Decimal;
use shared::{DeductionLine, DeductionOutcome, LowStockWarning, Shortfall};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::requirements::Requirements;

/// Balance of a ledger row as read under its lock
#[derive(Debug, Clone)]
pub struct LockedRow {
    pub id: Uuid,
    pub name: String,
    pub current_stock: Decimal,
    pub min_stock_level: Decimal,
}

/// One row update the store must apply
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedDeduction {
    pub inventory_item_id: Uuid,
    pub name: String,
    pub unit: String,
    pub quantity: Decimal,
    pub remaining: Decimal,
    pub min_stock_level: Decimal,
}

impl PlannedDeduction {
    pub fn crosses_threshold(&self) -> bool {
        self.remaining <= self.min_stock_level
    }
}

/// Validated set of row updates for one event
#[derive(Debug, Clone, Default)]
pub struct DeductionPlan {
    pub lines: Vec<PlannedDeduction>,
}

impl DeductionPlan {
    /// Caller-facing result: every deduction plus the low-stock warnings
    pub fn outcome(&self) -> DeductionOutcome {
        let deducted = self
            .lines
            .iter()
            .map(|l| DeductionLine {
                inventory_item_id: l.inventory_item_id,
                name: l.name.clone(),
                deducted: l.quantity,
                remaining: l.remaining,
                unit: l.unit.clone(),
            })
            .collect();

        let warnings = self
            .lines
            .iter()
            .filter(|l| l.crosses_threshold())
            .map(|l| LowStockWarning {
                inventory_item_id: l.inventory_item_id,
                name: l.name.clone(),
                current_stock: l.remaining,
                min_stock_level: l.min_stock_level,
            })
            .collect();

        DeductionOutcome { deducted, warnings }
    }
}

/// Check every requirement against its locked row.
///
/// Fails with `NotFound` when a required material has no ledger row, and
/// with `InsufficientStock` listing every short material otherwise. Lines
/// come out in ascending material id order.
pub fn plan_deduction(requirements: &Requirements, locked: &[LockedRow]) -> AppResult<DeductionPlan> {
    let rows: HashMap<Uuid, &LockedRow> = locked.iter().map(|r| (r.id, r)).collect();

    let missing: Vec<String> = requirements
        .iter()
        .filter(|r| !rows.contains_key(&r.inventory_item_id))
        .map(|r| format!("{} ({})", r.name, r.inventory_item_id))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::NotFound(format!(
            "Inventory item {}",
            missing.join(", ")
        )));
    }

    let mut shortfalls = Vec::new();
    let mut lines = Vec::with_capacity(requirements.len());

    for req in requirements.iter() {
        let row = rows[&req.inventory_item_id];
        if row.current_stock < req.required {
            shortfalls.push(Shortfall {
                inventory_item_id: row.id,
                material: row.name.clone(),
                required: req.required,
                available: row.current_stock,
                unit: req.unit.clone(),
            });
            continue;
        }

        lines.push(PlannedDeduction {
            inventory_item_id: row.id,
            name: row.name.clone(),
            unit: req.unit.clone(),
            quantity: req.required,
            remaining: row.current_stock - req.required,
            min_stock_level: row.min_stock_level,
        });
    }

    if !shortfalls.is_empty() {
        return Err(AppError::InsufficientStock(shortfalls));
    }

    Ok(DeductionPlan { lines })
}

/// Audit note attached to every movement of an event deduction
pub fn deduction_note(event_id: Uuid, guest_count: i32) -> String {
    format!("Auto-deducted for event {} ({} guests)", event_id, guest_count)
}
