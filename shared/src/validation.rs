//! Validation utilities for the inventory ledger

use rust_decimal::{Decimal, RoundingStrategy};
use validator::ValidationError;

use crate::models::MenuSelection;

// ============================================================================
// Ledger Scale
// ============================================================================

/// Decimal places kept by every balance and movement quantity
pub const LEDGER_SCALE: u32 = 3;

/// Largest balance or movement quantity the ledger stores (`NUMERIC(14, 3)`)
pub fn max_ledger_quantity() -> Decimal {
    Decimal::new(99_999_999_999_999, LEDGER_SCALE)
}

/// Round a computed quantity to the ledger scale, halves away from zero
pub fn to_ledger_scale(quantity: Decimal) -> Decimal {
    quantity.round_dp_with_strategy(LEDGER_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Whether a balance fits the ledger's range
pub fn within_ledger_range(quantity: Decimal) -> bool {
    quantity >= Decimal::ZERO && quantity <= max_ledger_quantity()
}

fn check_ledger_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity.normalize().scale() > LEDGER_SCALE {
        return Err("Quantity supports at most 3 decimal places");
    }
    if quantity > max_ledger_quantity() {
        return Err("Quantity exceeds the ledger maximum");
    }
    Ok(())
}

// ============================================================================
// Quantity Validations
// ============================================================================

/// Validate that a stock quantity is strictly positive and fits the ledger
pub fn validate_positive_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be positive");
    }
    check_ledger_quantity(quantity)
}

/// `validator` hook for opening balances and thresholds
pub fn ledger_quantity(value: &Decimal) -> Result<(), ValidationError> {
    non_negative_decimal(value)?;
    check_ledger_quantity(*value).map_err(|msg| {
        let mut error = ValidationError::new("ledger_quantity");
        error.message = Some(msg.into());
        error
    })
}

/// `validator` hook for stock, threshold and cost fields
pub fn non_negative_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut error = ValidationError::new("non_negative");
        error.message = Some("Value cannot be negative".into());
        return Err(error);
    }
    Ok(())
}

// ============================================================================
// Event Validations
// ============================================================================

/// Validate guest count for a deduction
pub fn validate_guest_count(guest_count: i32) -> Result<(), &'static str> {
    if guest_count <= 0 {
        return Err("Guest count must be a positive integer");
    }
    Ok(())
}

/// Validate menu selections for a deduction
pub fn validate_menu_selections(selections: &[MenuSelection]) -> Result<(), &'static str> {
    if selections.iter().any(|s| s.quantity <= 0) {
        return Err("Serving counts must be positive integers");
    }
    Ok(())
}
