//! Persistence for the inventory ledger
//!
//! [`LedgerStore`] is the only path to the ledger tables. Write operations
//! (`apply_deduction`, `apply_adjustment`) lock just the rows they touch, in
//! ascending id order, and either commit everything or nothing.

use async_trait::async_trait;
use shared::{
    DeductionOutcome, EventMenu, IngredientRatio, InventoryItem, LowStockItem, NewInventoryItem,
    StockAdjustmentInput, StockMovement, UpdateInventoryItemInput,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::requirements::Requirements;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// An adjustment whose resulting balance does not fit the ledger
fn stock_out_of_range() -> AppError {
    AppError::validation("quantity", "Resulting stock is out of range")
}

/// One event deduction, ready to be applied
#[derive(Debug, Clone)]
pub struct DeductionRequest {
    pub event_id: Uuid,
    pub requirements: Requirements,
    pub note: String,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Connectivity check used by the health endpoint
    async fn ping(&self) -> AppResult<()>;

    /// Active items, optionally restricted to one branch, ordered by name
    async fn list_items(&self, branch_id: Option<Uuid>) -> AppResult<Vec<InventoryItem>>;

    async fn get_item(&self, id: Uuid) -> AppResult<Option<InventoryItem>>;

    /// Movements of one item, newest first; `None` returns the full history
    async fn item_movements(&self, item_id: Uuid, limit: Option<i64>) -> AppResult<Vec<StockMovement>>;

    /// Movements linked to an event, oldest first
    async fn event_movements(&self, event_id: Uuid) -> AppResult<Vec<StockMovement>>;

    /// Insert an item; a non-zero opening balance is logged as an adjustment
    async fn create_item(&self, item: NewInventoryItem) -> AppResult<InventoryItem>;

    /// Apply a partial update; `Ok(None)` when the item does not exist
    async fn update_item(
        &self,
        id: Uuid,
        changes: &UpdateInventoryItemInput,
    ) -> AppResult<Option<InventoryItem>>;

    /// Ingredient ratios of the given dishes, with material name and unit
    async fn ingredient_ratios(&self, menu_item_ids: &[Uuid]) -> AppResult<Vec<IngredientRatio>>;

    /// Finalized menu of an event; `Ok(None)` when the event does not exist
    async fn event_menu(&self, event_id: Uuid) -> AppResult<Option<EventMenu>>;

    /// Lock, verify and deduct every required material atomically.
    ///
    /// Fails with `Conflict` if the event was already deducted,
    /// `InsufficientStock` if any material is short, and leaves the ledger
    /// untouched on every failure.
    async fn apply_deduction(&self, request: &DeductionRequest) -> AppResult<DeductionOutcome>;

    /// Apply a manual adjustment under the item's row lock
    async fn apply_adjustment(
        &self,
        item_id: Uuid,
        adjustment: &StockAdjustmentInput,
    ) -> AppResult<InventoryItem>;

    /// Active items at or below threshold, most critical first
    async fn low_stock_items(&self, branch_id: Option<Uuid>) -> AppResult<Vec<LowStockItem>>;
}
