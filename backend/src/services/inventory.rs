//! Inventory ledger service: catalog, manual adjustments, event deductions
//! and low-stock alerts

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use shared::{
    replay_balance, validate_guest_count, validate_menu_selections, validate_positive_quantity,
    CreateInventoryItemInput, DeductionOutcome, InventoryItem, InventoryItemDetail, LowStockItem,
    MenuSelection, NewInventoryItem, StockAdjustmentInput, StockMovement,
    UpdateInventoryItemInput,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::config::LedgerConfig;
use crate::error::{AppError, AppResult};
use crate::services::deduction::deduction_note;
use crate::services::requirements::aggregate_requirements;
use crate::store::{DeductionRequest, LedgerStore};

/// Inventory service over a [`LedgerStore`]
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn LedgerStore>,
    deduction_timeout: Duration,
    history_limit: i64,
}

/// Recorded balance compared with the balance rebuilt from the movement log
#[derive(Debug, Clone, Serialize)]
pub struct LedgerAudit {
    pub inventory_item_id: Uuid,
    pub recorded_stock: Decimal,
    /// `None` when the log cannot be replayed without overflowing
    pub replayed_stock: Option<Decimal>,
    pub movement_count: usize,
    pub consistent: bool,
}

impl InventoryService {
    /// Create a new InventoryService instance
    pub fn new(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Self {
        Self {
            store,
            deduction_timeout: config.deduction_timeout(),
            history_limit: config.movement_history_limit,
        }
    }

    /// List active items, optionally for one branch
    pub async fn list_items(&self, branch_id: Option<Uuid>) -> AppResult<Vec<InventoryItem>> {
        self.store.list_items(branch_id).await
    }

    /// Get an item with its most recent movements
    pub async fn get_item(&self, id: Uuid) -> AppResult<InventoryItemDetail> {
        let item = self.require_item(id).await?;
        let stock_movements = self
            .store
            .item_movements(id, Some(self.history_limit))
            .await?;

        Ok(InventoryItemDetail {
            item,
            stock_movements,
        })
    }

    /// Create an inventory item.
    ///
    /// `scope_branch` is used when the input does not name a branch.
    pub async fn create_item(
        &self,
        scope_branch: Option<Uuid>,
        input: CreateInventoryItemInput,
    ) -> AppResult<InventoryItem> {
        input.validate()?;

        let branch_id = input
            .branch_id
            .or(scope_branch)
            .ok_or_else(|| AppError::validation("branch_id", "No branch available to assign inventory item"))?;

        let item = self
            .store
            .create_item(NewInventoryItem {
                name: input.name,
                category: input.category,
                unit: input.unit,
                current_stock: input.current_stock,
                min_stock_level: input.min_stock_level,
                cost_per_unit: input.cost_per_unit,
                branch_id,
            })
            .await?;

        tracing::info!(item_id = %item.id, name = %item.name, branch_id = %branch_id, "Inventory item created");
        Ok(item)
    }

    /// Update descriptive fields, threshold, cost, branch or active flag
    pub async fn update_item(
        &self,
        id: Uuid,
        input: UpdateInventoryItemInput,
    ) -> AppResult<InventoryItem> {
        input.validate()?;

        self.store
            .update_item(id, &input)
            .await?
            .ok_or_else(|| AppError::NotFound("Inventory item".to_string()))
    }

    /// Manual stock adjustment (purchase, return, correction)
    pub async fn adjust_stock(
        &self,
        item_id: Uuid,
        input: StockAdjustmentInput,
    ) -> AppResult<InventoryItem> {
        validate_positive_quantity(input.quantity)
            .map_err(|msg| AppError::validation("quantity", msg))?;

        let item = self.store.apply_adjustment(item_id, &input).await?;

        tracing::info!(
            item_id = %item_id,
            kind = %input.kind.movement_kind(),
            quantity = %input.quantity,
            new_stock = %item.current_stock,
            "Stock adjusted"
        );
        if item.is_low_stock() {
            tracing::warn!(item_id = %item_id, name = %item.name, stock = %item.current_stock, "Item at or below minimum stock level");
        }

        Ok(item)
    }

    /// Deduct raw materials for an event's finalized menu.
    ///
    /// All required materials are deducted or none are. The whole unit of
    /// work is bounded by the configured deduction timeout; on expiry the
    /// transaction is dropped (and rolled back) and a retryable error is
    /// returned.
    pub async fn deduct_for_event(
        &self,
        event_id: Uuid,
        menu_items: &[MenuSelection],
        guest_count: i32,
    ) -> AppResult<DeductionOutcome> {
        self.deduct_in_scope(None, event_id, menu_items, guest_count)
            .await
    }

    /// [`deduct_for_event`](Self::deduct_for_event) for a branch-bound
    /// caller: every required material must belong to `scope`
    pub async fn deduct_in_scope(
        &self,
        scope: Option<Uuid>,
        event_id: Uuid,
        menu_items: &[MenuSelection],
        guest_count: i32,
    ) -> AppResult<DeductionOutcome> {
        validate_guest_count(guest_count).map_err(|msg| AppError::validation("guest_count", msg))?;
        validate_menu_selections(menu_items).map_err(|msg| AppError::validation("menu_items", msg))?;

        let dish_ids: Vec<Uuid> = menu_items.iter().map(|m| m.menu_item_id).collect();
        let ratios = self.store.ingredient_ratios(&dish_ids).await?;
        let requirements = aggregate_requirements(menu_items, guest_count, &ratios)?;

        if let Some(branch_id) = scope {
            self.ensure_all_in_scope(&requirements.material_ids(), branch_id)
                .await?;
        }

        if !requirements.dishes_without_ratios.is_empty() {
            tracing::warn!(
                event_id = %event_id,
                dishes = ?requirements.dishes_without_ratios,
                "Menu items without ingredient ratios contribute no stock requirement"
            );
        }

        if requirements.is_empty() {
            tracing::info!(event_id = %event_id, "No tracked materials required, nothing deducted");
            return Ok(DeductionOutcome::default());
        }

        let request = DeductionRequest {
            event_id,
            requirements,
            note: deduction_note(event_id, guest_count),
        };

        let result = tokio::time::timeout(self.deduction_timeout, self.store.apply_deduction(&request))
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "Stock deduction for event {} exceeded {}s and was rolled back",
                    event_id,
                    self.deduction_timeout.as_secs()
                ))
            })?;

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    event_id = %event_id,
                    guest_count,
                    materials = outcome.deducted.len(),
                    warnings = outcome.warnings.len(),
                    "Stock deducted for event"
                );
                for warning in &outcome.warnings {
                    tracing::warn!(
                        item_id = %warning.inventory_item_id,
                        name = %warning.name,
                        stock = %warning.current_stock,
                        min = %warning.min_stock_level,
                        "Item dropped to or below minimum stock level"
                    );
                }
            }
            Err(AppError::InsufficientStock(shortfalls)) => {
                tracing::warn!(event_id = %event_id, short = shortfalls.len(), "Stock deduction rejected: insufficient stock");
            }
            Err(e) => {
                tracing::warn!(event_id = %event_id, error = %e, "Stock deduction failed");
            }
        }

        result
    }

    /// Deduct stock for an event using the menu recorded by the booking
    /// subsystem.
    ///
    /// An event of another branch than `scope` is reported as missing.
    pub async fn finalize_event_menu(
        &self,
        event_id: Uuid,
        scope: Option<Uuid>,
    ) -> AppResult<DeductionOutcome> {
        let menu = self
            .store
            .event_menu(event_id)
            .await?
            .filter(|menu| scope.map_or(true, |b| menu.branch_id == b))
            .ok_or_else(|| AppError::NotFound("Event".to_string()))?;

        self.deduct_in_scope(scope, menu.event_id, &menu.selections, menu.guest_count)
            .await
    }

    /// Items at or below their minimum stock level, most critical first
    pub async fn low_stock_items(&self, branch_id: Option<Uuid>) -> AppResult<Vec<LowStockItem>> {
        self.store.low_stock_items(branch_id).await
    }

    /// Movements written for an event, oldest first.
    ///
    /// A branch-bound caller sees the event as missing when any of its
    /// movements touches another branch's material.
    pub async fn event_movements(
        &self,
        event_id: Uuid,
        scope: Option<Uuid>,
    ) -> AppResult<Vec<StockMovement>> {
        let movements = self.store.event_movements(event_id).await?;

        if let Some(branch_id) = scope {
            let mut ids: Vec<Uuid> = movements.iter().map(|m| m.inventory_item_id).collect();
            ids.sort();
            ids.dedup();
            self.ensure_all_in_scope(&ids, branch_id)
                .await
                .map_err(|_| AppError::NotFound("Event".to_string()))?;
        }

        Ok(movements)
    }

    /// Rebuild an item's balance from its full movement log
    pub async fn audit_item(&self, id: Uuid) -> AppResult<LedgerAudit> {
        let item = self.require_item(id).await?;

        let mut history = self.store.item_movements(id, None).await?;
        history.reverse();
        let replayed_stock = replay_balance(&history);
        let consistent = replayed_stock == Some(item.current_stock);

        if !consistent {
            tracing::error!(
                item_id = %id,
                recorded = %item.current_stock,
                replayed = ?replayed_stock,
                "Ledger balance does not match its movement log"
            );
        }

        Ok(LedgerAudit {
            inventory_item_id: id,
            recorded_stock: item.current_stock,
            replayed_stock,
            movement_count: history.len(),
            consistent,
        })
    }

    /// Fail with NotFound when the item lies outside the caller's branch
    pub async fn ensure_in_scope(&self, id: Uuid, scope: Option<Uuid>) -> AppResult<()> {
        let item = self.require_item(id).await?;
        match scope {
            Some(branch_id) if item.branch_id != branch_id => {
                tracing::debug!(item_id = %id, branch_id = %branch_id, "Item outside caller branch");
                Err(AppError::NotFound("Inventory item".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Fail with NotFound unless every item exists and belongs to `branch_id`
    async fn ensure_all_in_scope(&self, ids: &[Uuid], branch_id: Uuid) -> AppResult<()> {
        for id in ids {
            self.ensure_in_scope(*id, Some(branch_id)).await?;
        }
        Ok(())
    }

    async fn require_item(&self, id: Uuid) -> AppResult<InventoryItem> {
        self.store
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Inventory item".to_string()))
    }
}

/// Caller-facing summary of a finalized menu
pub fn finalize_message(outcome: &DeductionOutcome) -> String {
    if outcome.warnings.is_empty() {
        "Menu finalized. All stock levels are healthy.".to_string()
    } else {
        format!(
            "Menu finalized. {} item(s) below minimum stock level.",
            outcome.warnings.len()
        )
    }
}
