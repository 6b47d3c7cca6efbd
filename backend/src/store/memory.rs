//! In-process ledger store for tests and local development
//!
//! Mirrors the PostgreSQL locking discipline: one async mutex per ledger
//! row, always taken in ascending id order, with the committed state behind
//! a reader/writer lock so readers never see half of a deduction.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use shared::{
    DeductionOutcome, EventMenu, IngredientRatio, InventoryItem, LowStockItem, MovementKind,
    NewInventoryItem, StockAdjustmentInput, StockMovement, UpdateInventoryItemInput,
};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{stock_out_of_range, DeductionRequest, LedgerStore};
use crate::error::{AppError, AppResult};
use crate::services::deduction::{plan_deduction, LockedRow};

#[derive(Debug, Default)]
struct LedgerState {
    items: HashMap<Uuid, InventoryItem>,
    /// Append-only, in commit order
    movements: Vec<StockMovement>,
    ratios: Vec<IngredientRatio>,
    events: HashMap<Uuid, EventMenu>,
    deducted_events: HashSet<Uuid>,
}

/// In-memory [`LedgerStore`].
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
    row_locks: Mutex<HashMap<Uuid, Arc<RowMutex<()>>>>,
    lock_timeout: Duration,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl InMemoryLedgerStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            row_locks: Mutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, LedgerState>> {
        self.state
            .read()
            .map_err(|_| AppError::Internal("ledger state lock poisoned".to_string()))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, LedgerState>> {
        self.state
            .write()
            .map_err(|_| AppError::Internal("ledger state lock poisoned".to_string()))
    }

    /// Register a dish ratio (menu management owns these in production)
    pub fn add_ingredient_ratio(
        &self,
        menu_item_id: Uuid,
        inventory_item_id: Uuid,
        quantity_per_serving: Decimal,
        unit: &str,
    ) -> AppResult<()> {
        let mut state = self.write()?;
        let item = state
            .items
            .get(&inventory_item_id)
            .ok_or_else(|| AppError::NotFound("Inventory item".to_string()))?;
        let ratio = IngredientRatio {
            menu_item_id,
            inventory_item_id,
            quantity_per_serving,
            unit: unit.to_string(),
            material_name: item.name.clone(),
            material_unit: item.unit.clone(),
        };
        state.ratios.push(ratio);
        Ok(())
    }

    /// Register an event's finalized menu (the booking subsystem owns these)
    pub fn add_event(&self, menu: EventMenu) -> AppResult<()> {
        self.write()?.events.insert(menu.event_id, menu);
        Ok(())
    }

    /// Acquire row locks for the given ids in ascending order.
    ///
    /// Unknown ids are skipped; callers detect missing rows themselves.
    /// Writers of a locked row wait up to the lock timeout while the guards
    /// are held, then fail with `Timeout`.
    pub async fn lock_rows(&self, ids: &[Uuid]) -> AppResult<Vec<OwnedMutexGuard<()>>> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();

        let locks: Vec<Arc<RowMutex<()>>> = {
            let map = self
                .row_locks
                .lock()
                .map_err(|_| AppError::Internal("row lock table poisoned".to_string()))?;
            ids.iter().filter_map(|id| map.get(id).cloned()).collect()
        };

        let mut guards = Vec::with_capacity(locks.len());
        for lock in locks {
            let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    AppError::Timeout("Timed out waiting for inventory row lock".to_string())
                })?;
            guards.push(guard);
        }
        Ok(guards)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn ping(&self) -> AppResult<()> {
        self.read().map(|_| ())
    }

    async fn list_items(&self, branch_id: Option<Uuid>) -> AppResult<Vec<InventoryItem>> {
        let state = self.read()?;
        let mut items: Vec<InventoryItem> = state
            .items
            .values()
            .filter(|i| i.is_active && branch_id.map_or(true, |b| i.branch_id == b))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn get_item(&self, id: Uuid) -> AppResult<Option<InventoryItem>> {
        Ok(self.read()?.items.get(&id).cloned())
    }

    async fn item_movements(&self, item_id: Uuid, limit: Option<i64>) -> AppResult<Vec<StockMovement>> {
        let state = self.read()?;
        let limit = limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(0));
        Ok(state
            .movements
            .iter()
            .rev()
            .filter(|m| m.inventory_item_id == item_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn event_movements(&self, event_id: Uuid) -> AppResult<Vec<StockMovement>> {
        let state = self.read()?;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.event_id == Some(event_id))
            .cloned()
            .collect())
    }

    async fn create_item(&self, item: NewInventoryItem) -> AppResult<InventoryItem> {
        let now = Utc::now();
        let created = InventoryItem {
            id: Uuid::new_v4(),
            name: item.name,
            category: item.category,
            unit: item.unit,
            current_stock: item.current_stock,
            min_stock_level: item.min_stock_level,
            cost_per_unit: item.cost_per_unit,
            branch_id: item.branch_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.row_locks
            .lock()
            .map_err(|_| AppError::Internal("row lock table poisoned".to_string()))?
            .insert(created.id, Arc::new(RowMutex::new(())));

        let mut state = self.write()?;
        if created.current_stock > Decimal::ZERO {
            state.movements.push(StockMovement {
                id: Uuid::new_v4(),
                inventory_item_id: created.id,
                kind: MovementKind::Adjustment,
                quantity: created.current_stock,
                event_id: None,
                notes: Some("Opening balance".to_string()),
                created_at: now,
            });
        }
        state.items.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_item(
        &self,
        id: Uuid,
        changes: &UpdateInventoryItemInput,
    ) -> AppResult<Option<InventoryItem>> {
        let _row = self.lock_rows(&[id]).await?;
        let mut state = self.write()?;
        Ok(state.items.get_mut(&id).map(|item| {
            changes.apply_to(item);
            item.updated_at = Utc::now();
            item.clone()
        }))
    }

    async fn ingredient_ratios(&self, menu_item_ids: &[Uuid]) -> AppResult<Vec<IngredientRatio>> {
        let state = self.read()?;
        Ok(state
            .ratios
            .iter()
            .filter(|r| menu_item_ids.contains(&r.menu_item_id))
            .map(|r| {
                let mut ratio = r.clone();
                if let Some(item) = state.items.get(&r.inventory_item_id) {
                    ratio.material_name = item.name.clone();
                    ratio.material_unit = item.unit.clone();
                }
                ratio
            })
            .collect())
    }

    async fn event_menu(&self, event_id: Uuid) -> AppResult<Option<EventMenu>> {
        Ok(self.read()?.events.get(&event_id).cloned())
    }

    async fn apply_deduction(&self, request: &DeductionRequest) -> AppResult<DeductionOutcome> {
        if request.requirements.is_empty() {
            return Ok(DeductionOutcome::default());
        }

        let ids = request.requirements.material_ids();
        let _rows = self.lock_rows(&ids).await?;

        let mut guard = self.write()?;
        let state = &mut *guard;

        if state.deducted_events.contains(&request.event_id) {
            return Err(AppError::Conflict {
                resource: "event_id".to_string(),
                message: format!("Stock has already been deducted for event {}", request.event_id),
            });
        }

        let locked: Vec<LockedRow> = ids
            .iter()
            .filter_map(|id| state.items.get(id))
            .map(|item| LockedRow {
                id: item.id,
                name: item.name.clone(),
                current_stock: item.current_stock,
                min_stock_level: item.min_stock_level,
            })
            .collect();

        let plan = plan_deduction(&request.requirements, &locked)?;

        let now = Utc::now();
        for line in &plan.lines {
            if let Some(item) = state.items.get_mut(&line.inventory_item_id) {
                item.current_stock = line.remaining;
                item.updated_at = now;
            }
            state.movements.push(StockMovement {
                id: Uuid::new_v4(),
                inventory_item_id: line.inventory_item_id,
                kind: MovementKind::Deduction,
                quantity: line.quantity,
                event_id: Some(request.event_id),
                notes: Some(request.note.clone()),
                created_at: now,
            });
        }
        state.deducted_events.insert(request.event_id);

        Ok(plan.outcome())
    }

    async fn apply_adjustment(
        &self,
        item_id: Uuid,
        adjustment: &StockAdjustmentInput,
    ) -> AppResult<InventoryItem> {
        let _row = self.lock_rows(&[item_id]).await?;

        let mut guard = self.write()?;
        let state = &mut *guard;

        let item = state
            .items
            .get_mut(&item_id)
            .ok_or_else(|| AppError::NotFound("Inventory item".to_string()))?;

        // Nothing below may panic while the write guard is held
        let new_stock = adjustment
            .kind
            .apply(item.current_stock, adjustment.quantity)
            .ok_or_else(stock_out_of_range)?;

        let now = Utc::now();
        item.current_stock = new_stock;
        item.updated_at = now;

        state.movements.push(StockMovement {
            id: Uuid::new_v4(),
            inventory_item_id: item_id,
            kind: adjustment.kind.movement_kind(),
            quantity: adjustment.quantity,
            event_id: None,
            notes: adjustment.notes.clone(),
            created_at: now,
        });

        Ok(item.clone())
    }

    async fn low_stock_items(&self, branch_id: Option<Uuid>) -> AppResult<Vec<LowStockItem>> {
        let state = self.read()?;
        let mut items: Vec<LowStockItem> = state
            .items
            .values()
            .filter(|i| i.is_active && i.is_low_stock())
            .filter(|i| branch_id.map_or(true, |b| i.branch_id == b))
            .map(LowStockItem::from)
            .collect();
        items.sort_by(|a, b| a.deficit().cmp(&b.deficit()).then_with(|| a.name.cmp(&b.name)));
        Ok(items)
    }
}
