//! PostgreSQL ledger store
//!
//! Deductions run at READ COMMITTED and lock the affected `inventory_items`
//! rows with `SELECT … ORDER BY id FOR UPDATE`. A row read under its lock is
//! the latest committed version, so the sufficiency check and the write see
//! the same balance. Deductions over disjoint materials never wait on each
//! other; `CHECK (current_stock >= 0)` backs the check at the table level.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    DeductionOutcome, EventMenu, IngredientRatio, InventoryItem, LowStockItem, MenuSelection,
    MovementKind, NewInventoryItem, StockAdjustmentInput, StockMovement, UpdateInventoryItemInput,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{stock_out_of_range, DeductionRequest, LedgerStore};
use crate::error::{AppError, AppResult};
use crate::services::deduction::{plan_deduction, LockedRow};

const ITEM_COLUMNS: &str = "id, name, category, unit, current_stock, min_stock_level, \
                            cost_per_unit, branch_id, is_active, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, inventory_item_id, kind, quantity, event_id, notes, created_at";

/// Row for inventory item queries
#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    name: String,
    category: String,
    unit: String,
    current_stock: Decimal,
    min_stock_level: Decimal,
    cost_per_unit: Decimal,
    branch_id: Uuid,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ItemRow> for InventoryItem {
    fn from(r: ItemRow) -> Self {
        InventoryItem {
            id: r.id,
            name: r.name,
            category: r.category,
            unit: r.unit,
            current_stock: r.current_stock,
            min_stock_level: r.min_stock_level,
            cost_per_unit: r.cost_per_unit,
            branch_id: r.branch_id,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Row for stock movement queries
#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    inventory_item_id: Uuid,
    kind: String,
    quantity: Decimal,
    event_id: Option<Uuid>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = AppError;

    fn try_from(r: MovementRow) -> Result<Self, Self::Error> {
        Ok(StockMovement {
            id: r.id,
            inventory_item_id: r.inventory_item_id,
            kind: r
                .kind
                .parse::<MovementKind>()
                .map_err(|e| AppError::Internal(e.to_string()))?,
            quantity: r.quantity,
            event_id: r.event_id,
            notes: r.notes,
            created_at: r.created_at,
        })
    }
}

/// Row locked by a deduction
#[derive(Debug, FromRow)]
struct LockedItemRow {
    id: Uuid,
    name: String,
    current_stock: Decimal,
    min_stock_level: Decimal,
}

impl From<LockedItemRow> for LockedRow {
    fn from(r: LockedItemRow) -> Self {
        LockedRow {
            id: r.id,
            name: r.name,
            current_stock: r.current_stock,
            min_stock_level: r.min_stock_level,
        }
    }
}

/// Row for ingredient ratio queries
#[derive(Debug, FromRow)]
struct RatioRow {
    menu_item_id: Uuid,
    inventory_item_id: Uuid,
    quantity_per_serving: Decimal,
    unit: String,
    material_name: String,
    material_unit: String,
}

impl From<RatioRow> for IngredientRatio {
    fn from(r: RatioRow) -> Self {
        IngredientRatio {
            menu_item_id: r.menu_item_id,
            inventory_item_id: r.inventory_item_id,
            quantity_per_serving: r.quantity_per_serving,
            unit: r.unit,
            material_name: r.material_name,
            material_unit: r.material_unit,
        }
    }
}

/// Row for the low-stock query
#[derive(Debug, FromRow)]
struct LowStockRow {
    id: Uuid,
    name: String,
    category: String,
    unit: String,
    current_stock: Decimal,
    min_stock_level: Decimal,
    branch_id: Uuid,
}

/// Map lock contention reported by PostgreSQL onto retryable errors.
///
/// 40001 serialization_failure (only from a concurrent update of a row
/// outside the canonical lock order), 40P01 deadlock_detected,
/// 55P03 lock_not_available (raised when `lock_timeout` expires).
fn classify_contention(err: AppError) -> AppError {
    if let AppError::DatabaseError(db_err) = &err {
        if let Some(code) = db_err.as_database_error().and_then(|e| e.code()) {
            match code.as_ref() {
                "40001" | "40P01" => {
                    return AppError::Transient(format!(
                        "Concurrent inventory update detected (SQLSTATE {}), retry the request",
                        code
                    ))
                }
                "55P03" => {
                    return AppError::Timeout("Timed out waiting for inventory row lock".to_string())
                }
                _ => {}
            }
        }
    }
    err
}

/// PostgreSQL-backed [`LedgerStore`]
#[derive(Clone)]
pub struct PgLedgerStore {
    db: PgPool,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    /// Create a new PgLedgerStore instance
    pub fn new(db: PgPool, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }

    /// Bound row-lock waits for the rest of the transaction
    async fn set_lock_timeout(&self, tx: &mut Transaction<'_, Postgres>) -> AppResult<()> {
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn insert_movement(
        tx: &mut Transaction<'_, Postgres>,
        item_id: Uuid,
        kind: MovementKind,
        quantity: Decimal,
        event_id: Option<Uuid>,
        notes: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (inventory_item_id, kind, quantity, event_id, notes)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(item_id)
        .bind(kind.as_str())
        .bind(quantity)
        .bind(event_id)
        .bind(notes)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn deduct_in_transaction(&self, request: &DeductionRequest) -> AppResult<DeductionOutcome> {
        let mut tx = self.db.begin().await?;

        // Must be the first statement; overrides default_transaction_isolation
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;
        self.set_lock_timeout(&mut tx).await?;

        let recorded = sqlx::query(
            "INSERT INTO event_stock_deductions (event_id) VALUES ($1) ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(request.event_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if recorded == 0 {
            return Err(AppError::Conflict {
                resource: "event_id".to_string(),
                message: format!("Stock has already been deducted for event {}", request.event_id),
            });
        }

        let ids = request.requirements.material_ids();
        let locked: Vec<LockedRow> = sqlx::query_as::<_, LockedItemRow>(
            r#"
            SELECT id, name, current_stock, min_stock_level
            FROM inventory_items
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(LockedRow::from)
        .collect();

        // An early return drops `tx`, which rolls it back
        let plan = plan_deduction(&request.requirements, &locked)?;

        for line in &plan.lines {
            sqlx::query(
                "UPDATE inventory_items SET current_stock = $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(line.remaining)
            .bind(line.inventory_item_id)
            .execute(&mut *tx)
            .await?;

            Self::insert_movement(
                &mut tx,
                line.inventory_item_id,
                MovementKind::Deduction,
                line.quantity,
                Some(request.event_id),
                Some(&request.note),
            )
            .await?;
        }

        tx.commit().await?;

        Ok(plan.outcome())
    }

    async fn adjust_in_transaction(
        &self,
        item_id: Uuid,
        adjustment: &StockAdjustmentInput,
    ) -> AppResult<InventoryItem> {
        let mut tx = self.db.begin().await?;
        self.set_lock_timeout(&mut tx).await?;

        let current = sqlx::query_scalar::<_, Decimal>(
            "SELECT current_stock FROM inventory_items WHERE id = $1 FOR UPDATE",
        )
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Inventory item".to_string()))?;

        let new_stock = adjustment
            .kind
            .apply(current, adjustment.quantity)
            .ok_or_else(stock_out_of_range)?;

        let item = sqlx::query_as::<_, ItemRow>(&format!(
            "UPDATE inventory_items SET current_stock = $1, updated_at = NOW() \
             WHERE id = $2 RETURNING {ITEM_COLUMNS}"
        ))
        .bind(new_stock)
        .bind(item_id)
        .fetch_one(&mut *tx)
        .await?;

        Self::insert_movement(
            &mut tx,
            item_id,
            adjustment.kind.movement_kind(),
            adjustment.quantity,
            None,
            adjustment.notes.as_deref(),
        )
        .await?;

        tx.commit().await?;

        Ok(item.into())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn list_items(&self, branch_id: Option<Uuid>) -> AppResult<Vec<InventoryItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM inventory_items
            WHERE is_active = true
              AND ($1::uuid IS NULL OR branch_id = $1)
            ORDER BY name ASC
            "#
        ))
        .bind(branch_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_item(&self, id: Uuid) -> AppResult<Option<InventoryItem>> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn item_movements(&self, item_id: Uuid, limit: Option<i64>) -> AppResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements
            WHERE inventory_item_id = $1
            ORDER BY seq DESC
            LIMIT $2
            "#
        ))
        .bind(item_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(StockMovement::try_from).collect()
    }

    async fn event_movements(&self, event_id: Uuid) -> AppResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE event_id = $1 ORDER BY seq ASC"
        ))
        .bind(event_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(StockMovement::try_from).collect()
    }

    async fn create_item(&self, item: NewInventoryItem) -> AppResult<InventoryItem> {
        let mut tx = self.db.begin().await?;

        let created = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            INSERT INTO inventory_items (name, category, unit, current_stock, min_stock_level, cost_per_unit, branch_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(&item.name)
        .bind(&item.category)
        .bind(&item.unit)
        .bind(item.current_stock)
        .bind(item.min_stock_level)
        .bind(item.cost_per_unit)
        .bind(item.branch_id)
        .fetch_one(&mut *tx)
        .await?;

        if created.current_stock > Decimal::ZERO {
            Self::insert_movement(
                &mut tx,
                created.id,
                MovementKind::Adjustment,
                created.current_stock,
                None,
                Some("Opening balance"),
            )
            .await?;
        }

        tx.commit().await?;

        Ok(created.into())
    }

    async fn update_item(
        &self,
        id: Uuid,
        changes: &UpdateInventoryItemInput,
    ) -> AppResult<Option<InventoryItem>> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            UPDATE inventory_items
            SET name = COALESCE($2, name),
                category = COALESCE($3, category),
                unit = COALESCE($4, unit),
                min_stock_level = COALESCE($5, min_stock_level),
                cost_per_unit = COALESCE($6, cost_per_unit),
                branch_id = COALESCE($7, branch_id),
                is_active = COALESCE($8, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.category)
        .bind(&changes.unit)
        .bind(changes.min_stock_level)
        .bind(changes.cost_per_unit)
        .bind(changes.branch_id)
        .bind(changes.is_active)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn ingredient_ratios(&self, menu_item_ids: &[Uuid]) -> AppResult<Vec<IngredientRatio>> {
        let rows = sqlx::query_as::<_, RatioRow>(
            r#"
            SELECT mii.menu_item_id, mii.inventory_item_id, mii.quantity_per_serving, mii.unit,
                   ii.name AS material_name, ii.unit AS material_unit
            FROM menu_item_ingredients mii
            JOIN inventory_items ii ON ii.id = mii.inventory_item_id
            WHERE mii.menu_item_id = ANY($1)
            "#,
        )
        .bind(menu_item_ids)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn event_menu(&self, event_id: Uuid) -> AppResult<Option<EventMenu>> {
        let event = sqlx::query_as::<_, (Uuid, i32)>(
            "SELECT branch_id, guest_count FROM events WHERE id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.db)
        .await?;

        let Some((branch_id, guest_count)) = event else {
            return Ok(None);
        };

        let selections = sqlx::query_as::<_, (Uuid, i32)>(
            "SELECT menu_item_id, quantity FROM event_menu_selections WHERE event_id = $1 ORDER BY menu_item_id",
        )
        .bind(event_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|(menu_item_id, quantity)| MenuSelection { menu_item_id, quantity })
        .collect();

        Ok(Some(EventMenu {
            event_id,
            branch_id,
            guest_count,
            selections,
        }))
    }

    async fn apply_deduction(&self, request: &DeductionRequest) -> AppResult<DeductionOutcome> {
        if request.requirements.is_empty() {
            return Ok(DeductionOutcome::default());
        }
        self.deduct_in_transaction(request)
            .await
            .map_err(classify_contention)
    }

    async fn apply_adjustment(
        &self,
        item_id: Uuid,
        adjustment: &StockAdjustmentInput,
    ) -> AppResult<InventoryItem> {
        self.adjust_in_transaction(item_id, adjustment)
            .await
            .map_err(classify_contention)
    }

    async fn low_stock_items(&self, branch_id: Option<Uuid>) -> AppResult<Vec<LowStockItem>> {
        let rows = sqlx::query_as::<_, LowStockRow>(
            r#"
            SELECT id, name, category, unit, current_stock, min_stock_level, branch_id
            FROM inventory_items
            WHERE is_active = true
              AND current_stock <= min_stock_level
              AND ($1::uuid IS NULL OR branch_id = $1)
            ORDER BY (current_stock - min_stock_level) ASC, name ASC
            "#,
        )
        .bind(branch_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| LowStockItem {
                id: r.id,
                name: r.name,
                category: r.category,
                unit: r.unit,
                current_stock: r.current_stock,
                min_stock_level: r.min_stock_level,
                branch_id: r.branch_id,
            })
            .collect())
    }
}
