//! HTTP handlers for inventory ledger endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use shared::{
    ApiResponse, CreateInventoryItemInput, DeductForEventInput, DeductionOutcome, InventoryItem,
    InventoryItemDetail, LowStockItem, Role, StockAdjustmentInput, UpdateInventoryItemInput,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{AuthUser, CurrentUser};
use crate::services::inventory::{InventoryService, LedgerAudit};
use crate::AppState;

const READ_ROLES: &[Role] = &[Role::Owner, Role::BranchManager, Role::Operations];
const CATALOG_ROLES: &[Role] = &[Role::Owner, Role::BranchManager];
const STOCK_ROLES: &[Role] = &[Role::Owner, Role::BranchManager, Role::Operations];

/// Query parameters for branch-scoped listings
#[derive(Debug, Default, Deserialize)]
pub struct BranchQuery {
    pub branch_id: Option<Uuid>,
}

fn service(state: &AppState) -> InventoryService {
    InventoryService::new(state.store.clone(), &state.config.ledger)
}

/// Branch-bound users may not assign items to another branch
fn guard_branch_assignment(user: &AuthUser, requested: Option<Uuid>) -> AppResult<()> {
    match (user.branch_id, requested) {
        (Some(own), Some(requested)) if own != requested => {
            tracing::warn!(user_id = %user.user_id, branch_id = %requested, "Cross-branch assignment refused");
            Err(AppError::InsufficientPermissions)
        }
        _ => Ok(()),
    }
}

/// List active inventory items
pub async fn list_items(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<BranchQuery>,
) -> AppResult<Json<ApiResponse<Vec<InventoryItem>>>> {
    current_user.0.require_role(READ_ROLES)?;
    let scope = current_user.0.branch_scope(query.branch_id);
    let items = service(&state).list_items(scope).await?;
    Ok(Json(ApiResponse::ok(items)))
}

/// Items at or below their minimum stock level
pub async fn get_low_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<BranchQuery>,
) -> AppResult<Json<ApiResponse<Vec<LowStockItem>>>> {
    current_user.0.require_role(READ_ROLES)?;
    let scope = current_user.0.branch_scope(query.branch_id);
    let items = service(&state).low_stock_items(scope).await?;
    Ok(Json(ApiResponse::ok(items)))
}

/// Get an item with its recent stock movements
pub async fn get_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<InventoryItemDetail>>> {
    current_user.0.require_role(READ_ROLES)?;
    let service = service(&state);
    service
        .ensure_in_scope(item_id, current_user.0.branch_scope(None))
        .await?;
    let detail = service.get_item(item_id).await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// Create an inventory item
pub async fn create_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateInventoryItemInput>,
) -> AppResult<Json<ApiResponse<InventoryItem>>> {
    current_user.0.require_role(CATALOG_ROLES)?;
    guard_branch_assignment(&current_user.0, input.branch_id)?;
    let item = service(&state)
        .create_item(current_user.0.branch_scope(None), input)
        .await?;
    Ok(Json(ApiResponse::with_message(item, "Inventory item created")))
}

/// Update an inventory item's catalog fields
pub async fn update_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<UpdateInventoryItemInput>,
) -> AppResult<Json<ApiResponse<InventoryItem>>> {
    current_user.0.require_role(CATALOG_ROLES)?;
    guard_branch_assignment(&current_user.0, input.branch_id)?;
    let service = service(&state);
    service
        .ensure_in_scope(item_id, current_user.0.branch_scope(None))
        .await?;
    let item = service.update_item(item_id, input).await?;
    Ok(Json(ApiResponse::ok(item)))
}

/// Record a purchase, return or stock correction
pub async fn adjust_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<StockAdjustmentInput>,
) -> AppResult<Json<ApiResponse<InventoryItem>>> {
    current_user.0.require_role(STOCK_ROLES)?;
    let service = service(&state);
    service
        .ensure_in_scope(item_id, current_user.0.branch_scope(None))
        .await?;
    let item = service.adjust_stock(item_id, input).await?;
    Ok(Json(ApiResponse::with_message(item, "Stock adjusted")))
}

/// Deduct raw materials for an event's menu
pub async fn deduct_for_event(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<DeductForEventInput>,
) -> AppResult<Json<ApiResponse<DeductionOutcome>>> {
    current_user.0.require_role(STOCK_ROLES)?;
    let outcome = service(&state)
        .deduct_in_scope(
            current_user.0.branch_scope(None),
            input.event_id,
            &input.menu_items,
            input.guest_count,
        )
        .await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// Compare an item's balance with its replayed movement log
pub async fn audit_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<LedgerAudit>>> {
    current_user.0.require_role(CATALOG_ROLES)?;
    let service = service(&state);
    service
        .ensure_in_scope(item_id, current_user.0.branch_scope(None))
        .await?;
    let audit = service.audit_item(item_id).await?;
    Ok(Json(ApiResponse::ok(audit)))
}
