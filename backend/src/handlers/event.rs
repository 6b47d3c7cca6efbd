//! Event hooks into the inventory ledger

use axum::{
    extract::{Path, State},
    Json,
};
use shared::{ApiResponse, DeductionOutcome, Role, StockMovement};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::inventory::{finalize_message, InventoryService};
use crate::AppState;

/// Finalize an event's menu and deduct its raw materials
pub async fn finalize_menu(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(event_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<DeductionOutcome>>> {
    current_user
        .0
        .require_role(&[Role::Owner, Role::BranchManager, Role::Operations])?;

    let service = InventoryService::new(state.store.clone(), &state.config.ledger);
    let outcome = service
        .finalize_event_menu(event_id, current_user.0.branch_scope(None))
        .await?;
    let message = finalize_message(&outcome);

    Ok(Json(ApiResponse::with_message(outcome, message)))
}

/// Stock movements written for an event
pub async fn get_event_movements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(event_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<StockMovement>>>> {
    current_user
        .0
        .require_role(&[Role::Owner, Role::BranchManager, Role::Operations, Role::Accounts])?;

    let service = InventoryService::new(state.store.clone(), &state.config.ledger);
    let movements = service
        .event_movements(event_id, current_user.0.branch_scope(None))
        .await?;
    Ok(Json(ApiResponse::ok(movements)))
}
