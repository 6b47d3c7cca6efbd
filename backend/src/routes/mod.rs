//! Route definitions for the Venue Operations inventory API

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - inventory ledger
        .nest("/inventory", inventory_routes(state.clone()))
        // Protected routes - event menu hooks
        .nest("/events", event_routes(state))
}

/// Inventory routes (protected)
fn inventory_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_items).post(handlers::create_item))
        .route("/low-stock", get(handlers::get_low_stock))
        .route("/deductions", post(handlers::deduct_for_event))
        .route(
            "/:item_id",
            get(handlers::get_item).patch(handlers::update_item),
        )
        .route("/:item_id/adjust", post(handlers::adjust_stock))
        .route("/:item_id/audit", get(handlers::audit_item))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Event routes (protected)
fn event_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/:event_id/finalize-menu", post(handlers::finalize_menu))
        .route("/:event_id/stock-movements", get(handlers::get_event_movements))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
