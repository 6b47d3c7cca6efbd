//! HTTP API tests
//!
//! Drives the router end to end over the in-memory store: authentication,
//! role checks, branch scoping, response envelopes and error bodies.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use shared::{EventMenu, MenuSelection, Role};
use tower::ServiceExt;
use uuid::Uuid;
use venue_ops_backend::config::{
    Config, DatabaseConfig, JwtConfig, LedgerConfig, ServerConfig, StoreKind,
};
use venue_ops_backend::middleware::auth::Claims;
use venue_ops_backend::store::{InMemoryLedgerStore, LedgerStore};
use venue_ops_backend::{create_app, AppState};

const SECRET: &str = "api-test-secret";

fn test_config() -> Config {
    Config {
        environment: "test".to_string(),
        server: ServerConfig::default(),
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 0,
            acquire_timeout_secs: 1,
        },
        jwt: JwtConfig {
            secret: SECRET.to_string(),
        },
        ledger: LedgerConfig {
            store: StoreKind::Memory,
            ..LedgerConfig::default()
        },
    }
}

struct TestApp {
    app: Router,
    store: Arc<InMemoryLedgerStore>,
    branch: Uuid,
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(InMemoryLedgerStore::default());
        let dyn_store: Arc<dyn LedgerStore> = store.clone();
        Self {
            app: create_app(AppState::new(dyn_store, test_config())),
            store,
            branch: Uuid::new_v4(),
        }
    }

    fn token(&self, role: Role, branch_id: Option<Uuid>) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            role,
            branch_id: branch_id.map(|b| b.to_string()),
            exp: now + 3600,
            iat: now,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn manager(&self) -> String {
        self.token(Role::BranchManager, Some(self.branch))
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn create_item(&self, name: &str, stock: &str, min: &str) -> Uuid {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/inventory",
                Some(&self.manager()),
                Some(json!({
                    "name": name,
                    "category": "Dry goods",
                    "unit": "kg",
                    "current_stock": stock,
                    "min_stock_level": min,
                    "cost_per_unit": "1.20"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        Uuid::parse_str(body["data"]["id"].as_str().unwrap()).unwrap()
    }
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

// ============================================================================
// Authentication and Roles
// ============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "connected");
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/api/v1/inventory", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let app = TestApp::new();
    let (status, body) = app
        .call(Method::GET, "/api/v1/inventory", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_operations_cannot_create_items() {
    let app = TestApp::new();
    let token = app.token(Role::Operations, Some(app.branch));
    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/inventory",
            Some(&token),
            Some(json!({"name": "Rice", "category": "Grains", "unit": "kg"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_PERMISSIONS");
}

#[tokio::test]
async fn test_sales_cannot_read_inventory() {
    let app = TestApp::new();
    let token = app.token(Role::Sales, Some(app.branch));
    let (status, _) = app
        .call(Method::GET, "/api/v1/inventory", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ============================================================================
// Inventory Endpoints
// ============================================================================

#[tokio::test]
async fn test_create_then_adjust_and_read_back() {
    let app = TestApp::new();
    let rice = app.create_item("Rice", "0", "10").await;
    let ops = app.token(Role::Operations, Some(app.branch));

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/inventory/{}/adjust", rice),
            Some(&ops),
            Some(json!({"type": "PURCHASE", "quantity": "50", "notes": "Weekly order"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(decimal(&body["data"]["current_stock"]), Decimal::from(50));

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/inventory/{}/adjust", rice),
            Some(&ops),
            Some(json!({"type": "ADJUSTMENT", "quantity": "200"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["data"]["current_stock"]), Decimal::from(200));

    let (status, body) = app
        .call(Method::GET, &format!("/api/v1/inventory/{}", rice), Some(&ops), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Rice");
    let movements = body["data"]["stock_movements"].as_array().unwrap();
    assert_eq!(movements.len(), 2);
    assert_eq!(movements[0]["type"], "ADJUSTMENT");
    assert_eq!(movements[1]["type"], "PURCHASE");
}

#[tokio::test]
async fn test_unknown_adjustment_kind_is_rejected() {
    let app = TestApp::new();
    let rice = app.create_item("Rice", "10", "1").await;
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/inventory/{}/adjust", rice),
            Some(&app.manager()),
            Some(json!({"type": "DEDUCTION", "quantity": "5"})),
        )
        .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_zero_quantity_adjustment_is_validation_error() {
    let app = TestApp::new();
    let rice = app.create_item("Rice", "10", "1").await;
    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/inventory/{}/adjust", rice),
            Some(&app.manager()),
            Some(json!({"type": "PURCHASE", "quantity": "0"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["field"], "quantity");
}

#[tokio::test]
async fn test_deduction_endpoint_and_errors() {
    let app = TestApp::new();
    let rice = app.create_item("Rice", "20", "5").await;
    let dish = Uuid::new_v4();
    app.store
        .add_ingredient_ratio(dish, rice, Decimal::new(15, 2), "kg")
        .unwrap();
    let ops = app.token(Role::Operations, Some(app.branch));
    let event = Uuid::new_v4();
    let payload = json!({
        "event_id": event,
        "menu_items": [{"menu_item_id": dish, "quantity": 1}],
        "guest_count": 100
    });

    let (status, body) = app
        .call(Method::POST, "/api/v1/inventory/deductions", Some(&ops), Some(payload.clone()))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(decimal(&body["data"]["deducted"][0]["remaining"]), Decimal::from(5));
    assert_eq!(body["data"]["warnings"].as_array().unwrap().len(), 1);

    // Same event again
    let (status, body) = app
        .call(Method::POST, "/api/v1/inventory/deductions", Some(&ops), Some(payload))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    // Not enough left for a new event
    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/inventory/deductions",
            Some(&ops),
            Some(json!({
                "event_id": Uuid::new_v4(),
                "menu_items": [{"menu_item_id": dish, "quantity": 1}],
                "guest_count": 100
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_STOCK");
    assert_eq!(body["error"]["retryable"], false);
    let shortfalls = body["error"]["shortfalls"].as_array().unwrap();
    assert_eq!(shortfalls.len(), 1);
    assert_eq!(shortfalls[0]["material"], "Rice");
    assert_eq!(decimal(&shortfalls[0]["required"]), Decimal::from(15));
    assert_eq!(decimal(&shortfalls[0]["available"]), Decimal::from(5));
}

#[tokio::test]
async fn test_finalize_menu_reports_low_stock() {
    let app = TestApp::new();
    let rice = app.create_item("Rice", "100", "90").await;
    let dish = Uuid::new_v4();
    app.store
        .add_ingredient_ratio(dish, rice, Decimal::new(1, 1), "kg")
        .unwrap();
    let event = Uuid::new_v4();
    app.store
        .add_event(EventMenu {
            event_id: event,
            branch_id: app.branch,
            guest_count: 150,
            selections: vec![MenuSelection {
                menu_item_id: dish,
                quantity: 1,
            }],
        })
        .unwrap();

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/events/{}/finalize-menu", event),
            Some(&app.manager()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["message"], "Menu finalized. 1 item(s) below minimum stock level.");

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/v1/events/{}/stock-movements", event),
            Some(&app.manager()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["type"], "DEDUCTION");
}

#[tokio::test]
async fn test_finalize_unknown_event_is_not_found() {
    let app = TestApp::new();
    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/events/{}/finalize-menu", Uuid::new_v4()),
            Some(&app.manager()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

// ============================================================================
// Branch Scoping
// ============================================================================

#[tokio::test]
async fn test_branch_manager_sees_only_own_branch() {
    let app = TestApp::new();
    let rice = app.create_item("Rice", "1", "10").await;

    let other_branch = Uuid::new_v4();
    let other_manager = app.token(Role::BranchManager, Some(other_branch));

    let (status, body) = app
        .call(Method::GET, "/api/v1/inventory/low-stock", Some(&other_manager), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = app
        .call(Method::GET, &format!("/api/v1/inventory/{}", rice), Some(&other_manager), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Query parameter cannot widen a branch-bound scope
    let (_, body) = app
        .call(
            Method::GET,
            &format!("/api/v1/inventory?branch_id={}", app.branch),
            Some(&other_manager),
            None,
        )
        .await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_owner_without_branch_chooses_scope() {
    let app = TestApp::new();
    app.create_item("Rice", "1", "10").await;
    let owner = app.token(Role::Owner, None);

    let (_, all) = app
        .call(Method::GET, "/api/v1/inventory", Some(&owner), None)
        .await;
    assert_eq!(all["data"].as_array().unwrap().len(), 1);

    let (_, scoped) = app
        .call(
            Method::GET,
            &format!("/api/v1/inventory/low-stock?branch_id={}", Uuid::new_v4()),
            Some(&owner),
            None,
        )
        .await;
    assert!(scoped["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_manager_cannot_assign_other_branch() {
    let app = TestApp::new();
    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/inventory",
            Some(&app.manager()),
            Some(json!({
                "name": "Rice",
                "category": "Grains",
                "unit": "kg",
                "branch_id": Uuid::new_v4()
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_branch_bound_user_cannot_touch_other_branch_events() {
    let app = TestApp::new();
    let rice = app.create_item("Rice", "100", "10").await;
    let dish = Uuid::new_v4();
    app.store
        .add_ingredient_ratio(dish, rice, Decimal::new(1, 1), "kg")
        .unwrap();
    let event = Uuid::new_v4();
    app.store
        .add_event(EventMenu {
            event_id: event,
            branch_id: app.branch,
            guest_count: 10,
            selections: vec![MenuSelection {
                menu_item_id: dish,
                quantity: 1,
            }],
        })
        .unwrap();

    let other_ops = app.token(Role::Operations, Some(Uuid::new_v4()));

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/inventory/deductions",
            Some(&other_ops),
            Some(json!({
                "event_id": Uuid::new_v4(),
                "menu_items": [{"menu_item_id": dish, "quantity": 1}],
                "guest_count": 10
            })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/events/{}/finalize-menu", event),
            Some(&other_ops),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let stock = app.store.get_item(rice).await.unwrap().unwrap().current_stock;
    assert_eq!(stock, Decimal::from(100));

    // The owning branch finalizes; the other branch still cannot read it
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/events/{}/finalize-menu", event),
            Some(&app.manager()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/v1/events/{}/stock-movements", event),
            Some(&other_ops),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let owner = app.token(Role::Owner, None);
    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/v1/events/{}/stock-movements", event),
            Some(&owner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}
