#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use storefront_api::{
    auth::ADMIN_ROLE,
    config::{AppConfig, DEV_DEFAULT_JWT_SECRET},
    db::{self, DbConfig, DbPool},
    entities::commerce::{cart_item, product, Product},
    errors::ServiceError,
    events::{self, EventSender},
    services::payments::{
        sign_payment, verify_payment_signature, GatewayOrder, GatewayOrderRequest, PaymentGateway,
    },
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const GATEWAY_SECRET: &str = "test_key_secret";

/// In-process stand-in for the payment gateway.
#[derive(Default)]
pub struct FakeGateway {
    next_id: AtomicU64,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<GatewayOrderRequest>>,
}

impl FakeGateway {
    pub fn fail_next_orders(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn requests(&self) -> Vec<GatewayOrderRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Signature the real gateway would hand the widget for this payment.
    pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
        sign_payment(GATEWAY_SECRET, order_id, payment_id).unwrap()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(
        &self,
        request: GatewayOrderRequest,
    ) -> Result<GatewayOrder, ServiceError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::GatewayError("gateway unavailable".into()));
        }
        self.requests.lock().unwrap().push(request.clone());

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut extra = serde_json::Map::new();
        extra.insert("entity".into(), Value::from("order"));
        Ok(GatewayOrder {
            id: format!("order_test{:04}", n),
            amount: request.amount,
            currency: request.currency,
            receipt: Some(request.receipt),
            status: Some("created".into()),
            extra,
        })
    }

    fn verify_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<(), ServiceError> {
        if verify_payment_signature(GATEWAY_SECRET, order_id, payment_id, signature) {
            Ok(())
        } else {
            Err(ServiceError::GatewayError(
                "Payment signature verification failed".into(),
            ))
        }
    }
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        DEV_DEFAULT_JWT_SECRET.to_string(),
        3600,
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    cfg.payment_gateway_timeout_secs = 2;
    cfg
}

/// Helper harness backed by a fresh SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: Option<tempfile::TempDir>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        Self::build(cfg, DbConfig::sqlite_in_memory(), None).await
    }

    /// File-backed database with a multi-connection pool, so transactions
    /// started from different tasks really overlap.
    pub async fn pooled() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db_config = DbConfig {
            url: format!(
                "sqlite://{}?mode=rwc",
                dir.path().join("storefront.db").display()
            ),
            max_connections: 8,
            min_connections: 1,
            sqlx_logging: false,
            ..Default::default()
        };
        Self::build(test_config(), db_config, Some(dir)).await
    }

    async fn build(
        cfg: AppConfig,
        db_config: DbConfig,
        db_dir: Option<tempfile::TempDir>,
    ) -> Self {
        let pool = db::establish_connection_with_config(&db_config)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(1024);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let gateway = Arc::new(FakeGateway::default());

        let state = AppState::new(
            Arc::new(pool),
            cfg,
            Arc::new(EventSender::new(event_tx)),
            gateway.clone(),
        );
        let router = storefront_api::build_router(state.clone());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    pub fn db(&self) -> &DbPool {
        &self.state.db
    }

    pub fn token(&self, user_id: &str) -> String {
        self.state
            .auth
            .issue_token(user_id, None, None, vec!["customer".into()])
            .unwrap()
            .access_token
    }

    pub fn admin_token(&self) -> String {
        self.state
            .auth
            .issue_token("admin-1", None, None, vec![ADMIN_ROLE.into()])
            .unwrap()
            .access_token
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let (status, _, body) = self.request_raw(method, uri, body, token).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    pub async fn seed_product(
        &self,
        id: &str,
        price: Decimal,
        sale_price: Option<Decimal>,
        stock: i32,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(id.to_string()),
            title: Set(format!("Product {}", id)),
            price: Set(price),
            sale_price: Set(sale_price),
            image_url: Set(Some(format!("https://cdn.example.com/{}.jpg", id))),
            stock: Set(stock),
            orders: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .unwrap()
    }

    pub async fn add_to_cart(&self, user_id: &str, product_id: &str, quantity: i32) {
        let now = Utc::now();
        cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id.to_string()),
            product_id: Set(product_id.to_string()),
            quantity: Set(quantity),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .unwrap();
    }

    pub async fn product_orders(&self, product_id: &str) -> i32 {
        Product::find_by_id(product_id.to_string())
            .one(self.db())
            .await
            .unwrap()
            .unwrap()
            .orders
    }
}
