#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::Value;
use sha2::Sha256;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use palito_api::{
    api_v1_routes,
    auth::ROLE_ADMIN,
    config::AppConfig,
    db,
    entities::{coupon, customer, product},
    events::{self, EventContext, EventSender},
    handlers::AppServices,
    services::invoicing::SellerInfo,
    AppState,
};

pub const WEBHOOK_SECRET: &str = "whsec_integration_test";

/// Application harness backed by a file-based SQLite database in a temp dir.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _tmp: tempfile::TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let tmp = tempfile::tempdir().expect("temp dir");
        let db_path = tmp.path().join("palito_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "integration_test_secret_that_is_long_enough_42".to_string(),
            3600,
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.stripe_webhook_secret = Some(WEBHOOK_SECRET.to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("test database");
        db::run_migrations(&pool).await.expect("migrations");

        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);

        // Worker runs without SMTP: events are consumed and dropped.
        tokio::spawn(events::process_events(
            event_rx,
            EventContext {
                db: db_arc.clone(),
                mailer: None,
                seller: SellerInfo::from_config(&cfg),
            },
        ));

        let services = AppServices::new(db_arc.clone(), &cfg, Some(Arc::new(event_sender.clone())));

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            _tmp: tmp,
        }
    }

    pub fn customer_token(&self, subject: &str, email: &str, name: &str) -> String {
        self.state
            .services
            .auth
            .issue_token(subject, Some(email), Some(name), None)
            .expect("customer token")
    }

    pub fn admin_token(&self) -> String {
        self.state
            .services
            .auth
            .issue_token("admin_1", Some("admin@test.local"), Some("Admin"), Some(ROLE_ADMIN))
            .expect("admin token")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        self.router.clone().oneshot(request).await.expect("response")
    }

    /// Raw POST with a computed gateway signature header.
    pub async fn signed_webhook(&self, payload: &str) -> Response {
        let timestamp = Utc::now().timestamp();
        let signature = webhook_signature(WEBHOOK_SECRET, timestamp, payload.as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                "Stripe-Signature",
                format!("t={},v1={}", timestamp, signature),
            )
            .body(Body::from(payload.to_string()))
            .expect("request");

        self.router.clone().oneshot(request).await.expect("response")
    }

    pub async fn seed_product(&self, name: &str, price: i64, stock: i32) -> product::Model {
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set("seeded".to_string()),
            price: Set(price),
            stock: Set(stock),
            category: Set("snacks".to_string()),
            images: Set(serde_json::json!(["https://img.test/seed.jpg"])),
            ..Default::default()
        };
        model.insert(&*self.state.db).await.expect("seed product")
    }

    pub async fn seed_percentage_coupon(&self, code: &str, percent: i64) -> coupon::Model {
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_type: Set(coupon::DiscountType::Percentage),
            discount_value: Set(percent),
            is_active: Set(true),
            expires_at: Set(None),
            created_at: Set(Utc::now()),
        };
        model.insert(&*self.state.db).await.expect("seed coupon")
    }

    pub async fn product_stock(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product exists")
            .stock
    }

    pub async fn find_customer_by_subject(&self, subject: &str) -> Option<customer::Model> {
        customer::Entity::find()
            .filter(customer::Column::AuthSubject.eq(subject))
            .one(&*self.state.db)
            .await
            .expect("query customer")
    }

    pub async fn order_count(&self) -> u64 {
        self.state
            .services
            .orders
            .count_orders()
            .await
            .expect("count orders")
    }
}

pub fn webhook_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac");
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes")
        .to_vec()
}

pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "unexpected status for response"
    );
}
