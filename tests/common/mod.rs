#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use ebook_store_api::{
    config::{AppConfig, JwtConfig, StripeConfig},
    db::{create_orm_conn, run_migrations},
    dto::{
        orders::{CreateOrderRequest, OrderItemCreate},
        products::CreateProductRequest,
    },
    entity::{Role, users},
    middleware::auth::AuthUser,
    payments::{NewPaymentIntent, PaymentError, PaymentGateway, PaymentIntent},
    state::AppState,
};
use jsonwebtoken::Algorithm;
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ConnectionTrait, Set, Statement};
use secrecy::SecretString;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

pub fn test_config(database_url: &str, webhook_secret: Option<&str>) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        jwt: JwtConfig {
            secret: SecretString::from("integration-test-secret".to_string()),
            algorithm: Algorithm::HS256,
            expires_in: Duration::from_secs(30 * 60),
        },
        stripe: StripeConfig {
            secret_key: None,
            webhook_secret: webhook_secret.map(|s| SecretString::from(s.to_string())),
            api_base: "http://127.0.0.1:9".to_string(),
            currency: "eur".to_string(),
            timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(1),
        },
        payments_mock_enabled: true,
        media_dir: std::env::temp_dir().join("ebook-store-api-tests"),
        max_upload_bytes: 1024 * 1024,
        seed_on_startup: false,
    }
}

/// A `Stripe-Signature` header value for `payload` signed now.
pub fn sign(payload: &[u8], secret: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let signature = ebook_store_api::payments::webhook::compute_signature(secret, timestamp, payload)
        .expect("valid secret");
    format!("t={timestamp},v1={signature}")
}

/// Database for the integration flows; `None` (and a note on stderr) skips them.
pub fn database_url() -> Option<String> {
    match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            None
        }
    }
}

/// In-memory processor: one intent per order, keyed like the real client.
#[derive(Default)]
pub struct FakeGateway {
    pub intents: Mutex<HashMap<String, PaymentIntent>>,
    pub created: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(
        &self,
        request: &NewPaymentIntent,
    ) -> Result<PaymentIntent, PaymentError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let id = format!("pi_{}", request.order_id.simple());
        let intent = PaymentIntent {
            id: id.clone(),
            client_secret: Some(format!("{id}_secret_{}", request.amount_cents)),
            status: "requires_payment_method".to_string(),
        };
        self.intents.lock().unwrap().insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .cloned()
            .ok_or_else(|| PaymentError::Api {
                status: 404,
                message: format!("No such payment_intent: '{intent_id}'"),
            })
    }
}

pub async fn setup_state(
    database_url: &str,
    gateway: Arc<dyn PaymentGateway>,
) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, audit_logs, products, users CASCADE",
    ))
    .await?;

    Ok(AppState::new(
        orm,
        test_config(database_url, Some(WEBHOOK_SECRET)),
        Some(gateway),
    ))
}

pub async fn create_admin(state: &AppState, email: &str) -> anyhow::Result<users::Model> {
    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        first_name: Set(None),
        last_name: Set(None),
        role: Set(Role::Admin),
        is_active: Set(true),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user)
}

pub fn auth_user(user: users::Model) -> AuthUser {
    AuthUser {
        user_id: user.id,
        role: user.role,
        user,
    }
}

pub fn new_product(title: &str, price_cents: i64) -> CreateProductRequest {
    CreateProductRequest {
        title: title.to_string(),
        description: Some(format!("About {title}")),
        long_description: None,
        price_cents,
        cover_image_url: None,
        file_key: format!("ebooks/{}.pdf", title.to_lowercase()),
        sample_pdf_url: None,
        is_active: true,
    }
}

pub fn order_of(ids: &[Uuid]) -> CreateOrderRequest {
    CreateOrderRequest {
        items: ids
            .iter()
            .map(|&product_id| OrderItemCreate { product_id })
            .collect(),
    }
}
