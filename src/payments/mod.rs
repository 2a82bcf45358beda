//! Payment processor integration.
//!
//! Handlers talk to the processor through [`PaymentGateway`] so the order
//! flow can be exercised with an in-memory gateway in tests. [`StripeClient`]
//! is the production implementation; [`webhook`] verifies and decodes the
//! events Stripe pushes back.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

pub mod stripe;
pub mod webhook;

pub use stripe::StripeClient;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// The subset of a processor payment intent the store relies on.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
}

impl NewPaymentIntent {
    /// Stable per order, so concurrent or retried create calls resolve to the
    /// same remote intent.
    pub fn idempotency_key(&self) -> String {
        format!("order-{}-payment-intent", self.order_id)
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: &NewPaymentIntent)
    -> Result<PaymentIntent, PaymentError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError>;
}
