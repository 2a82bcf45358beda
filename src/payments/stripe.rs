use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{NewPaymentIntent, PaymentError, PaymentGateway, PaymentIntent};
use crate::config::StripeConfig;

/// Minimal Stripe REST client covering payment intents.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl StripeClient {
    /// Build a client from the Stripe settings, or `None` when no secret key
    /// is configured.
    pub fn from_config(config: &StripeConfig) -> Result<Option<Self>, PaymentError> {
        let Some(secret_key) = config.secret_key.clone() else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Some(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key,
        }))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    async fn read_intent(response: reqwest::Response) -> Result<PaymentIntent, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, response.text().await.unwrap_or_default()));
        }

        response
            .json::<PaymentIntent>()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_intent(
        &self,
        request: &NewPaymentIntent,
    ) -> Result<PaymentIntent, PaymentError> {
        let form = [
            ("amount", request.amount_cents.to_string()),
            ("currency", request.currency.clone()),
            ("metadata[order_id]", request.order_id.to_string()),
            ("metadata[user_id]", request.user_id.to_string()),
        ];

        let response = self
            .client
            .post(self.url("payment_intents"))
            .bearer_auth(self.secret_key.expose_secret())
            .header("Idempotency-Key", request.idempotency_key())
            .form(&form)
            .send()
            .await?;

        let intent = Self::read_intent(response).await?;
        tracing::info!(intent_id = %intent.id, "payment intent created");
        Ok(intent)
    }

    #[tracing::instrument(skip(self))]
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        let response = self
            .client
            .get(self.url(&format!("payment_intents/{intent_id}")))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;

        Self::read_intent(response).await
    }
}

fn api_error(status: StatusCode, body: String) -> PaymentError {
    let message = serde_json::from_str::<StripeErrorEnvelope>(&body)
        .ok()
        .and_then(|envelope| {
            envelope
                .error
                .message
                .or(envelope.error.kind)
        })
        .unwrap_or(body);

    PaymentError::Api {
        status: status.as_u16(),
        message,
    }
}
