use sea_orm::{
    ActiveEnum, ColumnTrait, Condition, EntityTrait, QueryFilter, sea_query::Expr,
};
use secrecy::ExposeSecret;
use uuid::Uuid;

use crate::{
    audit,
    db::OrmConn,
    dto::payments::{
        CreatePaymentIntentRequest, CreatePaymentIntentResponse, MockConfirmRequest,
        StatusResponse, WebhookAck,
    },
    entity::{OrderStatus, Orders, orders::Column as OrderCol},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    payments::{
        NewPaymentIntent, PaymentIntent,
        webhook::{self, Event, PAYMENT_INTENT_SUCCEEDED},
    },
    services::order_service,
    state::AppState,
};

const INVALID_SIGNATURE: &str = "Invalid Stripe signature";

/// Create (or reuse) the payment intent of a pending order and return its
/// client secret.
pub async fn create_intent(
    state: &AppState,
    user: &AuthUser,
    payload: CreatePaymentIntentRequest,
) -> AppResult<CreatePaymentIntentResponse> {
    let gateway = state
        .payments
        .as_ref()
        .ok_or(AppError::Misconfigured("Stripe is not configured"))?;

    let order = order_service::find_owned(state, user, payload.order_id).await?;
    if order.status != OrderStatus::Pending {
        return Err(AppError::BadRequest("Order is not pending".into()));
    }

    let intent = match order.stripe_payment_intent_id.as_deref() {
        Some(intent_id) => gateway.retrieve_intent(intent_id).await?,
        None => {
            let request = NewPaymentIntent {
                order_id: order.id,
                user_id: user.user_id,
                amount_cents: order.total_cents,
                currency: state.config.stripe.currency.clone(),
            };
            let created = gateway.create_intent(&request).await?;
            attach_intent(state, order.id, created).await?
        }
    };

    tracing::info!(order_id = %order.id, intent_id = %intent.id, "payment intent ready");

    let client_secret = intent.client_secret.ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "payment intent {} has no client secret",
            intent.id
        ))
    })?;

    Ok(CreatePaymentIntentResponse { client_secret })
}

/// Store the intent id unless another request got there first, in which case
/// the intent already on the order wins.
async fn attach_intent(
    state: &AppState,
    order_id: Uuid,
    intent: PaymentIntent,
) -> AppResult<PaymentIntent> {
    let result = Orders::update_many()
        .col_expr(OrderCol::StripePaymentIntentId, Expr::value(intent.id.clone()))
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(order_id))
                .add(OrderCol::StripePaymentIntentId.is_null()),
        )
        .exec(&state.orm)
        .await?;

    if result.rows_affected > 0 {
        audit::record(
            &state.orm,
            None,
            "payment_intent_create",
            "orders",
            serde_json::json!({ "order_id": order_id, "intent_id": intent.id }),
        )
        .await;
        return Ok(intent);
    }

    let stored = Orders::find_by_id(order_id)
        .one(&state.orm)
        .await?
        .and_then(|o| o.stripe_payment_intent_id);

    match stored {
        Some(stored_id) if stored_id != intent.id => {
            tracing::debug!(%order_id, %stored_id, "payment intent attached concurrently");
            let gateway = state
                .payments
                .as_ref()
                .ok_or(AppError::Misconfigured("Stripe is not configured"))?;
            Ok(gateway.retrieve_intent(&stored_id).await?)
        }
        _ => Ok(intent),
    }
}

pub async fn mock_confirm(
    state: &AppState,
    user: &AuthUser,
    payload: MockConfirmRequest,
) -> AppResult<StatusResponse> {
    if !state.config.payments_mock_enabled {
        return Err(AppError::Forbidden("Mock payments are disabled".into()));
    }

    let order = order_service::find_owned(state, user, payload.order_id).await?;
    match order.status {
        OrderStatus::Paid => Ok(StatusResponse::ok()),
        OrderStatus::Pending => {
            let changed = mark_paid(&state.orm, OrderCol::Id.eq(order.id)).await?;
            if changed > 0 {
                tracing::info!(order_id = %order.id, "order paid (mock)");
                audit::record(
                    &state.orm,
                    Some(user.user_id),
                    "payment_mock_confirm",
                    "orders",
                    serde_json::json!({ "order_id": order.id }),
                )
                .await;
            }
            Ok(StatusResponse::ok())
        }
        OrderStatus::Failed | OrderStatus::Refunded => Err(AppError::BadRequest(
            "Order cannot be confirmed in its current state".into(),
        )),
    }
}

/// Verify and apply a Stripe event. Nothing is read from the body before the
/// signature checks out.
pub async fn handle_webhook(
    state: &AppState,
    signature: Option<&str>,
    body: &[u8],
) -> AppResult<WebhookAck> {
    let secret = state
        .config
        .stripe
        .webhook_secret
        .as_ref()
        .ok_or(AppError::Misconfigured("Stripe webhook secret is not configured"))?;

    let signature = signature.ok_or_else(|| AppError::BadRequest(INVALID_SIGNATURE.into()))?;
    webhook::verify_signature(body, signature, secret.expose_secret()).map_err(|err| {
        tracing::warn!(error = %err, "rejected webhook signature");
        AppError::BadRequest(INVALID_SIGNATURE.into())
    })?;

    let event: Event = serde_json::from_slice(body)
        .map_err(|_| AppError::BadRequest("Invalid webhook payload".into()))?;

    if event.kind != PAYMENT_INTENT_SUCCEEDED {
        tracing::debug!(event_id = %event.id, kind = %event.kind, "ignoring webhook event");
        return Ok(WebhookAck { received: true });
    }

    let intent_id = event.data.object.id;
    let changed = mark_paid(
        &state.orm,
        OrderCol::StripePaymentIntentId.eq(intent_id.as_str()),
    )
    .await?;

    if changed > 0 {
        tracing::info!(event_id = %event.id, %intent_id, "order paid");
        audit::record(
            &state.orm,
            None,
            "payment_webhook_paid",
            "orders",
            serde_json::json!({ "event_id": event.id, "intent_id": intent_id }),
        )
        .await;
    } else {
        tracing::debug!(event_id = %event.id, %intent_id, "no pending order for payment intent");
    }

    Ok(WebhookAck { received: true })
}

/// `pending -> paid` for the matching order. Returns the number of rows moved,
/// so repeated confirmations report 0.
async fn mark_paid(orm: &OrmConn, target: sea_orm::sea_query::SimpleExpr) -> AppResult<u64> {
    let result = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(OrderStatus::Paid.to_value()))
        .filter(
            Condition::all()
                .add(target)
                .add(OrderCol::Status.eq(OrderStatus::Pending.to_value())),
        )
        .exec(orm)
        .await?;
    Ok(result.rows_affected)
}
