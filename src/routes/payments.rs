use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};

use crate::{
    dto::payments::{
        CreatePaymentIntentRequest, CreatePaymentIntentResponse, MockConfirmRequest,
        StatusResponse, WebhookAck,
    },
    error::{AppResult, ErrorBody},
    extract::AppJson,
    middleware::auth::AuthUser,
    payments::webhook::SIGNATURE_HEADER,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-intent", post(create_intent))
        .route("/mock-confirm", post(mock_confirm))
        .route("/webhook", post(webhook))
}

#[utoipa::path(
    post,
    path = "/payments/create-intent",
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 200, description = "Client secret of the order's payment intent", body = CreatePaymentIntentResponse),
        (status = 400, description = "Order is not pending", body = ErrorBody),
        (status = 404, description = "Order not found", body = ErrorBody),
        (status = 500, description = "Payment processor not configured", body = ErrorBody),
        (status = 502, description = "Payment processor error", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_intent(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreatePaymentIntentRequest>,
) -> AppResult<Json<CreatePaymentIntentResponse>> {
    Ok(Json(
        payment_service::create_intent(&state, &user, payload).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/payments/mock-confirm",
    request_body = MockConfirmRequest,
    responses(
        (status = 200, description = "Order marked as paid", body = StatusResponse),
        (status = 403, description = "Mock payments disabled", body = ErrorBody),
        (status = 404, description = "Order not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn mock_confirm(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<MockConfirmRequest>,
) -> AppResult<Json<StatusResponse>> {
    Ok(Json(
        payment_service::mock_confirm(&state, &user, payload).await?,
    ))
}

/// Stripe calls this with the raw event body; the signature covers the exact
/// bytes, so the body is not parsed as JSON by the extractor.
#[utoipa::path(
    post,
    path = "/payments/webhook",
    request_body(content = String, content_type = "application/json", description = "Signed Stripe event"),
    responses(
        (status = 200, description = "Event accepted", body = WebhookAck),
        (status = 400, description = "Invalid signature or payload", body = ErrorBody),
        (status = 500, description = "Webhook secret not configured", body = ErrorBody)
    ),
    tag = "Payments"
)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    Ok(Json(
        payment_service::handle_webhook(&state, signature, &body).await?,
    ))
}
