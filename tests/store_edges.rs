mod common;

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{Method, Request, StatusCode, header},
};
use ebook_store_api::{
    app::build_app,
    db::OrmConn,
    dto::{
        auth::{LoginRequest, RegisterRequest},
        payments::CreatePaymentIntentRequest,
        products::UpdateProductRequest,
    },
    entity::{Orders, Role, orders::Column as OrderCol, users},
    error::AppError,
    payments::{NewPaymentIntent, PaymentError, PaymentGateway, PaymentIntent},
    services::{
        auth_service, order_service, payment_service,
        product_service::{self, CoverUpload},
    },
    state::AppState,
};
use http_body_util::BodyExt;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, Set,
    sea_query::Expr,
};
use serde_json::Value;
use tower::ServiceExt;

use common::{
    FakeGateway, auth_user, create_admin, database_url, new_product, order_of, setup_state,
};

const BOUNDARY: &str = "store-edges-boundary";

/// Attaches a competing intent to the order while the caller's own intent is
/// being created, the way a parallel create-intent request would.
struct RacingGateway {
    orm: OrmConn,
    intents: Mutex<HashMap<String, PaymentIntent>>,
    created: AtomicUsize,
}

fn intent(id: &str) -> PaymentIntent {
    PaymentIntent {
        id: id.to_string(),
        client_secret: Some(format!("{id}_secret")),
        status: "requires_payment_method".to_string(),
    }
}

#[async_trait]
impl PaymentGateway for RacingGateway {
    async fn create_intent(
        &self,
        request: &NewPaymentIntent,
    ) -> Result<PaymentIntent, PaymentError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Orders::update_many()
            .col_expr(OrderCol::StripePaymentIntentId, Expr::value("pi_winner"))
            .filter(OrderCol::Id.eq(request.order_id))
            .exec(&self.orm)
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))?;

        let mut intents = self.intents.lock().unwrap();
        intents.insert("pi_winner".into(), intent("pi_winner"));
        intents.insert("pi_loser".into(), intent("pi_loser"));
        Ok(intent("pi_loser"))
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

fn multipart(parts: &[(&str, Option<(&str, &str)>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file, bytes) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file {
            Some((file_name, content_type)) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = build_app(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn cover_request(
    product_id: uuid::Uuid,
    token: &str,
    content_type: &str,
    body: Vec<u8>,
) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(format!("/products/{product_id}/cover"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap()
}

// Cover uploads, nullable product fields, line order, the create-intent race and deactivated accounts.
#[tokio::test]
async fn catalog_and_payment_edges() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        return Ok(());
    };

    let state = setup_state(&database_url, Arc::new(FakeGateway::default())).await?;
    let admin = auth_user(create_admin(&state, "admin@example.com").await?);
    let token = auth_service::issue_token(&state.config.jwt, admin.user_id, Role::Admin)?;

    let atlas =
        product_service::create_product(&state, &admin, new_product("Atlas des mots", 900)).await?;

    // Cover upload through the service: file lands under media_dir/covers.
    let covered = product_service::upload_cover(
        &state,
        &admin,
        atlas.id,
        CoverUpload {
            file_name: Some("Front.PNG".into()),
            content_type: Some("image/png".into()),
            bytes: Bytes::from_static(b"\x89PNG\r\n\x1a\nfake"),
        },
    )
    .await?;
    let url = covered.cover_image_url.clone().expect("cover url");
    let name = url.strip_prefix("/static/covers/").expect("static cover url");
    assert!(name.starts_with("atlas-des-mots-") && name.ends_with(".png"));
    let stored = tokio::fs::read(state.config.media_dir.join("covers").join(name)).await?;
    assert_eq!(stored, b"\x89PNG\r\n\x1a\nfake");

    let pdf = product_service::upload_cover(
        &state,
        &admin,
        atlas.id,
        CoverUpload {
            file_name: Some("book.pdf".into()),
            content_type: Some("application/pdf".into()),
            bytes: Bytes::from_static(b"%PDF-1.7"),
        },
    )
    .await;
    assert!(matches!(pdf, Err(AppError::BadRequest(_))));

    // Same rules through the multipart route.
    let content_type = format!("multipart/form-data; boundary={BOUNDARY}");
    let body = multipart(&[("file", Some(("back.webp", "image/webp")), &b"RIFFwebp"[..])]);
    let (status, product) =
        send(&state, cover_request(atlas.id, &token, &content_type, body)).await;
    assert_eq!(status, StatusCode::OK);
    let served = product["cover_image_url"].as_str().expect("cover url").to_string();
    assert!(served.ends_with(".webp"));
    let (status, _) = send(
        &state,
        Request::builder().uri(&served).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let body = multipart(&[("note", None, &b"no file here"[..])]);
    let (status, error) =
        send(&state, cover_request(atlas.id, &token, &content_type, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["detail"], "Missing file field");

    let body = multipart(&[("file", Some(("book.pdf", "application/pdf")), &b"%PDF-1.7"[..])]);
    let (status, error) =
        send(&state, cover_request(atlas.id, &token, &content_type, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["detail"], "Unsupported image format");

    let (status, error) = send(
        &state,
        cover_request(atlas.id, &token, "application/json", b"{}".to_vec()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["detail"].is_string());

    // Explicit null clears nullable columns; absent fields stay as they were.
    let cleared = product_service::update_product(
        &state,
        &admin,
        atlas.id,
        UpdateProductRequest {
            description: Some(None),
            cover_image_url: Some(None),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(cleared.description, None);
    assert_eq!(cleared.cover_image_url, None);
    assert_eq!(cleared.title, "Atlas des mots");

    // Lines come back in the order they were placed.
    let registered = auth_service::register_user(
        &state,
        RegisterRequest {
            email: "buyer@example.com".into(),
            password: "buyer-pass".into(),
            first_name: None,
            last_name: None,
        },
    )
    .await?;
    let login = auth_service::login_user(
        &state,
        LoginRequest {
            email: "buyer@example.com".into(),
            password: "buyer-pass".into(),
        },
    )
    .await?;
    let buyer = auth_user(auth_service::authenticate(&state, &login.access_token).await?);
    assert_eq!(buyer.user_id, registered.id);

    let zola = product_service::create_product(&state, &admin, new_product("Zola", 500)).await?;
    let balzac = product_service::create_product(&state, &admin, new_product("Balzac", 600)).await?;
    let placed = [zola.id, atlas.id, balzac.id];
    let order = order_service::create_order(&state, &buyer, order_of(&placed)).await?;
    for _ in 0..3 {
        let reloaded = order_service::get_order(&state, &buyer, order.id).await?;
        let ids: Vec<_> = reloaded.items.iter().map(|i| i.product_id).collect();
        assert_eq!(ids, placed);
    }

    // Losing the create-intent race returns the intent already on the order.
    let racing = Arc::new(RacingGateway {
        orm: state.orm.clone(),
        intents: Mutex::new(HashMap::new()),
        created: AtomicUsize::new(0),
    });
    let racing_state = AppState {
        payments: Some(racing.clone() as Arc<dyn PaymentGateway>),
        ..state.clone()
    };
    let response = payment_service::create_intent(
        &racing_state,
        &buyer,
        CreatePaymentIntentRequest { order_id: order.id },
    )
    .await?;
    assert_eq!(response.client_secret, "pi_winner_secret");
    assert_eq!(racing.created.load(Ordering::SeqCst), 1);
    let stored = Orders::find_by_id(order.id).one(&state.orm).await?.expect("order");
    assert_eq!(stored.stripe_payment_intent_id.as_deref(), Some("pi_winner"));

    // A deactivated account loses access even with an unexpired token.
    let account = users::Entity::find_by_id(buyer.user_id)
        .one(&state.orm)
        .await?
        .expect("buyer row");
    let mut account = account.into_active_model();
    account.is_active = Set(false);
    account.update(&state.orm).await?;

    assert!(matches!(
        auth_service::authenticate(&state, &login.access_token).await,
        Err(AppError::Unauthorized(_))
    ));
    assert!(matches!(
        auth_service::login_user(
            &state,
            LoginRequest {
                email: "buyer@example.com".into(),
                password: "buyer-pass".into(),
            },
        )
        .await,
        Err(AppError::Unauthorized(_))
    ));
    let request = Request::builder()
        .uri("/auth/me")
        .header(header::AUTHORIZATION, format!("Bearer {}", login.access_token))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&state, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}
