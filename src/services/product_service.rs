use std::path::Path;

use axum::body::Bytes;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
    sea_query::{Expr, extension::postgres::PgExpr},
};
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{CreateProductRequest, UpdateProductRequest},
    entity::{
        OrderItems, Products, order_items,
        products::{ActiveModel, Column, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    routes::params::ProductQuery,
    state::AppState,
};

const PRODUCT_NOT_FOUND: &str = "Product not found";
const ALLOWED_COVER_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/svg+xml", "image/webp"];

/// A cover image as received from the multipart form.
#[derive(Debug)]
pub struct CoverUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

pub async fn list_products(
    state: &AppState,
    viewer: Option<&AuthUser>,
    query: ProductQuery,
) -> AppResult<Vec<Product>> {
    if query.include_inactive {
        let viewer = viewer.ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;
        ensure_admin(viewer)?;
    }

    let (_, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if !query.include_inactive {
        condition = condition.add(Column::IsActive.eq(true));
    }

    if let Some(search) = query.q.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Title).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    let map: fn(ProductModel) -> Product = if query.include_inactive {
        Product::admin
    } else {
        Product::public
    };

    let items = Products::find()
        .filter(condition)
        .order_by_asc(Column::CreatedAt)
        .limit(limit)
        .offset(offset)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(map)
        .collect();

    Ok(items)
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<Product> {
    Products::find_by_id(id)
        .filter(Column::IsActive.eq(true))
        .one(&state.orm)
        .await?
        .map(Product::public)
        .ok_or_else(|| AppError::NotFound(PRODUCT_NOT_FOUND.into()))
}

pub async fn admin_get_product(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<Product> {
    ensure_admin(user)?;
    find_any(state, id).await.map(Product::admin)
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<Product> {
    ensure_admin(user)?;
    validate_title(&payload.title)?;
    validate_file_key(&payload.file_key)?;
    validate_price(payload.price_cents)?;

    let now = Utc::now().fixed_offset();
    let product = ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set(payload.title.trim().to_string()),
        description: Set(payload.description),
        long_description: Set(payload.long_description),
        price_cents: Set(payload.price_cents),
        cover_image_url: Set(payload.cover_image_url),
        file_key: Set(payload.file_key.trim().to_string()),
        sample_pdf_url: Set(payload.sample_pdf_url),
        is_active: Set(payload.is_active),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(product_id = %product.id, "product created");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(Product::admin(product))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<Product> {
    ensure_admin(user)?;
    let existing = find_any(state, id).await?;

    let mut active: ActiveModel = existing.into();
    if let Some(title) = payload.title {
        validate_title(&title)?;
        active.title = Set(title.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(long_description) = payload.long_description {
        active.long_description = Set(long_description);
    }
    if let Some(price_cents) = payload.price_cents {
        validate_price(price_cents)?;
        active.price_cents = Set(price_cents);
    }
    if let Some(cover_image_url) = payload.cover_image_url {
        active.cover_image_url = Set(cover_image_url);
    }
    if let Some(file_key) = payload.file_key {
        validate_file_key(&file_key)?;
        active.file_key = Set(file_key.trim().to_string());
    }
    if let Some(sample_pdf_url) = payload.sample_pdf_url {
        active.sample_pdf_url = Set(sample_pdf_url);
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Utc::now().fixed_offset());

    let product = active.update(&state.orm).await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id, "is_active": product.is_active }),
    )
    .await;

    Ok(Product::admin(product))
}

pub async fn delete_product(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<()> {
    ensure_admin(user)?;

    let referenced = OrderItems::find()
        .filter(order_items::Column::ProductId.eq(id))
        .count(&state.orm)
        .await?;
    if referenced > 0 {
        return Err(AppError::BadRequest(
            "Product has been ordered and cannot be deleted; deactivate it instead".into(),
        ));
    }

    let result = Products::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound(PRODUCT_NOT_FOUND.into()));
    }

    tracing::info!(product_id = %id, "product deleted");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(())
}

pub async fn upload_cover(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    upload: CoverUpload,
) -> AppResult<Product> {
    ensure_admin(user)?;
    let product = find_any(state, id).await?;

    if !is_allowed_cover_type(upload.content_type.as_deref()) {
        return Err(AppError::BadRequest("Unsupported image format".into()));
    }

    let name = cover_file_name(&product.title, upload.file_name.as_deref(), Uuid::new_v4());
    let covers_dir = state.config.media_dir.join("covers");
    tokio::fs::create_dir_all(&covers_dir)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    tokio::fs::write(covers_dir.join(&name), &upload.bytes)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    let mut active: ActiveModel = product.into();
    active.cover_image_url = Set(Some(format!("/static/covers/{name}")));
    active.updated_at = Set(Utc::now().fixed_offset());
    let product = active.update(&state.orm).await?;

    tracing::info!(product_id = %product.id, file = %name, bytes = upload.bytes.len(), "cover uploaded");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "product_cover_upload",
        "products",
        serde_json::json!({ "product_id": product.id, "file": name }),
    )
    .await;

    Ok(Product::admin(product))
}

async fn find_any(state: &AppState, id: Uuid) -> AppResult<ProductModel> {
    Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::NotFound(PRODUCT_NOT_FOUND.into()))
}

fn validate_title(title: &str) -> AppResult<()> {
    if title.trim().is_empty() {
        return Err(AppError::BadRequest("Title must not be empty".into()));
    }
    Ok(())
}

fn validate_file_key(file_key: &str) -> AppResult<()> {
    if file_key.trim().is_empty() {
        return Err(AppError::BadRequest("file_key must not be empty".into()));
    }
    Ok(())
}

fn validate_price(price_cents: i64) -> AppResult<()> {
    if price_cents < 0 {
        return Err(AppError::BadRequest("price_cents must be >= 0".into()));
    }
    Ok(())
}

fn is_allowed_cover_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ALLOWED_COVER_TYPES.contains(&ct))
}

/// `{slug(title)}-{8 hex chars}{ext}`; the extension comes from the uploaded
/// name, lowercased, falling back to `.png`.
fn cover_file_name(title: &str, original: Option<&str>, nonce: Uuid) -> String {
    let ext = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_else(|| ".png".to_string());

    let mut stem = slug::slugify(title);
    if stem.is_empty() {
        stem = "cover".to_string();
    }
    let nonce = nonce.simple().to_string();
    format!("{stem}-{}{ext}", &nonce[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nonce() -> Uuid {
        Uuid::parse_str("0123abcd-0000-4000-8000-000000000000").unwrap()
    }

    #[test]
    fn cover_name_uses_slug_and_lowercased_extension() {
        let name = cover_file_name("Le secret d'une belle diction", Some("Cover.JPG"), nonce());
        assert_eq!(name, "le-secret-d-une-belle-diction-0123abcd.jpg");
    }

    #[test]
    fn cover_name_defaults_to_png() {
        assert_eq!(cover_file_name("Guide", None, nonce()), "guide-0123abcd.png");
        assert_eq!(
            cover_file_name("Guide", Some("no-extension"), nonce()),
            "guide-0123abcd.png"
        );
    }

    #[test]
    fn cover_name_ignores_path_components() {
        let name = cover_file_name("Guide", Some("../../etc/passwd.webp"), nonce());
        assert_eq!(name, "guide-0123abcd.webp");
    }

    #[test]
    fn only_image_types_are_accepted() {
        assert!(is_allowed_cover_type(Some("image/png")));
        assert!(is_allowed_cover_type(Some("image/svg+xml")));
        assert!(!is_allowed_cover_type(Some("application/pdf")));
        assert!(!is_allowed_cover_type(None));
    }

    #[test]
    fn negative_prices_are_rejected() {
        assert!(validate_price(0).is_ok());
        assert!(matches!(validate_price(-1), Err(AppError::BadRequest(_))));
    }
}
