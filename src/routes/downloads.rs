use axum::{
    Json, Router,
    extract::State,
    routing::get,
};
use uuid::Uuid;

use crate::{
    error::{AppResult, ErrorBody},
    extract::AppPath,
    middleware::auth::AuthUser,
    models::DownloadLink,
    services::download_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/{product_id}", get(get_download_link))
}

#[utoipa::path(
    get,
    path = "/downloads/{product_id}",
    params(
        ("product_id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Download link", body = DownloadLink),
        (status = 403, description = "No paid order contains this product", body = ErrorBody),
        (status = 404, description = "Product not found", body = ErrorBody)
    ),
    security(("bearer_auth" = [])),
    tag = "Downloads"
)]
pub async fn get_download_link(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(product_id): AppPath<Uuid>,
) -> AppResult<Json<DownloadLink>> {
    Ok(Json(
        download_service::get_download_link(&state, &user, product_id).await?,
    ))
}
