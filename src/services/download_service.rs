use sea_orm::{
    ActiveEnum, ColumnTrait, Condition, EntityTrait, JoinType, PaginatorTrait, QueryFilter,
    QuerySelect, RelationTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    entity::{OrderItems, OrderStatus, Products, order_items, orders},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::DownloadLink,
    state::AppState,
};

/// Hand out the file URL of a product the caller has paid for.
///
/// The returned path sits under the public `/static` mount and does not
/// expire.
pub async fn get_download_link(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<DownloadLink> {
    let paid_lines = OrderItems::find()
        .join(JoinType::InnerJoin, order_items::Relation::Orders.def())
        .filter(
            Condition::all()
                .add(order_items::Column::ProductId.eq(product_id))
                .add(orders::Column::UserId.eq(user.user_id))
                .add(orders::Column::Status.eq(OrderStatus::Paid.to_value())),
        )
        .count(&state.orm)
        .await?;

    if paid_lines == 0 {
        return Err(AppError::Forbidden(
            "You have not purchased this product".into(),
        ));
    }

    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".into()))?;

    let link = DownloadLink {
        product_id: product.id,
        url: download_url(&product.file_key),
    };

    tracing::info!(user_id = %user.user_id, %product_id, "download link granted");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "download_grant",
        "products",
        serde_json::json!({ "product_id": product_id, "file_key": product.file_key }),
    )
    .await;

    Ok(link)
}

fn download_url(file_key: &str) -> String {
    format!("/static/{}", file_key.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_points_at_the_static_mount() {
        assert_eq!(
            download_url("ebooks/le-secret.pdf"),
            "/static/ebooks/le-secret.pdf"
        );
        assert_eq!(download_url("/ebooks/a.pdf"), "/static/ebooks/a.pdf");
    }
}
