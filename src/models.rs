use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{OrderStatus, Role, order_items, orders, products, users};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            role: model.role,
        }
    }
}

/// Catalog entry. `file_key` is only filled in for admin callers, since the
/// file itself sits under the public static mount.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub long_description: Option<String>,
    pub price_cents: i64,
    pub cover_image_url: Option<String>,
    pub sample_pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_key: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn public(model: products::Model) -> Self {
        let mut product = Self::admin(model);
        product.file_key = None;
        product
    }

    pub fn admin(model: products::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            long_description: model.long_description,
            price_cents: model.price_cents,
            cover_image_url: model.cover_image_url,
            sample_pdf_url: model.sample_pdf_url,
            file_key: Some(model.file_key),
            is_active: model.is_active,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub product_title: String,
    pub price_cents: i64,
}

impl OrderItem {
    pub fn from_entity(model: order_items::Model, product: Option<&products::Model>) -> Self {
        Self {
            product_id: model.product_id,
            product_title: product.map(|p| p.title.clone()).unwrap_or_default(),
            price_cents: model.price_cents,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn from_entity(model: orders::Model, items: Vec<OrderItem>) -> Self {
        Self {
            id: model.id,
            status: model.status,
            total_cents: model.total_cents,
            created_at: model.created_at.with_timezone(&Utc),
            items,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DownloadLink {
    pub product_id: Uuid,
    pub url: String,
}
