use std::collections::{HashMap, HashSet};

use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::CreateOrderRequest,
    entity::{
        OrderItems, OrderStatus, Orders, Products,
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Model as OrderModel},
        products::Column as ProdCol,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem},
    state::AppState,
};

pub(crate) const ORDER_NOT_FOUND: &str = "Order not found";

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<Order> {
    if payload.items.is_empty() {
        return Err(AppError::BadRequest("Order must contain at least one item".into()));
    }

    let mut seen = HashSet::with_capacity(payload.items.len());
    let product_ids: Vec<Uuid> = payload.items.iter().map(|item| item.product_id).collect();
    if let Some(dup) = product_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(AppError::BadRequest(format!(
            "Product {dup} appears more than once in the order"
        )));
    }

    let products = Products::find()
        .filter(
            Condition::all()
                .add(ProdCol::Id.is_in(product_ids.clone()))
                .add(ProdCol::IsActive.eq(true)),
        )
        .all(&state.orm)
        .await?;

    if products.len() != product_ids.len() {
        return Err(AppError::BadRequest(
            "One or more products are unavailable".into(),
        ));
    }

    let by_id: HashMap<Uuid, _> = products.into_iter().map(|p| (p.id, p)).collect();
    // Keep the caller's item order.
    let lines: Vec<_> = product_ids
        .iter()
        .filter_map(|id| by_id.get(id))
        .collect();
    let total_cents = order_total(lines.iter().map(|p| p.price_cents))?;

    let txn = state.orm.begin().await?;

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        status: Set(OrderStatus::Pending),
        stripe_payment_intent_id: Set(None),
        total_cents: Set(total_cents),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for (position, product) in (0..).zip(lines.iter().copied()) {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product.id),
            price_cents: Set(product.price_cents),
            position: Set(position),
        }
        .insert(&txn)
        .await?;

        items.push(OrderItem::from_entity(item, Some(product)));
    }

    txn.commit().await?;

    tracing::info!(order_id = %order.id, user_id = %user.user_id, total_cents, "order created");
    audit::record(
        &state.orm,
        Some(user.user_id),
        "order_create",
        "orders",
        serde_json::json!({ "order_id": order.id, "total_cents": total_cents }),
    )
    .await;

    Ok(Order::from_entity(order, items))
}

pub async fn list_orders(state: &AppState, user: &AuthUser) -> AppResult<Vec<Order>> {
    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .order_by_desc(OrderCol::CreatedAt)
        .all(&state.orm)
        .await?;

    with_items(state, orders).await
}

/// A missing order and one owned by someone else both answer 404.
pub async fn get_order(state: &AppState, user: &AuthUser, order_id: Uuid) -> AppResult<Order> {
    let order = find_owned(state, user, order_id).await?;
    let mut orders = with_items(state, vec![order]).await?;
    orders
        .pop()
        .ok_or_else(|| AppError::NotFound(ORDER_NOT_FOUND.into()))
}

pub(crate) async fn find_owned(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<OrderModel> {
    Orders::find_by_id(order_id)
        .filter(OrderCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::NotFound(ORDER_NOT_FOUND.into()))
}

async fn with_items(state: &AppState, orders: Vec<OrderModel>) -> AppResult<Vec<Order>> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let rows = OrderItems::find()
        .filter(OrderItemCol::OrderId.is_in(order_ids))
        .order_by_asc(OrderItemCol::Position)
        .find_also_related(Products)
        .all(&state.orm)
        .await?;

    let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for (item, product) in rows {
        grouped
            .entry(item.order_id)
            .or_default()
            .push(OrderItem::from_entity(item, product.as_ref()));
    }

    Ok(orders
        .into_iter()
        .map(|order| {
            let items = grouped.remove(&order.id).unwrap_or_default();
            Order::from_entity(order, items)
        })
        .collect())
}

/// Sum of line prices, rejecting totals that overflow the column.
pub fn order_total(prices: impl IntoIterator<Item = i64>) -> AppResult<i64> {
    prices.into_iter().try_fold(0i64, |acc, price| {
        acc.checked_add(price)
            .ok_or_else(|| AppError::BadRequest("Order total is too large".into()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_the_sum_of_line_prices() {
        assert_eq!(order_total([1490, 990, 1290]).unwrap(), 3770);
        assert_eq!(order_total(std::iter::empty()).unwrap(), 0);
    }

    #[test]
    fn overflowing_total_is_rejected() {
        assert!(matches!(
            order_total([i64::MAX, 1]),
            Err(AppError::BadRequest(_))
        ));
    }
}
