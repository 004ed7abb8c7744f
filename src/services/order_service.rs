use crate::{
    audit::log_audit,
    dto::orders::{
        CheckoutRequest, OrderList, OrderWithItems, TrackedItem, UpdateOrderStatusRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// Persist a validated cart as one order plus its items. The whole write is
/// a single transaction, so a failure partway leaves no orphaned order row.
pub async fn checkout(
    state: &AppState,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    payload.validate().map_err(AppError::BadRequest)?;

    let mut txn = state.pool.begin().await?;

    let order: Order = sqlx::query_as(
        r#"
        INSERT INTO orders (customer_name, customer_email, customer_phone, delivery_address, total_amount, status)
        VALUES ($1, $2, $3, $4, $5, 'pending')
        RETURNING *
        "#,
    )
    .bind(payload.customer_name.trim())
    .bind(payload.customer_email.trim())
    .bind(payload.customer_phone.trim())
    .bind(payload.delivery_address.trim())
    .bind(payload.total_amount)
    .fetch_one(&mut *txn)
    .await?;

    for item in &payload.items {
        // Conditional decrement doubles as the existence check; a missing
        // product or insufficient stock affects zero rows.
        let updated = sqlx::query(
            "UPDATE products SET stock_quantity = stock_quantity - $1 WHERE id = $2 AND stock_quantity >= $1",
        )
        .bind(item.quantity)
        .bind(item.product_id)
        .execute(&mut *txn)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::BadRequest(format!(
                "product {} is unknown or out of stock",
                item.product_id
            )));
        }

        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, quantity, price) VALUES ($1, $2, $3, $4)",
        )
        .bind(order.id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.price)
        .execute(&mut *txn)
        .await?;
    }

    let items = fetch_tracked_items(&mut txn, order.id).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        None,
        "checkout",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total_amount": order.total_amount })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order created",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

/// Customer-facing tracking: one order with its items and product names.
pub async fn get_order(state: &AppState, id: i64) -> AppResult<ApiResponse<OrderWithItems>> {
    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items: Vec<TrackedItem> = sqlx::query_as(
        r#"
        SELECT oi.id, oi.order_id, oi.product_id, p.name AS product_name, oi.quantity, oi.price
        FROM order_items oi
        JOIN products p ON p.id = oi.product_id
        WHERE oi.order_id = $1
        ORDER BY oi.id
        "#,
    )
    .bind(order.id)
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            raw.parse::<OrderStatus>()
                .map_err(AppError::BadRequest)?,
        ),
        None => None,
    };
    let sort = query.sort_order.unwrap_or(SortOrder::Desc);

    let total: (i64,) = sqlx::query_as(
        "SELECT count(*) FROM orders WHERE ($1::text IS NULL OR status = $1)",
    )
    .bind(status.map(|s| s.as_str()))
    .fetch_one(&state.pool)
    .await?;

    let orders: Vec<Order> = sqlx::query_as(&format!(
        "SELECT * FROM orders WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at {} LIMIT $2 OFFSET $3",
        sort.as_sql()
    ))
    .bind(status.map(|s| s.as_str()))
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success(
        "Orders",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    get_order(state, id).await
}

/// Admin transition along the state machine. The update is conditional on
/// the status we validated against, so a concurrent transition (e.g. the
/// payment callback landing mid-request) cannot be silently overwritten.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    let target: OrderStatus = payload.status.parse().map_err(AppError::BadRequest)?;

    let current: Option<(String,)> = sqlx::query_as("SELECT status FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let current = match current {
        Some((raw,)) => raw
            .parse::<OrderStatus>()
            .map_err(|err| AppError::Internal(anyhow::anyhow!(err)))?,
        None => return Err(AppError::NotFound),
    };

    if !current.can_transition(target) {
        return Err(AppError::BadRequest(format!(
            "cannot transition order from {current} to {target}"
        )));
    }

    let order: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders
        SET status = $2,
            mpesa_checkout_id = COALESCE($3, mpesa_checkout_id),
            updated_at = now()
        WHERE id = $1 AND status = $4
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(target.as_str())
    .bind(payload.payment_correlation_id.as_deref())
    .bind(current.as_str())
    .fetch_optional(&state.pool)
    .await?;

    let order = match order {
        Some(o) => o,
        None => {
            return Err(AppError::Conflict(
                "order status changed concurrently, retry".into(),
            ));
        }
    };

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "from": current.as_str(), "to": target.as_str() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order updated",
        order,
        Some(Meta::empty()),
    ))
}

/// Orders are only deletable once cancelled; items go with them via cascade.
pub async fn delete_order(state: &AppState, user: &AuthUser, id: i64) -> AppResult<()> {
    ensure_admin(user)?;

    let deleted = sqlx::query("DELETE FROM orders WHERE id = $1 AND status = 'cancelled'")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if deleted.rows_affected() == 0 {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.pool)
            .await?;
        return match exists {
            Some(_) => Err(AppError::BadRequest(
                "only cancelled orders can be deleted".into(),
            )),
            None => Err(AppError::NotFound),
        };
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_delete",
        Some("orders"),
        Some(serde_json::json!({ "order_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(())
}

async fn fetch_tracked_items(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    order_id: i64,
) -> AppResult<Vec<TrackedItem>> {
    let items = sqlx::query_as(
        r#"
        SELECT oi.id, oi.order_id, oi.product_id, p.name AS product_name, oi.quantity, oi.price
        FROM order_items oi
        JOIN products p ON p.id = oi.product_id
        WHERE oi.order_id = $1
        ORDER BY oi.id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut **txn)
    .await?;
    Ok(items)
}
