use crate::{
    dto::payments::{CallbackAck, CallbackEnvelope, InitiatePaymentRequest, InitiatePaymentResponse},
    error::{AppError, AppResult},
    models::{Order, OrderStatus},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Kick off an STK push for a pending order. The amount is taken from the
/// stored order, not from the client, and the returned correlation id is
/// persisted so the callback can find its way back.
pub async fn initiate(
    state: &AppState,
    payload: InitiatePaymentRequest,
) -> AppResult<ApiResponse<InitiatePaymentResponse>> {
    if payload.phone.trim().is_empty() {
        return Err(AppError::BadRequest("phone must not be empty".into()));
    }

    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = $1")
        .bind(payload.order_id)
        .fetch_optional(&state.pool)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let status = order
        .status
        .parse::<OrderStatus>()
        .map_err(|err| AppError::Internal(anyhow::anyhow!(err)))?;
    if status != OrderStatus::Pending {
        return Err(AppError::Conflict(format!(
            "payment can only be initiated for pending orders, order is {status}"
        )));
    }

    let push = state
        .mpesa
        .stk_push(payload.phone.trim(), order.total_amount)
        .await
        .map_err(AppError::Gateway)?;

    // Only a still-pending order takes the correlation id; if the order
    // moved on while the gateway was deciding, leave it untouched.
    let updated = sqlx::query(
        "UPDATE orders SET mpesa_checkout_id = $2, updated_at = now() WHERE id = $1 AND status = 'pending'",
    )
    .bind(order.id)
    .bind(&push.checkout_request_id)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        tracing::warn!(
            order_id = order.id,
            checkout_request_id = %push.checkout_request_id,
            "order left pending state before correlation id could be stored"
        );
    }

    tracing::info!(
        order_id = order.id,
        checkout_request_id = %push.checkout_request_id,
        "stk push initiated"
    );

    Ok(ApiResponse::success(
        "Payment initiated",
        InitiatePaymentResponse {
            order_id: order.id,
            correlation_id: push.checkout_request_id,
        },
        Some(Meta::empty()),
    ))
}

/// Apply a gateway callback to the order it correlates with.
///
/// The status write is conditional on `status = 'pending'`, which makes a
/// duplicate or racing delivery a no-op rather than a re-applied transition.
/// The gateway always gets a success ack back, even for unknown correlation
/// ids, so it stops retrying.
pub async fn apply_callback(state: &AppState, envelope: CallbackEnvelope) -> CallbackAck {
    let callback = envelope.body.stk_callback;
    let target = if callback.is_success() {
        OrderStatus::Paid
    } else {
        OrderStatus::Failed
    };

    let result: Result<Option<(i64,)>, sqlx::Error> = sqlx::query_as(
        r#"
        UPDATE orders
        SET status = $2, updated_at = now()
        WHERE mpesa_checkout_id = $1 AND status = 'pending'
        RETURNING id
        "#,
    )
    .bind(&callback.checkout_request_id)
    .bind(target.as_str())
    .fetch_optional(&state.pool)
    .await;

    match result {
        Ok(Some((order_id,))) => {
            tracing::info!(
                order_id,
                checkout_request_id = %callback.checkout_request_id,
                result_code = callback.result_code,
                status = %target,
                "payment callback applied"
            );
        }
        Ok(None) => {
            // Known correlation id means a duplicate delivery; unknown means
            // a callback we never asked for. Either way, ack and move on.
            match known_correlation_id(state, &callback.checkout_request_id).await {
                Ok(true) => tracing::debug!(
                    checkout_request_id = %callback.checkout_request_id,
                    "duplicate payment callback ignored"
                ),
                Ok(false) => tracing::warn!(
                    checkout_request_id = %callback.checkout_request_id,
                    result_desc = %callback.result_desc,
                    "payment callback for unknown correlation id"
                ),
                Err(err) => tracing::error!(error = %err, "callback lookup failed"),
            }
        }
        Err(err) => {
            tracing::error!(
                error = %err,
                checkout_request_id = %callback.checkout_request_id,
                "failed to apply payment callback"
            );
        }
    }

    CallbackAck::success()
}

async fn known_correlation_id(state: &AppState, correlation_id: &str) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM orders WHERE mpesa_checkout_id = $1")
            .bind(correlation_id)
            .fetch_optional(&state.pool)
            .await?;
    Ok(row.is_some())
}
