use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::payments::{
        CallbackAck, CallbackEnvelope, InitiatePaymentRequest, InitiatePaymentResponse,
    },
    error::AppResult,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/initiate", post(initiate))
        .route("/callback", post(callback))
}

#[utoipa::path(
    post,
    path = "/api/payments/initiate",
    request_body = InitiatePaymentRequest,
    responses(
        (status = 200, description = "STK push sent", body = ApiResponse<InitiatePaymentResponse>),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order is not pending"),
        (status = 502, description = "Payment gateway error"),
    ),
    tag = "Payments"
)]
pub async fn initiate(
    State(state): State<AppState>,
    Json(payload): Json<InitiatePaymentRequest>,
) -> AppResult<Json<ApiResponse<InitiatePaymentResponse>>> {
    let resp = payment_service::initiate(&state, payload).await?;
    Ok(Json(resp))
}

// Gateway-originated webhook. Always 200, whatever happens, so Daraja stops
// retrying.
#[utoipa::path(
    post,
    path = "/api/payments/callback",
    request_body = CallbackEnvelope,
    responses(
        (status = 200, description = "Callback acknowledged", body = CallbackAck),
    ),
    tag = "Payments"
)]
pub async fn callback(
    State(state): State<AppState>,
    Json(envelope): Json<CallbackEnvelope>,
) -> Json<CallbackAck> {
    Json(payment_service::apply_callback(&state, envelope).await)
}
