//! Issuer notifications. Unauthenticated; trust comes from the body
//! signature alone.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{
    errors::ServiceError,
    handlers::payments::parse_issuer,
    services::gateway::{CallbackPayload, SIGNATURE_HEADER},
    AppState,
};

pub async fn gateway_notify(
    State(state): State<AppState>,
    Path(issuer): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    let issuer = parse_issuer(&issuer)?;
    let adapter = state.services.payments.gateways().get(issuer)?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ServiceError::SignatureMismatch)?;
    if let Err(err) = adapter.verify_callback(&body, signature) {
        warn!(issuer = %issuer, "callback signature rejected");
        return Err(err.into());
    }

    let payload: CallbackPayload = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::InvalidInput(format!("malformed callback: {}", e)))?;
    let outcome = state
        .services
        .payments
        .settle_callback(issuer, payload)
        .await?;

    info!(issuer = %issuer, ?outcome, "callback acknowledged");
    Ok(Json(json!({ "message": "Success" })))
}
