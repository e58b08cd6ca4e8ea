use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;
use tracing::info;

use crate::{
    auth::{AuthError, AuthUser, CreateStaffRequest, LoginRequest, RegisterRequest},
    errors::ServiceError,
    handlers::common::created_response,
    services::{
        notifications::{generate_otp, otp_email},
        tenancy::TenantScope,
    },
    AppState,
};

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, AuthError> {
    let response = state.services.auth.register(request).await?;
    Ok(created_response(response))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AuthError> {
    let response = state.services.auth.login(request).await?;
    Ok(Json(response).into_response())
}

pub async fn create_staff(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Json(request): Json<CreateStaffRequest>,
) -> Result<Response, AuthError> {
    let staff = state.services.auth.create_staff(&scope, request).await?;
    Ok(created_response(staff))
}

/// Queues a one-time code to the caller's email.
pub async fn request_otp(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, ServiceError> {
    let code = generate_otp();
    state
        .services
        .email
        .enqueue(otp_email(&user.email, &user.name, &code))?;
    info!(user_id = user.user_id, "otp queued");
    Ok((StatusCode::ACCEPTED, Json(json!({ "message": "OTP sent" }))).into_response())
}
