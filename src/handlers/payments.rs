use axum::{
    extract::{Path, State},
    response::Response,
    Extension, Json,
};
use uuid::Uuid;

use crate::{
    entities::payment_method::Issuer,
    errors::ServiceError,
    handlers::common::{created_response, success_response},
    services::{
        payments::{CreatePaymentRequest, RegisterGatewayAccountRequest},
        tenancy::TenantScope,
    },
    AppState,
};

/// Parses a path issuer; `none` is not a gateway.
pub fn parse_issuer(raw: &str) -> Result<Issuer, ServiceError> {
    match raw.parse::<Issuer>() {
        Ok(Issuer::None) | Err(_) => Err(ServiceError::not_found("payment issuer", raw)),
        Ok(issuer) => Ok(issuer),
    }
}

pub async fn create_payment(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<Response, ServiceError> {
    let payment = state.services.payments.create_payment(&scope, request).await?;
    Ok(created_response(payment))
}

pub async fn list_order_payments(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let payments = state
        .services
        .payments
        .list_order_payments(&scope, id)
        .await?;
    Ok(success_response(payments))
}

pub async fn list_payment_methods(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
) -> Result<Response, ServiceError> {
    let methods = state.services.payments.list_payment_methods(&scope).await?;
    Ok(success_response(methods))
}

pub async fn activate_payment_method(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<i32>,
) -> Result<Response, ServiceError> {
    let activation = state
        .services
        .payments
        .activate_payment_method(&scope, id)
        .await?;
    Ok(success_response(activation))
}

pub async fn register_gateway_account(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(issuer): Path<String>,
    Json(request): Json<RegisterGatewayAccountRequest>,
) -> Result<Response, ServiceError> {
    let issuer = parse_issuer(&issuer)?;
    let account = state
        .services
        .payments
        .register_gateway_account(&scope, issuer, request)
        .await?;
    Ok(created_response(account))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_real_gateways_parse() {
        assert_eq!(parse_issuer("ipaymu").unwrap(), Issuer::Ipaymu);
        assert_eq!(parse_issuer("tsm").unwrap(), Issuer::Tsm);
        assert!(parse_issuer("none").is_err());
        assert!(parse_issuer("paypal").is_err());
    }
}
