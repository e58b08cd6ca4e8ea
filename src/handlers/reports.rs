use axum::{
    extract::{Path, Query, State},
    response::Response,
    Extension,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    handlers::common::success_response,
    services::{reports::DateRange, tenancy::TenantScope},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct MovementQuery {
    pub product_id: Option<Uuid>,
}

pub async fn sales_by_outlet(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
    Query(range): Query<DateRange>,
) -> Result<Response, ServiceError> {
    let report = state
        .services
        .reports
        .sales_by_outlet(&scope, id, range)
        .await?;
    Ok(success_response(report))
}

pub async fn sales_by_product(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
    Query(range): Query<DateRange>,
) -> Result<Response, ServiceError> {
    let report = state
        .services
        .reports
        .sales_by_product(&scope, id, range)
        .await?;
    Ok(success_response(report))
}

pub async fn stock_by_outlet(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let rows = state.services.reports.stock_by_outlet(&scope, id).await?;
    Ok(success_response(rows))
}

pub async fn stock_movements(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
    Query(query): Query<MovementQuery>,
) -> Result<Response, ServiceError> {
    let rows = state
        .services
        .reports
        .stock_movements(&scope, id, query.product_id)
        .await?;
    Ok(success_response(rows))
}
