use axum::{
    extract::{Path, Query, State},
    response::Response,
    Extension, Json,
};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    handlers::common::{created_response, success_response, Page, PageQuery},
    services::{orders::CreateOrderRequest, tenancy::TenantScope},
    AppState,
};

pub async fn create_order(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.create_order(&scope, request).await?;
    Ok(created_response(order))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.get_order(&scope, id).await?;
    Ok(success_response(order))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.cancel_order(&scope, id).await?;
    Ok(success_response(order))
}

pub async fn list_outlet_orders(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Response, ServiceError> {
    let (orders, total) = state
        .services
        .orders
        .list_orders_by_outlet(&scope, id, query.page(), query.per_page())
        .await?;
    Ok(success_response(Page::new(orders, query, total)))
}
