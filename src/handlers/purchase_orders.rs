use axum::{
    extract::{Path, Query, State},
    response::Response,
    Extension, Json,
};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    handlers::common::{created_response, success_response, Page, PageQuery},
    services::{
        purchase_orders::{CreatePurchaseOrderRequest, CreateSupplierRequest},
        tenancy::TenantScope,
    },
    AppState,
};

pub async fn create_supplier(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Json(request): Json<CreateSupplierRequest>,
) -> Result<Response, ServiceError> {
    let supplier = state
        .services
        .purchase_orders
        .create_supplier(&scope, request)
        .await?;
    Ok(created_response(supplier))
}

pub async fn create_purchase_order(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Json(request): Json<CreatePurchaseOrderRequest>,
) -> Result<Response, ServiceError> {
    let po = state
        .services
        .purchase_orders
        .create_purchase_order(&scope, request)
        .await?;
    Ok(created_response(po))
}

pub async fn list_purchase_orders(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Query(query): Query<PageQuery>,
) -> Result<Response, ServiceError> {
    let (items, total) = state
        .services
        .purchase_orders
        .list_purchase_orders(&scope, query.page(), query.per_page())
        .await?;
    Ok(success_response(Page::new(items, query, total)))
}

pub async fn get_purchase_order(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let po = state
        .services
        .purchase_orders
        .get_purchase_order(&scope, id)
        .await?;
    Ok(success_response(po))
}

pub async fn receive_purchase_order(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let po = state
        .services
        .purchase_orders
        .receive_purchase_order(&scope, id)
        .await?;
    Ok(success_response(po))
}

pub async fn cancel_purchase_order(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let po = state
        .services
        .purchase_orders
        .cancel_purchase_order(&scope, id)
        .await?;
    Ok(success_response(po))
}
