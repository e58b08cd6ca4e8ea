use axum::{
    extract::{Path, State},
    response::Response,
    Extension, Json,
};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    handlers::common::{created_response, no_content_response, success_response},
    services::{
        catalog::{
            BindAddOnRequest, CreateOutletRequest, CreateProductRequest, CreateVariantRequest,
            SetStockRequest,
        },
        recipes::ReplaceRecipeRequest,
        tenancy::TenantScope,
    },
    AppState,
};

pub async fn list_outlets(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
) -> Result<Response, ServiceError> {
    let outlets = state.services.catalog.list_outlets(&scope).await?;
    Ok(success_response(outlets))
}

pub async fn create_outlet(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Json(request): Json<CreateOutletRequest>,
) -> Result<Response, ServiceError> {
    let outlet = state.services.catalog.create_outlet(&scope, request).await?;
    Ok(created_response(outlet))
}

pub async fn list_products(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
) -> Result<Response, ServiceError> {
    let products = state.services.catalog.list_products(&scope).await?;
    Ok(success_response(products))
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Json(request): Json<CreateProductRequest>,
) -> Result<Response, ServiceError> {
    let product = state.services.catalog.create_product(&scope, request).await?;
    Ok(created_response(product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.catalog.delete_product(&scope, id).await?;
    Ok(no_content_response())
}

pub async fn create_variant(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateVariantRequest>,
) -> Result<Response, ServiceError> {
    let variant = state
        .services
        .catalog
        .create_variant(&scope, id, request)
        .await?;
    Ok(created_response(variant))
}

pub async fn bind_add_on(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
    Json(request): Json<BindAddOnRequest>,
) -> Result<Response, ServiceError> {
    let binding = state.services.catalog.bind_add_on(&scope, id, request).await?;
    Ok(created_response(binding))
}

pub async fn get_recipe(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let recipe = state.services.recipes.get_recipe(&scope, id).await?;
    Ok(success_response(recipe))
}

pub async fn replace_recipe(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReplaceRecipeRequest>,
) -> Result<Response, ServiceError> {
    let recipe = state
        .services
        .recipes
        .replace_recipe(&scope, id, request)
        .await?;
    Ok(success_response(recipe))
}

pub async fn list_stock(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let rows = state.services.catalog.list_stock(&scope, id).await?;
    Ok(success_response(rows))
}

pub async fn set_stock(
    State(state): State<AppState>,
    Extension(scope): Extension<TenantScope>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetStockRequest>,
) -> Result<Response, ServiceError> {
    let row = state.services.catalog.set_stock(&scope, id, request).await?;
    Ok(success_response(row))
}
