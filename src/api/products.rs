// src/api/products.rs

use actix_multipart::Multipart;
use actix_web::web::ReqData;
use actix_web::{delete, get, post, put, web, HttpResponse};
use futures_util::StreamExt;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::Product;
use crate::products::{self, NewProduct, ProductUpdate};
use crate::s3_utils::MAX_IMAGE_BYTES;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub category: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/products/feed",
    tag = "products",
    params(("category" = Option<String>, Query, description = "Only this category")),
    responses((status = 200, description = "Products to swipe", body = [Product])),
    security(("bearer" = []))
)]
#[get("/products/feed")]
pub async fn feed(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    query: web::Query<FeedQuery>,
) -> Result<HttpResponse, AppError> {
    let items =
        products::swipe_feed(&state.pool, user_id.into_inner(), query.category.as_deref()).await?;
    Ok(HttpResponse::Ok().json(items))
}

#[utoipa::path(
    get,
    path = "/api/products",
    tag = "products",
    responses((status = 200, description = "Own products", body = [Product])),
    security(("bearer" = []))
)]
#[get("/products")]
pub async fn list_own(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let items = products::list_own_products(&state.pool, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(items))
}

#[utoipa::path(
    post,
    path = "/api/products",
    tag = "products",
    request_body = NewProduct,
    responses(
        (status = 201, description = "Created", body = Product),
        (status = 400, description = "Invalid data")
    ),
    security(("bearer" = []))
)]
#[post("/products")]
pub async fn create(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<NewProduct>,
) -> Result<HttpResponse, AppError> {
    let flags = super::load_flags(&state).await?;
    let product = products::create_product(&state, &flags, user_id.into_inner(), &payload).await?;
    Ok(HttpResponse::Created().json(product))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    tag = "products",
    responses(
        (status = 200, description = "Product", body = Product),
        (status = 404, description = "Not found")
    ),
    security(("bearer" = []))
)]
#[get("/products/{id}")]
pub async fn get_one(
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let product = products::get_product(&state.pool, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(product))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    tag = "products",
    request_body = ProductUpdate,
    responses(
        (status = 200, description = "Updated", body = Product),
        (status = 403, description = "Not the owner")
    ),
    security(("bearer" = []))
)]
#[put("/products/{id}")]
pub async fn update(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
    payload: web::Json<ProductUpdate>,
) -> Result<HttpResponse, AppError> {
    let product =
        products::update_product(&state.pool, user_id.into_inner(), path.into_inner(), &payload)
            .await?;
    Ok(HttpResponse::Ok().json(product))
}

#[delete("/products/{id}")]
pub async fn delete(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    products::delete_product(&state.pool, user_id.into_inner(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/products/{id}/renew")]
pub async fn renew(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let product =
        products::renew_product(&state.pool, user_id.into_inner(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(product))
}

/// Multipart upload; the first file field is stored.
#[post("/products/{id}/images")]
pub async fn upload_image(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let mut bytes: Vec<u8> = Vec::new();
    let mut content_type = String::new();

    if let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::bad_request(format!("Formulario no válido: {e}")))?;
        if let Some(mime) = field.content_type() {
            content_type = mime.essence_str().to_string();
        }

        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| AppError::bad_request(format!("Formulario no válido: {e}")))?;
            if bytes.len() + data.len() > MAX_IMAGE_BYTES {
                return Err(AppError::bad_request("La imagen supera el tamaño máximo"));
            }
            bytes.extend_from_slice(&data);
        }
    }

    let product = products::add_image(
        &state,
        user_id.into_inner(),
        path.into_inner(),
        &content_type,
        bytes,
    )
    .await?;
    Ok(HttpResponse::Ok().json(product))
}
