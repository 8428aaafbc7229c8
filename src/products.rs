// src/products.rs

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::db::{self, PRODUCT_COLUMNS};
use crate::error::AppError;
use crate::flags::FeatureFlags;
use crate::models::{Product, ProductStatus};
use crate::{achievements, missions, s3_utils, ws, AppState};

pub const MAX_IMAGES: usize = 6;
pub const FEED_PAGE_SIZE: i64 = 20;

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewProduct {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    #[serde(default)]
    pub estimated_value: i64,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProductUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub estimated_value: Option<i64>,
    pub status: Option<ProductStatus>,
}

fn clean_required(value: &str, field: &str) -> Result<String, AppError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AppError::bad_request(format!("{field} es obligatorio")));
    }
    Ok(v.to_string())
}

/// Owners may only pause or resume a listing; expiry and trading are
/// system transitions.
fn check_owner_status(current: ProductStatus, next: ProductStatus) -> Result<(), AppError> {
    let allowed = matches!(
        (current, next),
        (ProductStatus::Active, ProductStatus::Paused)
            | (ProductStatus::Paused, ProductStatus::Active)
    ) || current == next;

    if allowed {
        Ok(())
    } else {
        Err(AppError::bad_request("Cambio de estado no permitido"))
    }
}

pub async fn create_product(
    state: &AppState,
    flags: &FeatureFlags,
    owner_id: i32,
    new: &NewProduct,
) -> Result<Product, AppError> {
    let title = clean_required(&new.title, "El título")?;
    let category = clean_required(&new.category, "La categoría")?;
    if new.estimated_value < 0 {
        return Err(AppError::bad_request("El valor estimado no puede ser negativo"));
    }

    let expiry_days = db::product_expiry_days(&state.pool).await?;
    let expires_at = db::days_after(Utc::now(), expiry_days)?;

    let product = sqlx::query_as::<_, Product>(&format!(
        r#"INSERT INTO products (owner_id, title, description, category, estimated_value, expires_at)
           VALUES ($1, $2, $3, $4, $5, $6)
           RETURNING {PRODUCT_COLUMNS}"#
    ))
    .bind(owner_id)
    .bind(&title)
    .bind(new.description.as_deref())
    .bind(&category)
    .bind(new.estimated_value)
    .bind(expires_at)
    .fetch_one(&state.pool)
    .await?;

    log::info!("product created id={} owner={owner_id}", product.id);
    missions::track(&state.pool, flags, owner_id, missions::ACTION_CREATE_PRODUCT).await;
    achievements::refresh(&state.pool, flags, owner_id).await;

    Ok(product)
}

pub async fn get_product(pool: &PgPool, product_id: i32) -> Result<Product, AppError> {
    db::get_product(pool, product_id)
        .await?
        .ok_or(AppError::NotFound("product"))
}

async fn get_owned(pool: &PgPool, owner_id: i32, product_id: i32) -> Result<Product, AppError> {
    let product = get_product(pool, product_id).await?;
    if product.owner_id != owner_id {
        return Err(AppError::Forbidden);
    }
    Ok(product)
}

pub async fn update_product(
    pool: &PgPool,
    owner_id: i32,
    product_id: i32,
    changes: &ProductUpdate,
) -> Result<Product, AppError> {
    let current = get_owned(pool, owner_id, product_id).await?;

    let title = match &changes.title {
        Some(t) => clean_required(t, "El título")?,
        None => current.title.clone(),
    };
    let category = match &changes.category {
        Some(c) => clean_required(c, "La categoría")?,
        None => current.category.clone(),
    };
    let estimated_value = changes.estimated_value.unwrap_or(current.estimated_value);
    if estimated_value < 0 {
        return Err(AppError::bad_request("El valor estimado no puede ser negativo"));
    }
    let status = changes.status.unwrap_or(current.status);
    check_owner_status(current.status, status)?;

    let updated = sqlx::query_as::<_, Product>(&format!(
        r#"UPDATE products
           SET title = $2, description = $3, category = $4, estimated_value = $5,
               status = $6, updated_at = NOW()
           WHERE id = $1
           RETURNING {PRODUCT_COLUMNS}"#
    ))
    .bind(product_id)
    .bind(&title)
    .bind(changes.description.as_deref().or(current.description.as_deref()))
    .bind(&category)
    .bind(estimated_value)
    .bind(status)
    .fetch_one(pool)
    .await?;

    Ok(updated)
}

/// Puts an expired listing back in the feed for another expiry period.
pub async fn renew_product(
    pool: &PgPool,
    owner_id: i32,
    product_id: i32,
) -> Result<Product, AppError> {
    let current = get_owned(pool, owner_id, product_id).await?;
    if current.status != ProductStatus::Expired {
        return Err(AppError::bad_request("Solo se pueden renovar productos expirados"));
    }

    let expiry_days = db::product_expiry_days(pool).await?;
    let expires_at = db::days_after(Utc::now(), expiry_days)?;
    let renewed = sqlx::query_as::<_, Product>(&format!(
        r#"UPDATE products
           SET status = 'active', expires_at = $2,
               notified_3d_at = NULL, notified_1d_at = NULL, updated_at = NOW()
           WHERE id = $1
           RETURNING {PRODUCT_COLUMNS}"#
    ))
    .bind(product_id)
    .bind(expires_at)
    .fetch_one(pool)
    .await?;

    Ok(renewed)
}

pub async fn delete_product(pool: &PgPool, owner_id: i32, product_id: i32) -> Result<(), AppError> {
    get_owned(pool, owner_id, product_id).await?;

    sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(product_id)
        .execute(pool)
        .await?;

    log::info!("product deleted id={product_id} owner={owner_id}");
    Ok(())
}

pub async fn list_own_products(pool: &PgPool, owner_id: i32) -> Result<Vec<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE owner_id = $1 ORDER BY created_at DESC"
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

/// Active products from other users the viewer has not swiped yet.
/// Products with a running boost come first, then featured ones, then newest.
pub async fn swipe_feed(
    pool: &PgPool,
    user_id: i32,
    category: Option<&str>,
) -> Result<Vec<Product>, sqlx::Error> {
    let columns = PRODUCT_COLUMNS
        .split(", ")
        .map(|c| format!("p.{c}"))
        .collect::<Vec<_>>()
        .join(", ");

    sqlx::query_as::<_, Product>(&format!(
        r#"SELECT {columns}
           FROM products p
           WHERE p.status = 'active'
             AND p.owner_id <> $1
             AND p.expires_at > NOW()
             AND ($2::TEXT IS NULL OR p.category = $2)
             AND NOT EXISTS (
                 SELECT 1 FROM swipes s WHERE s.user_id = $1 AND s.product_id = p.id
             )
           ORDER BY
             EXISTS (
                 SELECT 1 FROM boosts b
                 WHERE b.product_id = p.id AND b.started_at <= NOW() AND b.ends_at > NOW()
             ) DESC,
             p.is_featured DESC,
             p.created_at DESC
           LIMIT $3"#
    ))
    .bind(user_id)
    .bind(category)
    .bind(FEED_PAGE_SIZE)
    .fetch_all(pool)
    .await
}

pub async fn add_image(
    state: &AppState,
    owner_id: i32,
    product_id: i32,
    content_type: &str,
    bytes: Vec<u8>,
) -> Result<Product, AppError> {
    let product = get_owned(&state.pool, owner_id, product_id).await?;
    if product.images.len() >= MAX_IMAGES {
        return Err(AppError::bad_request("Se ha alcanzado el número máximo de imágenes"));
    }

    let url = s3_utils::put_product_image(state, owner_id, product_id, content_type, bytes).await?;

    let updated = sqlx::query_as::<_, Product>(&format!(
        r#"UPDATE products
           SET images = array_append(images, $2), updated_at = NOW()
           WHERE id = $1
           RETURNING {PRODUCT_COLUMNS}"#
    ))
    .bind(product_id)
    .bind(&url)
    .fetch_one(&state.pool)
    .await?;

    Ok(updated)
}

/// Admin featuring; every connected client hears about it.
pub async fn set_featured(
    state: &AppState,
    product_id: i32,
    featured: bool,
) -> Result<Product, AppError> {
    let product = sqlx::query_as::<_, Product>(&format!(
        r#"UPDATE products SET is_featured = $2, updated_at = NOW()
           WHERE id = $1
           RETURNING {PRODUCT_COLUMNS}"#
    ))
    .bind(product_id)
    .bind(featured)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("product"))?;

    if featured {
        ws::broadcast(&state.hub, ws::PRODUCT_FEATURED, json!(product));
    }
    Ok(product)
}
