// src/db.rs

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgExecutor, PgPool, Row};

use crate::error::AppError;
use crate::models::{PremiumPlan, Product, User, UserSubscription};

pub const PRODUCT_COLUMNS: &str = "id, owner_id, title, description, category, estimated_value, images, \
     status, is_featured, expires_at, notified_3d_at, notified_1d_at, created_at, updated_at";

pub const PLAN_COLUMNS: &str = "id, name, description, price_cents, duration_days, super_likes_per_day, \
     boosts_per_month, rewinds_per_day, can_see_likes, ad_free, priority_support, is_active, created_at";

pub const DEFAULT_PRODUCT_EXPIRY_DAYS: i64 = 30;

/// Upper bound for admin-configured durations (listing expiry, plan length).
pub const MAX_DURATION_DAYS: i64 = 3650;

/// `from + days`, refusing durations outside `1..=MAX_DURATION_DAYS`.
pub fn days_after(from: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>, AppError> {
    (1..=MAX_DURATION_DAYS)
        .contains(&days)
        .then(|| Duration::try_days(days))
        .flatten()
        .and_then(|d| from.checked_add_signed(d))
        .ok_or_else(|| AppError::bad_request("Duración fuera de rango"))
}

pub async fn get_user(pool: &PgPool, user_id: i32) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT id, email, username, is_admin, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn is_admin(pool: &PgPool, user_id: i32) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT is_admin FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.get::<bool, _>("is_admin")).unwrap_or(false))
}

pub async fn get_product<'e, E: PgExecutor<'e>>(
    exec: E,
    product_id: i32,
) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
    ))
    .bind(product_id)
    .fetch_optional(exec)
    .await
}

pub async fn get_plan<'e, E: PgExecutor<'e>>(
    exec: E,
    plan_id: i32,
) -> Result<Option<PremiumPlan>, sqlx::Error> {
    sqlx::query_as::<_, PremiumPlan>(&format!(
        "SELECT {PLAN_COLUMNS} FROM premium_plans WHERE id = $1"
    ))
    .bind(plan_id)
    .fetch_optional(exec)
    .await
}

pub async fn list_active_plans(pool: &PgPool) -> Result<Vec<PremiumPlan>, sqlx::Error> {
    sqlx::query_as::<_, PremiumPlan>(&format!(
        "SELECT {PLAN_COLUMNS} FROM premium_plans WHERE is_active = true ORDER BY price_cents ASC"
    ))
    .fetch_all(pool)
    .await
}

/// Subscription currently granting premium limits: active and not past `expires_at`.
pub async fn get_effective_subscription<'e, E: PgExecutor<'e>>(
    exec: E,
    user_id: i32,
) -> Result<Option<(UserSubscription, PremiumPlan)>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT s.id, s.user_id, s.plan_id, s.status, s.amount_paid_cents, s.discount_code_id,
                  s.started_at, s.expires_at, s.cancelled_at, s.expiry_notified_at, s.created_at,
                  p.name, p.description, p.price_cents, p.duration_days, p.super_likes_per_day,
                  p.boosts_per_month, p.rewinds_per_day, p.can_see_likes, p.ad_free,
                  p.priority_support, p.is_active, p.created_at AS plan_created_at
           FROM user_subscriptions s
           JOIN premium_plans p ON p.id = s.plan_id
           WHERE s.user_id = $1
             AND s.status = 'active'
             AND s.expires_at > NOW()
           ORDER BY s.started_at DESC
           LIMIT 1"#,
    )
    .bind(user_id)
    .fetch_optional(exec)
    .await?;

    Ok(row.map(|r| {
        (
            UserSubscription {
                id: r.get("id"),
                user_id: r.get("user_id"),
                plan_id: r.get("plan_id"),
                status: r.get("status"),
                amount_paid_cents: r.get("amount_paid_cents"),
                discount_code_id: r.get("discount_code_id"),
                started_at: r.get("started_at"),
                expires_at: r.get("expires_at"),
                cancelled_at: r.get("cancelled_at"),
                expiry_notified_at: r.get("expiry_notified_at"),
                created_at: r.get("created_at"),
            },
            PremiumPlan {
                id: r.get("plan_id"),
                name: r.get("name"),
                description: r.get("description"),
                price_cents: r.get("price_cents"),
                duration_days: r.get("duration_days"),
                super_likes_per_day: r.get("super_likes_per_day"),
                boosts_per_month: r.get("boosts_per_month"),
                rewinds_per_day: r.get("rewinds_per_day"),
                can_see_likes: r.get("can_see_likes"),
                ad_free: r.get("ad_free"),
                priority_support: r.get("priority_support"),
                is_active: r.get("is_active"),
                created_at: r.get("plan_created_at"),
            },
        )
    }))
}

pub async fn get_setting(
    pool: &PgPool,
    key: &str,
) -> Result<Option<serde_json::Value>, sqlx::Error> {
    let row = sqlx::query("SELECT value FROM admin_settings WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.get("value")))
}

pub async fn put_setting(
    pool: &PgPool,
    key: &str,
    value: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO admin_settings (key, value)
           VALUES ($1, $2)
           ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()"#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn product_expiry_days(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let days = get_setting(pool, "product_expiry_days")
        .await?
        .and_then(|v| v.as_i64())
        .filter(|d| (1..=MAX_DURATION_DAYS).contains(d))
        .unwrap_or(DEFAULT_PRODUCT_EXPIRY_DAYS);

    Ok(days)
}
