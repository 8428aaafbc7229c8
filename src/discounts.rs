// src/discounts.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;

use crate::db;
use crate::error::AppError;
use crate::flags::{self, FeatureFlags};
use crate::models::{DiscountCode, DiscountType};

const DISCOUNT_COLUMNS: &str = "id, code, description, discount_type, discount_value, max_uses, \
     current_uses, valid_from, valid_until, min_plan_price_cents, applicable_plan_ids, is_active, created_at";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DiscountRejection {
    #[error("Código no válido")]
    Invalid,

    #[error("Código aún no válido")]
    NotYetValid,

    #[error("Código expirado")]
    Expired,

    #[error("Código agotado")]
    Exhausted,

    #[error("El plan no alcanza el precio mínimo")]
    BelowMinimumPrice,

    #[error("Código no aplicable a este plan")]
    NotApplicable,

    #[error("Ya has usado este código")]
    AlreadyUsed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscountQuote {
    pub discount_code_id: i32,
    pub code: String,
    pub discount_type: DiscountType,
    pub original_price: i64,
    pub discount_amount: i64,
    pub final_price: i64,
}

/// Codes are stored and compared upper-cased.
pub fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Percentage rounds down; fixed amounts are capped at the price.
pub fn discount_amount(discount_type: DiscountType, value: i64, price: i64) -> i64 {
    let price = price.max(0);
    match discount_type {
        DiscountType::Percentage => price * value.clamp(0, 100) / 100,
        DiscountType::Fixed => value.clamp(0, price),
    }
}

/// Runs the checks in order and stops at the first failure.
pub fn evaluate(
    code: Option<&DiscountCode>,
    plan_id: i32,
    plan_price: i64,
    already_used: bool,
    now: DateTime<Utc>,
) -> Result<DiscountQuote, DiscountRejection> {
    let code = code
        .filter(|c| c.is_active)
        .ok_or(DiscountRejection::Invalid)?;

    if now < code.valid_from {
        return Err(DiscountRejection::NotYetValid);
    }
    if code.valid_until.is_some_and(|until| now > until) {
        return Err(DiscountRejection::Expired);
    }
    // A user whose own redemption used the code up hears "already used".
    if !already_used && code.max_uses.is_some_and(|max| code.current_uses >= max) {
        return Err(DiscountRejection::Exhausted);
    }
    if code.min_plan_price_cents.is_some_and(|min| plan_price < min) {
        return Err(DiscountRejection::BelowMinimumPrice);
    }
    if !code.applicable_plan_ids.is_empty() && !code.applicable_plan_ids.contains(&plan_id) {
        return Err(DiscountRejection::NotApplicable);
    }
    if already_used {
        return Err(DiscountRejection::AlreadyUsed);
    }

    let amount = discount_amount(code.discount_type, code.discount_value, plan_price);
    Ok(DiscountQuote {
        discount_code_id: code.id,
        code: code.code.clone(),
        discount_type: code.discount_type,
        original_price: plan_price,
        discount_amount: amount,
        final_price: (plan_price - amount).max(0),
    })
}

async fn find_code(
    conn: &mut PgConnection,
    code: &str,
    for_update: bool,
) -> Result<Option<DiscountCode>, sqlx::Error> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    sqlx::query_as::<_, DiscountCode>(&format!(
        "SELECT {DISCOUNT_COLUMNS} FROM discount_codes WHERE code = $1{lock}"
    ))
    .bind(normalize(code))
    .fetch_optional(&mut *conn)
    .await
}

async fn used_by(
    conn: &mut PgConnection,
    discount_code_id: i32,
    user_id: i32,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM discount_code_uses WHERE discount_code_id = $1 AND user_id = $2)",
    )
    .bind(discount_code_id)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await
}

/// Read-only check used by the checkout preview.
pub async fn validate_discount_code(
    pool: &PgPool,
    flags: &FeatureFlags,
    user_id: i32,
    code: &str,
    plan_id: i32,
) -> Result<DiscountQuote, AppError> {
    flags.require(flags::DISCOUNT_CODES)?;

    let plan = db::get_plan(pool, plan_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or(AppError::NotFound("plan"))?;

    let mut conn = pool.acquire().await?;
    let found = find_code(&mut conn, code, false).await?;
    let already_used = match &found {
        Some(c) => used_by(&mut conn, c.id, user_id).await?,
        None => false,
    };

    Ok(evaluate(
        found.as_ref(),
        plan.id,
        plan.price_cents,
        already_used,
        Utc::now(),
    )?)
}

/// Locks the code, re-validates and records the use inside the caller's
/// transaction.
pub(crate) async fn redeem(
    conn: &mut PgConnection,
    user_id: i32,
    code: &str,
    plan_id: i32,
    plan_price: i64,
) -> Result<DiscountQuote, AppError> {
    let found = find_code(&mut *conn, code, true).await?;
    let already_used = match &found {
        Some(c) => used_by(&mut *conn, c.id, user_id).await?,
        None => false,
    };
    let quote = evaluate(found.as_ref(), plan_id, plan_price, already_used, Utc::now())?;

    let bumped = sqlx::query(
        r#"UPDATE discount_codes
           SET current_uses = current_uses + 1
           WHERE id = $1 AND (max_uses IS NULL OR current_uses < max_uses)"#,
    )
    .bind(quote.discount_code_id)
    .execute(&mut *conn)
    .await?;
    if bumped.rows_affected() == 0 {
        return Err(DiscountRejection::Exhausted.into());
    }

    let inserted = sqlx::query_scalar::<_, i32>(
        r#"INSERT INTO discount_code_uses (discount_code_id, user_id, plan_id, discount_amount_cents)
           VALUES ($1, $2, $3, $4)
           ON CONFLICT (discount_code_id, user_id) DO NOTHING
           RETURNING id"#,
    )
    .bind(quote.discount_code_id)
    .bind(user_id)
    .bind(plan_id)
    .bind(quote.discount_amount)
    .fetch_optional(&mut *conn)
    .await?;
    if inserted.is_none() {
        return Err(DiscountRejection::AlreadyUsed.into());
    }

    log::info!(
        "discount redeemed user_id={user_id} code={} amount={}",
        quote.code,
        quote.discount_amount
    );
    Ok(quote)
}

#[derive(Debug, Deserialize)]
pub struct NewDiscountCode {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub max_uses: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub min_plan_price_cents: Option<i64>,
    #[serde(default)]
    pub applicable_plan_ids: Vec<i32>,
}

pub async fn create(pool: &PgPool, new: &NewDiscountCode) -> Result<DiscountCode, AppError> {
    let code = normalize(&new.code);
    if code.is_empty() {
        return Err(AppError::bad_request("code is required"));
    }
    if new.discount_value < 0
        || (new.discount_type == DiscountType::Percentage && new.discount_value > 100)
    {
        return Err(AppError::bad_request("invalid discount value"));
    }
    if new.max_uses.is_some_and(|m| m <= 0) {
        return Err(AppError::bad_request("max_uses must be positive"));
    }
    if let (Some(from), Some(until)) = (new.valid_from, new.valid_until) {
        if until <= from {
            return Err(AppError::bad_request("valid_until must be after valid_from"));
        }
    }

    let created = sqlx::query_as::<_, DiscountCode>(&format!(
        r#"INSERT INTO discount_codes
               (code, description, discount_type, discount_value, max_uses, valid_from,
                valid_until, min_plan_price_cents, applicable_plan_ids)
           VALUES ($1, $2, $3, $4, $5, COALESCE($6, NOW()), $7, $8, $9)
           ON CONFLICT (code) DO NOTHING
           RETURNING {DISCOUNT_COLUMNS}"#
    ))
    .bind(&code)
    .bind(new.description.as_deref())
    .bind(new.discount_type)
    .bind(new.discount_value)
    .bind(new.max_uses)
    .bind(new.valid_from)
    .bind(new.valid_until)
    .bind(new.min_plan_price_cents)
    .bind(&new.applicable_plan_ids)
    .fetch_optional(pool)
    .await?;

    created.ok_or_else(|| AppError::bad_request("discount code already exists"))
}

pub async fn list(pool: &PgPool) -> Result<Vec<DiscountCode>, sqlx::Error> {
    sqlx::query_as::<_, DiscountCode>(&format!(
        "SELECT {DISCOUNT_COLUMNS} FROM discount_codes ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await
}

pub async fn deactivate(pool: &PgPool, discount_code_id: i32) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE discount_codes SET is_active = false WHERE id = $1")
        .bind(discount_code_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("discount code"));
    }
    Ok(())
}
