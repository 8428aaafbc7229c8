// src/premium.rs
//
// Premium quotas (super likes, boosts, rewinds) and plan subscriptions.
// Every quota unit is consumed by one conditional upsert in the same
// transaction as the action it pays for.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgConnection, PgPool, Row};

use crate::db::PLAN_COLUMNS;
use crate::discounts::{self, DiscountQuote};
use crate::error::AppError;
use crate::flags::{self, FeatureFlags};
use crate::models::{Boost, PremiumPlan, ProductStatus, SwipeAction, UsageType, UserSubscription};
use crate::swipes::{self, SwipeOutcome};
use crate::{db, missions, ws, AppState};

pub const BOOST_MINUTES: i64 = 30;

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, status, amount_paid_cents, discount_code_id, \
     started_at, expires_at, cancelled_at, expiry_notified_at, created_at";

/// Per-period ceilings granted by a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    pub super_likes_per_day: i32,
    pub boosts_per_month: i32,
    pub rewinds_per_day: i32,
}

/// Ceilings for users without an active subscription.
pub const FREE_LIMITS: PlanLimits = PlanLimits {
    super_likes_per_day: 1,
    boosts_per_month: 0,
    rewinds_per_day: 1,
};

impl PlanLimits {
    pub fn limit_for(&self, kind: UsageType) -> i32 {
        match kind {
            UsageType::SuperLike => self.super_likes_per_day,
            UsageType::Boost => self.boosts_per_month,
            UsageType::Rewind => self.rewinds_per_day,
        }
    }
}

impl From<&PremiumPlan> for PlanLimits {
    fn from(plan: &PremiumPlan) -> Self {
        Self {
            super_likes_per_day: plan.super_likes_per_day,
            boosts_per_month: plan.boosts_per_month,
            rewinds_per_day: plan.rewinds_per_day,
        }
    }
}

pub fn feature_key(kind: UsageType) -> &'static str {
    match kind {
        UsageType::SuperLike => flags::SUPER_LIKES,
        UsageType::Boost => flags::BOOSTS,
        UsageType::Rewind => flags::REWINDS,
    }
}

/// First day of the counting period: the UTC day, or the UTC month for boosts.
pub fn period_start(kind: UsageType, now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    match kind {
        UsageType::SuperLike | UsageType::Rewind => today,
        UsageType::Boost => today.with_day(1).unwrap_or(today),
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct UsageStatus {
    pub usage_type: UsageType,
    pub used: i32,
    pub limit: i32,
    pub remaining: i32,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct SuperLikeReceipt {
    pub used: i32,
    pub outcome: SwipeOutcome,
}

#[derive(Debug, Serialize)]
pub struct BoostReceipt {
    pub used: i32,
    pub boost: Boost,
}

#[derive(Debug, Serialize)]
pub struct RewindReceipt {
    pub used: i32,
    pub product_id: i32,
}

pub async fn plan_limits(pool: &PgPool, user_id: i32) -> Result<PlanLimits, sqlx::Error> {
    Ok(db::get_effective_subscription(pool, user_id)
        .await?
        .map(|(_, plan)| PlanLimits::from(&plan))
        .unwrap_or(FREE_LIMITS))
}

/// Takes one unit of `kind` for the current period, or fails with
/// `LimitReached` without modifying the counter.
async fn consume_quota(
    conn: &mut PgConnection,
    user_id: i32,
    kind: UsageType,
    limit: i32,
    now: DateTime<Utc>,
) -> Result<i32, AppError> {
    if limit <= 0 {
        return Err(AppError::LimitReached);
    }

    let row = sqlx::query(
        r#"INSERT INTO premium_usage (user_id, usage_type, period_start, count)
           VALUES ($1, $2, $3, 1)
           ON CONFLICT (user_id, usage_type, period_start) DO UPDATE
               SET count = premium_usage.count + 1, updated_at = NOW()
               WHERE premium_usage.count < $4
           RETURNING count"#,
    )
    .bind(user_id)
    .bind(kind)
    .bind(period_start(kind, now))
    .bind(limit)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(r) => Ok(r.get("count")),
        None => {
            log::info!("usage limit reached user_id={user_id} kind={kind:?} limit={limit}");
            Err(AppError::LimitReached)
        }
    }
}

/// Refuses when the feature flag is off, otherwise resolves the ceiling.
async fn gate(
    pool: &PgPool,
    flags: &FeatureFlags,
    user_id: i32,
    kind: UsageType,
) -> Result<i32, AppError> {
    flags.require(feature_key(kind))?;
    Ok(plan_limits(pool, user_id).await?.limit_for(kind))
}

pub async fn send_super_like(
    state: &AppState,
    flags: &FeatureFlags,
    user_id: i32,
    product_id: i32,
    offered_product_id: Option<i32>,
) -> Result<SuperLikeReceipt, AppError> {
    let limit = gate(&state.pool, flags, user_id, UsageType::SuperLike).await?;

    let mut tx = state.pool.begin().await?;
    let used = consume_quota(&mut tx, user_id, UsageType::SuperLike, limit, Utc::now()).await?;
    let outcome = swipes::apply_swipe(
        &mut tx,
        user_id,
        product_id,
        SwipeAction::Like,
        true,
        offered_product_id,
    )
    .await?;
    tx.commit().await?;

    swipes::after_swipe(state, flags, user_id, &outcome).await;
    missions::track(&state.pool, flags, user_id, missions::ACTION_SUPER_LIKE).await;

    Ok(SuperLikeReceipt { used, outcome })
}

pub async fn activate_boost(
    state: &AppState,
    flags: &FeatureFlags,
    user_id: i32,
    product_id: i32,
) -> Result<BoostReceipt, AppError> {
    let limit = gate(&state.pool, flags, user_id, UsageType::Boost).await?;

    let product = db::get_product(&state.pool, product_id)
        .await?
        .filter(|p| p.owner_id == user_id)
        .ok_or(AppError::NotFound("product"))?;
    if product.status != ProductStatus::Active {
        return Err(AppError::bad_request("Solo puedes impulsar productos activos"));
    }

    let now = Utc::now();
    let mut tx = state.pool.begin().await?;
    let used = consume_quota(&mut tx, user_id, UsageType::Boost, limit, now).await?;
    let boost = sqlx::query_as::<_, Boost>(
        r#"INSERT INTO boosts (user_id, product_id, started_at, ends_at)
           VALUES ($1, $2, $3, $4)
           RETURNING id, user_id, product_id, started_at, ends_at"#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(now)
    .bind(now + Duration::minutes(BOOST_MINUTES))
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    log::info!("boost activated user_id={user_id} product_id={product_id}");
    Ok(BoostReceipt { used, boost })
}

pub async fn use_rewind(
    state: &AppState,
    flags: &FeatureFlags,
    user_id: i32,
) -> Result<RewindReceipt, AppError> {
    let limit = gate(&state.pool, flags, user_id, UsageType::Rewind).await?;

    let mut tx = state.pool.begin().await?;
    let used = consume_quota(&mut tx, user_id, UsageType::Rewind, limit, Utc::now()).await?;
    let Some(product_id) = swipes::remove_latest(&mut tx, user_id).await? else {
        return Err(AppError::bad_request("No hay ningún swipe para deshacer"));
    };
    tx.commit().await?;

    Ok(RewindReceipt { used, product_id })
}

pub async fn usage_summary(
    pool: &PgPool,
    flags: &FeatureFlags,
    user_id: i32,
) -> Result<Vec<UsageStatus>, AppError> {
    let limits = plan_limits(pool, user_id).await?;
    let now = Utc::now();

    let mut summary = Vec::with_capacity(3);
    for kind in [UsageType::SuperLike, UsageType::Boost, UsageType::Rewind] {
        let used: Option<i32> = sqlx::query_scalar(
            r#"SELECT count FROM premium_usage
               WHERE user_id = $1 AND usage_type = $2 AND period_start = $3"#,
        )
        .bind(user_id)
        .bind(kind)
        .bind(period_start(kind, now))
        .fetch_optional(pool)
        .await?;

        let used = used.unwrap_or(0);
        let limit = limits.limit_for(kind);
        summary.push(UsageStatus {
            usage_type: kind,
            used,
            limit,
            remaining: (limit - used).max(0),
            enabled: flags.is_enabled(feature_key(kind)),
        });
    }

    Ok(summary)
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub plan_id: i32,
    pub discount_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscribeReceipt {
    pub subscription: UserSubscription,
    pub quote: Option<DiscountQuote>,
}

/// Replaces any active subscription with a new one for `plan_id`, redeeming
/// the discount code in the same transaction.
pub async fn subscribe(
    state: &AppState,
    flags: &FeatureFlags,
    user_id: i32,
    req: &SubscribeRequest,
) -> Result<SubscribeReceipt, AppError> {
    let mut tx = state.pool.begin().await?;

    let plan = db::get_plan(&mut *tx, req.plan_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or(AppError::NotFound("plan"))?;

    let code = req
        .discount_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let quote = match code {
        Some(code) => {
            flags.require(flags::DISCOUNT_CODES)?;
            Some(discounts::redeem(&mut tx, user_id, code, plan.id, plan.price_cents).await?)
        }
        None => None,
    };

    sqlx::query(
        r#"UPDATE user_subscriptions
           SET status = 'cancelled', cancelled_at = NOW()
           WHERE user_id = $1 AND status = 'active'"#,
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    let now = Utc::now();
    let expires_at = db::days_after(now, i64::from(plan.duration_days))?;
    let amount = quote.as_ref().map_or(plan.price_cents, |q| q.final_price);
    let subscription = sqlx::query_as::<_, UserSubscription>(&format!(
        r#"INSERT INTO user_subscriptions
               (user_id, plan_id, status, amount_paid_cents, discount_code_id, started_at, expires_at)
           VALUES ($1, $2, 'active', $3, $4, $5, $6)
           RETURNING {SUBSCRIPTION_COLUMNS}"#
    ))
    .bind(user_id)
    .bind(plan.id)
    .bind(amount)
    .bind(quote.as_ref().map(|q| q.discount_code_id))
    .bind(now)
    .bind(expires_at)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!(
        "subscription started user_id={user_id} plan_id={} amount={amount}",
        plan.id
    );
    ws::notify(&state.hub, user_id, ws::SUBSCRIPTION_STATUS, json!(subscription));
    if let Some(q) = &quote {
        ws::notify(&state.hub, user_id, ws::DISCOUNT_REDEEMED, json!(q));
        missions::track(&state.pool, flags, user_id, missions::ACTION_REDEEM_DISCOUNT).await;
    }

    Ok(SubscribeReceipt {
        subscription,
        quote,
    })
}

pub async fn cancel_subscription(
    state: &AppState,
    user_id: i32,
    subscription_id: i32,
) -> Result<UserSubscription, AppError> {
    let subscription = sqlx::query_as::<_, UserSubscription>(&format!(
        r#"UPDATE user_subscriptions
           SET status = 'cancelled', cancelled_at = NOW()
           WHERE id = $1 AND user_id = $2 AND status = 'active'
           RETURNING {SUBSCRIPTION_COLUMNS}"#
    ))
    .bind(subscription_id)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("active subscription"))?;

    ws::notify(&state.hub, user_id, ws::SUBSCRIPTION_STATUS, json!(subscription));
    Ok(subscription)
}

pub async fn list_subscriptions(
    pool: &PgPool,
    user_id: i32,
) -> Result<Vec<UserSubscription>, sqlx::Error> {
    sqlx::query_as::<_, UserSubscription>(&format!(
        r#"SELECT {SUBSCRIPTION_COLUMNS} FROM user_subscriptions
           WHERE user_id = $1
           ORDER BY created_at DESC"#
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Serialize)]
pub struct CurrentSubscription {
    pub subscription: UserSubscription,
    pub plan: PremiumPlan,
    pub limits: PlanLimits,
}

pub async fn current_subscription(
    pool: &PgPool,
    user_id: i32,
) -> Result<Option<CurrentSubscription>, sqlx::Error> {
    Ok(db::get_effective_subscription(pool, user_id)
        .await?
        .map(|(subscription, plan)| CurrentSubscription {
            limits: PlanLimits::from(&plan),
            subscription,
            plan,
        }))
}

#[derive(Debug, Deserialize)]
pub struct PlanInput {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub duration_days: i32,
    pub super_likes_per_day: i32,
    pub boosts_per_month: i32,
    pub rewinds_per_day: i32,
    #[serde(default)]
    pub can_see_likes: bool,
    #[serde(default)]
    pub ad_free: bool,
    #[serde(default)]
    pub priority_support: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl PlanInput {
    fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::bad_request("name is required"));
        }
        if self.price_cents < 0 {
            return Err(AppError::bad_request("price must be non-negative"));
        }
        if !(1..=db::MAX_DURATION_DAYS).contains(&i64::from(self.duration_days)) {
            return Err(AppError::bad_request(format!(
                "duration_days must be between 1 and {}",
                db::MAX_DURATION_DAYS
            )));
        }
        if self.super_likes_per_day < 0 || self.boosts_per_month < 0 || self.rewinds_per_day < 0 {
            return Err(AppError::bad_request("limits must be non-negative"));
        }
        Ok(())
    }
}

pub async fn create_plan(pool: &PgPool, input: &PlanInput) -> Result<PremiumPlan, AppError> {
    input.validate()?;

    let plan = sqlx::query_as::<_, PremiumPlan>(&format!(
        r#"INSERT INTO premium_plans
               (name, description, price_cents, duration_days, super_likes_per_day,
                boosts_per_month, rewinds_per_day, can_see_likes, ad_free, priority_support, is_active)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
           RETURNING {PLAN_COLUMNS}"#
    ))
    .bind(input.name.trim())
    .bind(input.description.as_deref())
    .bind(input.price_cents)
    .bind(input.duration_days)
    .bind(input.super_likes_per_day)
    .bind(input.boosts_per_month)
    .bind(input.rewinds_per_day)
    .bind(input.can_see_likes)
    .bind(input.ad_free)
    .bind(input.priority_support)
    .bind(input.is_active)
    .fetch_one(pool)
    .await?;

    Ok(plan)
}

/// Full replacement of a plan's fields. Running subscriptions keep their
/// `expires_at`; new limits apply from the next request.
pub async fn update_plan(
    pool: &PgPool,
    plan_id: i32,
    input: &PlanInput,
) -> Result<PremiumPlan, AppError> {
    input.validate()?;

    sqlx::query_as::<_, PremiumPlan>(&format!(
        r#"UPDATE premium_plans SET
               name = $2, description = $3, price_cents = $4, duration_days = $5,
               super_likes_per_day = $6, boosts_per_month = $7, rewinds_per_day = $8,
               can_see_likes = $9, ad_free = $10, priority_support = $11, is_active = $12
           WHERE id = $1
           RETURNING {PLAN_COLUMNS}"#
    ))
    .bind(plan_id)
    .bind(input.name.trim())
    .bind(input.description.as_deref())
    .bind(input.price_cents)
    .bind(input.duration_days)
    .bind(input.super_likes_per_day)
    .bind(input.boosts_per_month)
    .bind(input.rewinds_per_day)
    .bind(input.can_see_likes)
    .bind(input.ad_free)
    .bind(input.priority_support)
    .bind(input.is_active)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("plan"))
}
