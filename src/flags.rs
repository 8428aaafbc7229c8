// src/flags.rs
//
// Feature flags are read once per request and handed to the business
// functions as an immutable snapshot.

use std::collections::HashMap;

use sqlx::PgPool;

use crate::error::AppError;
use crate::models::FeatureFlag;

pub const SUPER_LIKES: &str = "super_likes";
pub const BOOSTS: &str = "boosts";
pub const REWINDS: &str = "rewinds";
pub const AUCTIONS: &str = "auctions";
pub const CIRCULAR_TRADES: &str = "circular_trades";
pub const MISSIONS: &str = "missions";
pub const ACHIEVEMENTS: &str = "achievements";
pub const DISCOUNT_CODES: &str = "discount_codes";

#[derive(Debug, Clone, Default)]
pub struct FeatureFlags {
    enabled: HashMap<String, bool>,
}

impl FeatureFlags {
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        Self {
            enabled: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Unknown keys count as disabled.
    pub fn is_enabled(&self, key: &str) -> bool {
        self.enabled.get(key).copied().unwrap_or(false)
    }

    pub fn require(&self, key: &'static str) -> Result<(), AppError> {
        if self.is_enabled(key) {
            Ok(())
        } else {
            Err(AppError::FeatureDisabled(key))
        }
    }
}

pub async fn load(pool: &PgPool) -> Result<FeatureFlags, sqlx::Error> {
    let rows: Vec<(String, bool)> =
        sqlx::query_as("SELECT feature_key, is_enabled FROM feature_flags")
            .fetch_all(pool)
            .await?;

    Ok(FeatureFlags::from_pairs(rows))
}

pub async fn list(pool: &PgPool) -> Result<Vec<FeatureFlag>, sqlx::Error> {
    sqlx::query_as::<_, FeatureFlag>(
        r#"SELECT feature_key, is_enabled, requires_api_key, category, description, updated_at
           FROM feature_flags
           ORDER BY category, feature_key"#,
    )
    .fetch_all(pool)
    .await
}

pub async fn set_enabled(
    pool: &PgPool,
    feature_key: &str,
    is_enabled: bool,
) -> Result<Option<FeatureFlag>, sqlx::Error> {
    sqlx::query_as::<_, FeatureFlag>(
        r#"UPDATE feature_flags
           SET is_enabled = $2, updated_at = NOW()
           WHERE feature_key = $1
           RETURNING feature_key, is_enabled, requires_api_key, category, description, updated_at"#,
    )
    .bind(feature_key)
    .bind(is_enabled)
    .fetch_optional(pool)
    .await
}
