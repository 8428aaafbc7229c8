// src/achievements.rs

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

use crate::error::AppError;
use crate::flags::{self, FeatureFlags};
use crate::models::Achievement;
use crate::wallet;

pub const REQUIREMENT_TYPES: [&str; 6] = [
    "swipes",
    "matches",
    "completed_trades",
    "products",
    "missions_completed",
    "auction_wins",
];

const ACHIEVEMENT_COLUMNS: &str = "id, key, title, description, requirement_type, requirement_value, \
     reward_trukoins, is_active, created_at";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub swipes: i64,
    pub matches: i64,
    pub completed_trades: i64,
    pub products: i64,
    pub missions_completed: i64,
    pub auction_wins: i64,
}

impl UserStats {
    pub fn value(&self, requirement_type: &str) -> Option<i64> {
        match requirement_type {
            "swipes" => Some(self.swipes),
            "matches" => Some(self.matches),
            "completed_trades" => Some(self.completed_trades),
            "products" => Some(self.products),
            "missions_completed" => Some(self.missions_completed),
            "auction_wins" => Some(self.auction_wins),
            _ => None,
        }
    }
}

/// Achievements whose requirement is met and that the user does not hold yet.
pub fn newly_unlocked<'a>(
    achievements: &'a [Achievement],
    stats: &UserStats,
    unlocked: &HashSet<i32>,
) -> Vec<&'a Achievement> {
    achievements
        .iter()
        .filter(|a| a.is_active && !unlocked.contains(&a.id))
        .filter(|a| {
            stats
                .value(&a.requirement_type)
                .is_some_and(|v| v >= i64::from(a.requirement_value))
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct AchievementView {
    pub achievement: Achievement,
    pub unlocked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct NewAchievement {
    pub key: String,
    pub title: String,
    pub description: Option<String>,
    pub requirement_type: String,
    pub requirement_value: i32,
    pub reward_trukoins: i64,
}

pub async fn user_stats(pool: &PgPool, user_id: i32) -> Result<UserStats, sqlx::Error> {
    let r = sqlx::query(
        r#"SELECT
               (SELECT COUNT(*) FROM swipes WHERE user_id = $1) AS swipes,
               (SELECT COUNT(*) FROM matches WHERE user1_id = $1 OR user2_id = $1) AS matches,
               (SELECT COUNT(*)
                  FROM circular_trade_participants p
                  JOIN circular_trades t ON t.id = p.trade_id
                 WHERE p.user_id = $1 AND t.status = 'completed') AS completed_trades,
               (SELECT COUNT(*) FROM products WHERE owner_id = $1) AS products,
               (SELECT COUNT(*) FROM user_missions
                 WHERE user_id = $1 AND completed_at IS NOT NULL) AS missions_completed,
               (SELECT COUNT(*) FROM auctions WHERE winner_id = $1) AS auction_wins"#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(UserStats {
        swipes: r.get("swipes"),
        matches: r.get("matches"),
        completed_trades: r.get("completed_trades"),
        products: r.get("products"),
        missions_completed: r.get("missions_completed"),
        auction_wins: r.get("auction_wins"),
    })
}

/// Unlocks every achievement the user now qualifies for and credits each
/// reward once. The unique (user, achievement) row guards double unlocks.
pub async fn evaluate_achievements(
    pool: &PgPool,
    flags: &FeatureFlags,
    user_id: i32,
) -> Result<Vec<Achievement>, AppError> {
    if !flags.is_enabled(flags::ACHIEVEMENTS) {
        return Ok(Vec::new());
    }

    let achievements = list_active(pool).await?;
    let unlocked: HashSet<i32> = sqlx::query_scalar(
        "SELECT achievement_id FROM user_achievements WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    let stats = user_stats(pool, user_id).await?;
    let mut granted = Vec::new();

    for achievement in newly_unlocked(&achievements, &stats, &unlocked) {
        let mut tx = pool.begin().await?;
        let inserted = sqlx::query(
            r#"INSERT INTO user_achievements (user_id, achievement_id)
               VALUES ($1, $2)
               ON CONFLICT (user_id, achievement_id) DO NOTHING
               RETURNING id"#,
        )
        .bind(user_id)
        .bind(achievement.id)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            continue;
        }

        if achievement.reward_trukoins > 0 {
            wallet::credit(
                &mut tx,
                user_id,
                achievement.reward_trukoins,
                wallet::REASON_ACHIEVEMENT_REWARD,
                Some(achievement.id),
            )
            .await?;
        }
        tx.commit().await?;

        log::info!("achievement unlocked user_id={user_id} key={}", achievement.key);
        granted.push(achievement.clone());
    }

    Ok(granted)
}

/// Best-effort evaluation after a domain write has committed.
pub async fn refresh(pool: &PgPool, flags: &FeatureFlags, user_id: i32) {
    if let Err(e) = evaluate_achievements(pool, flags, user_id).await {
        log::warn!("achievement evaluation failed user_id={user_id}: {e}");
    }
}

pub async fn list_active(pool: &PgPool) -> Result<Vec<Achievement>, sqlx::Error> {
    sqlx::query_as::<_, Achievement>(&format!(
        "SELECT {ACHIEVEMENT_COLUMNS} FROM achievements WHERE is_active = true ORDER BY id"
    ))
    .fetch_all(pool)
    .await
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<Achievement>, sqlx::Error> {
    sqlx::query_as::<_, Achievement>(&format!(
        "SELECT {ACHIEVEMENT_COLUMNS} FROM achievements ORDER BY id"
    ))
    .fetch_all(pool)
    .await
}

pub async fn list_for_user(
    pool: &PgPool,
    user_id: i32,
) -> Result<Vec<AchievementView>, sqlx::Error> {
    let achievements = list_active(pool).await?;
    let rows = sqlx::query(
        "SELECT achievement_id, unlocked_at FROM user_achievements WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(achievements
        .into_iter()
        .map(|achievement| {
            let unlocked_at = rows
                .iter()
                .find(|r| r.get::<i32, _>("achievement_id") == achievement.id)
                .map(|r| r.get("unlocked_at"));
            AchievementView {
                achievement,
                unlocked_at,
            }
        })
        .collect())
}

pub async fn create(pool: &PgPool, new: &NewAchievement) -> Result<Achievement, AppError> {
    if !REQUIREMENT_TYPES.contains(&new.requirement_type.as_str()) {
        return Err(AppError::bad_request(format!(
            "unknown requirement_type `{}`",
            new.requirement_type
        )));
    }
    if new.key.trim().is_empty() || new.title.trim().is_empty() {
        return Err(AppError::bad_request("key and title are required"));
    }
    if new.requirement_value <= 0 || new.reward_trukoins < 0 {
        return Err(AppError::bad_request(
            "requirement_value must be positive and reward non-negative",
        ));
    }

    let achievement = sqlx::query_as::<_, Achievement>(&format!(
        r#"INSERT INTO achievements (key, title, description, requirement_type, requirement_value, reward_trukoins)
           VALUES ($1, $2, $3, $4, $5, $6)
           ON CONFLICT (key) DO NOTHING
           RETURNING {ACHIEVEMENT_COLUMNS}"#
    ))
    .bind(new.key.trim())
    .bind(new.title.trim())
    .bind(new.description.as_deref())
    .bind(&new.requirement_type)
    .bind(new.requirement_value)
    .bind(new.reward_trukoins)
    .fetch_optional(pool)
    .await?;

    achievement.ok_or_else(|| AppError::bad_request("achievement key already exists"))
}
