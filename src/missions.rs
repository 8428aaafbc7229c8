// src/missions.rs
//
// Mission lifecycle: Assigned -> Completed -> Claimed. Progress is clamped to
// the mission target and `completed_at` is stamped exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::error::AppError;
use crate::flags::{self, FeatureFlags};
use crate::models::{Mission, UserMission};
use crate::wallet;

pub const ACTION_SWIPE: &str = "swipe";
pub const ACTION_SUPER_LIKE: &str = "super_like";
pub const ACTION_MATCH: &str = "match";
pub const ACTION_SEND_MESSAGE: &str = "send_message";
pub const ACTION_CREATE_PRODUCT: &str = "create_product";
pub const ACTION_PLACE_BID: &str = "place_bid";
pub const ACTION_JOIN_TRADE: &str = "join_trade";
pub const ACTION_REDEEM_DISCOUNT: &str = "redeem_discount";

const USER_MISSION_COLUMNS: &str = "id, user_id, mission_id, current_progress, completed_at, \
     reward_claimed_at, created_at, updated_at";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MissionRejection {
    #[error("Misión no encontrada")]
    NotFound,

    #[error("La misión aún no está completada")]
    NotCompleted,

    #[error("Recompensa ya reclamada")]
    AlreadyClaimed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionState {
    Assigned,
    Completed,
    Claimed,
}

impl MissionState {
    pub fn of(completed_at: Option<DateTime<Utc>>, reward_claimed_at: Option<DateTime<Utc>>) -> Self {
        match (completed_at, reward_claimed_at) {
            (_, Some(_)) => MissionState::Claimed,
            (Some(_), None) => MissionState::Completed,
            (None, None) => MissionState::Assigned,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MissionView {
    pub mission: Mission,
    pub user_mission_id: Option<i32>,
    pub current_progress: i32,
    pub state: MissionState,
}

#[derive(Debug, Serialize)]
pub struct ClaimReceipt {
    pub user_mission_id: i32,
    pub reward: i64,
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
pub struct NewMission {
    pub title: String,
    pub description: Option<String>,
    pub action_type: String,
    pub target_count: i32,
    pub reward_trukoins: i64,
}

/// Advances every active mission listening to `action_type`, creating the
/// user's row on first occurrence. Rows already completed are left untouched.
pub async fn update_mission_progress(
    pool: &PgPool,
    flags: &FeatureFlags,
    user_id: i32,
    action_type: &str,
    count: i32,
) -> Result<Vec<UserMission>, AppError> {
    if !flags.is_enabled(flags::MISSIONS) || count <= 0 {
        return Ok(Vec::new());
    }

    let missions: Vec<(i32, i32)> = sqlx::query_as(
        "SELECT id, target_count FROM missions WHERE is_active = true AND action_type = $1",
    )
    .bind(action_type)
    .fetch_all(pool)
    .await?;

    let mut updated = Vec::with_capacity(missions.len());
    for (mission_id, target) in missions {
        let row = sqlx::query_as::<_, UserMission>(&format!(
            r#"INSERT INTO user_missions (user_id, mission_id, current_progress, completed_at)
               VALUES ($1, $2, LEAST($3, $4), CASE WHEN $3 >= $4 THEN NOW() END)
               ON CONFLICT (user_id, mission_id) DO UPDATE SET
                   current_progress = LEAST(user_missions.current_progress + $3, $4),
                   completed_at = CASE
                       WHEN user_missions.current_progress + $3 >= $4 THEN NOW()
                   END,
                   updated_at = NOW()
               WHERE user_missions.completed_at IS NULL
               RETURNING {USER_MISSION_COLUMNS}"#
        ))
        .bind(user_id)
        .bind(mission_id)
        .bind(count)
        .bind(target)
        .fetch_optional(pool)
        .await?;

        if let Some(um) = row {
            if um.completed_at.is_some() {
                log::info!("mission completed user_id={user_id} mission_id={mission_id}");
            }
            updated.push(um);
        }
    }

    Ok(updated)
}

/// Best-effort progress hook used after a domain write has committed.
pub async fn track(pool: &PgPool, flags: &FeatureFlags, user_id: i32, action_type: &str) {
    if let Err(e) = update_mission_progress(pool, flags, user_id, action_type, 1).await {
        log::warn!("mission progress failed user_id={user_id} action={action_type}: {e}");
    }
}

/// Stamps `reward_claimed_at` and credits the reward in one transaction.
/// A second claim finds `reward_claimed_at` set and credits nothing.
pub async fn claim_mission_reward(
    pool: &PgPool,
    flags: &FeatureFlags,
    user_id: i32,
    user_mission_id: i32,
) -> Result<ClaimReceipt, AppError> {
    flags.require(flags::MISSIONS)?;

    let mut tx = pool.begin().await?;

    let claimed = sqlx::query(
        r#"UPDATE user_missions um
           SET reward_claimed_at = NOW(), updated_at = NOW()
           FROM missions m
           WHERE um.id = $1
             AND um.user_id = $2
             AND m.id = um.mission_id
             AND um.completed_at IS NOT NULL
             AND um.reward_claimed_at IS NULL
           RETURNING m.reward_trukoins"#,
    )
    .bind(user_mission_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(claimed) = claimed else {
        let state = sqlx::query(
            "SELECT completed_at, reward_claimed_at FROM user_missions WHERE id = $1 AND user_id = $2",
        )
        .bind(user_mission_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let rejection = match state {
            None => MissionRejection::NotFound,
            Some(r) => match MissionState::of(r.get("completed_at"), r.get("reward_claimed_at")) {
                MissionState::Assigned => MissionRejection::NotCompleted,
                _ => MissionRejection::AlreadyClaimed,
            },
        };
        return Err(rejection.into());
    };

    let reward: i64 = claimed.get("reward_trukoins");
    let balance = if reward > 0 {
        wallet::credit(
            &mut tx,
            user_id,
            reward,
            wallet::REASON_MISSION_REWARD,
            Some(user_mission_id),
        )
        .await?
    } else {
        0
    };

    tx.commit().await?;

    Ok(ClaimReceipt {
        user_mission_id,
        reward,
        balance,
    })
}

pub async fn list_for_user(pool: &PgPool, user_id: i32) -> Result<Vec<MissionView>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT m.id, m.title, m.description, m.action_type, m.target_count, m.reward_trukoins,
                  m.is_active, m.created_at,
                  um.id AS user_mission_id, um.current_progress, um.completed_at, um.reward_claimed_at
           FROM missions m
           LEFT JOIN user_missions um ON um.mission_id = m.id AND um.user_id = $1
           WHERE m.is_active = true
           ORDER BY m.id"#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            let progress: Option<i32> = r.get("current_progress");
            MissionView {
                mission: Mission {
                    id: r.get("id"),
                    title: r.get("title"),
                    description: r.get("description"),
                    action_type: r.get("action_type"),
                    target_count: r.get("target_count"),
                    reward_trukoins: r.get("reward_trukoins"),
                    is_active: r.get("is_active"),
                    created_at: r.get("created_at"),
                },
                user_mission_id: r.get("user_mission_id"),
                current_progress: progress.unwrap_or(0),
                state: MissionState::of(r.get("completed_at"), r.get("reward_claimed_at")),
            }
        })
        .collect())
}

pub async fn create(pool: &PgPool, new: &NewMission) -> Result<Mission, AppError> {
    if new.title.trim().is_empty() || new.action_type.trim().is_empty() {
        return Err(AppError::bad_request("title and action_type are required"));
    }
    if new.target_count <= 0 || new.reward_trukoins < 0 {
        return Err(AppError::bad_request(
            "target_count must be positive and reward non-negative",
        ));
    }

    let mission = sqlx::query_as::<_, Mission>(
        r#"INSERT INTO missions (title, description, action_type, target_count, reward_trukoins)
           VALUES ($1, $2, $3, $4, $5)
           RETURNING id, title, description, action_type, target_count, reward_trukoins, is_active, created_at"#,
    )
    .bind(new.title.trim())
    .bind(new.description.as_deref())
    .bind(new.action_type.trim())
    .bind(new.target_count)
    .bind(new.reward_trukoins)
    .fetch_one(pool)
    .await?;

    Ok(mission)
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<Mission>, sqlx::Error> {
    sqlx::query_as::<_, Mission>(
        r#"SELECT id, title, description, action_type, target_count, reward_trukoins, is_active, created_at
           FROM missions
           ORDER BY id"#,
    )
    .fetch_all(pool)
    .await
}

pub async fn set_active(pool: &PgPool, mission_id: i32, is_active: bool) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE missions SET is_active = $2 WHERE id = $1")
        .bind(mission_id)
        .bind(is_active)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("mission"));
    }
    Ok(())
}
