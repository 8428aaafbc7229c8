// src/trades.rs
//
// Circular trades: a ring of 3 to 10 users, each bringing one product. The
// trade row is locked while a participant joins, so the count it reads is the
// count it writes against.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;

use crate::error::AppError;
use crate::flags::{self, FeatureFlags};
use crate::models::{CircularTrade, CircularTradeParticipant, ProductStatus, TradeStatus};
use crate::{achievements, db, missions, ws, AppState};

pub const MIN_PARTICIPANTS: i32 = 3;
pub const MAX_PARTICIPANTS: i32 = 10;

const TRADE_COLUMNS: &str =
    "id, creator_id, title, description, min_participants, max_participants, status, created_at, updated_at";
const PARTICIPANT_COLUMNS: &str = "id, trade_id, user_id, product_id, position, joined_at";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TradeRejection {
    #[error("El intercambio ya no acepta participantes")]
    NotOpen,

    #[error("El intercambio está completo")]
    Full,

    #[error("Ya participas en este intercambio")]
    AlreadyJoined,

    #[error("El producto no es válido para este intercambio")]
    InvalidProduct,

    #[error("El número de participantes debe estar entre 3 y 10")]
    InvalidBounds,

    #[error("Solo el creador puede gestionar el intercambio")]
    NotCreator,

    #[error("El intercambio no está en curso")]
    NotInProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub position: i32,
    pub activates: bool,
}

pub fn check_bounds(min_participants: i32, max_participants: i32) -> Result<(), TradeRejection> {
    if min_participants < MIN_PARTICIPANTS
        || max_participants > MAX_PARTICIPANTS
        || min_participants > max_participants
    {
        return Err(TradeRejection::InvalidBounds);
    }
    Ok(())
}

/// Decides whether one more participant fits, given the current count.
pub fn admit(
    trade: &CircularTrade,
    count: i32,
    already_member: bool,
) -> Result<Admission, TradeRejection> {
    if trade.status != TradeStatus::Pending {
        return Err(TradeRejection::NotOpen);
    }
    if already_member {
        return Err(TradeRejection::AlreadyJoined);
    }
    if count >= trade.max_participants {
        return Err(TradeRejection::Full);
    }
    let position = count + 1;
    Ok(Admission {
        position,
        activates: position >= trade.min_participants,
    })
}

#[derive(Debug, Deserialize)]
pub struct NewTrade {
    pub title: String,
    pub description: Option<String>,
    pub min_participants: i32,
    pub max_participants: i32,
    pub product_id: i32,
}

#[derive(Debug, Serialize)]
pub struct TradeDetail {
    pub trade: CircularTrade,
    pub participants: Vec<CircularTradeParticipant>,
}

async fn ensure_own_active_product(
    conn: &mut PgConnection,
    user_id: i32,
    product_id: i32,
) -> Result<(), AppError> {
    let ok = db::get_product(&mut *conn, product_id)
        .await?
        .is_some_and(|p| p.owner_id == user_id && p.status == ProductStatus::Active);
    if !ok {
        return Err(TradeRejection::InvalidProduct.into());
    }
    Ok(())
}

async fn insert_participant(
    conn: &mut PgConnection,
    trade_id: i32,
    user_id: i32,
    product_id: i32,
    position: i32,
) -> Result<CircularTradeParticipant, sqlx::Error> {
    sqlx::query_as::<_, CircularTradeParticipant>(&format!(
        r#"INSERT INTO circular_trade_participants (trade_id, user_id, product_id, position)
           VALUES ($1, $2, $3, $4)
           RETURNING {PARTICIPANT_COLUMNS}"#
    ))
    .bind(trade_id)
    .bind(user_id)
    .bind(product_id)
    .bind(position)
    .fetch_one(&mut *conn)
    .await
}

async fn participants<'e, E>(
    executor: E,
    trade_id: i32,
) -> Result<Vec<CircularTradeParticipant>, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_as::<_, CircularTradeParticipant>(&format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM circular_trade_participants WHERE trade_id = $1 ORDER BY position"
    ))
    .bind(trade_id)
    .fetch_all(executor)
    .await
}

pub async fn create_circular_trade(
    state: &AppState,
    flags: &FeatureFlags,
    creator_id: i32,
    new: &NewTrade,
) -> Result<TradeDetail, AppError> {
    flags.require(flags::CIRCULAR_TRADES)?;
    check_bounds(new.min_participants, new.max_participants)?;

    let title = new.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("El título es obligatorio"));
    }

    let mut tx = state.pool.begin().await?;
    ensure_own_active_product(&mut tx, creator_id, new.product_id).await?;

    let trade = sqlx::query_as::<_, CircularTrade>(&format!(
        r#"INSERT INTO circular_trades (creator_id, title, description, min_participants, max_participants)
           VALUES ($1, $2, $3, $4, $5)
           RETURNING {TRADE_COLUMNS}"#
    ))
    .bind(creator_id)
    .bind(title)
    .bind(new.description.as_deref())
    .bind(new.min_participants)
    .bind(new.max_participants)
    .fetch_one(&mut *tx)
    .await?;

    let creator = insert_participant(&mut tx, trade.id, creator_id, new.product_id, 1).await?;
    tx.commit().await?;

    log::info!("circular trade created id={} creator={creator_id}", trade.id);
    missions::track(&state.pool, flags, creator_id, missions::ACTION_JOIN_TRADE).await;

    Ok(TradeDetail {
        trade,
        participants: vec![creator],
    })
}

pub async fn join_circular_trade(
    state: &AppState,
    flags: &FeatureFlags,
    user_id: i32,
    trade_id: i32,
    product_id: i32,
) -> Result<TradeDetail, AppError> {
    flags.require(flags::CIRCULAR_TRADES)?;

    let mut tx = state.pool.begin().await?;
    let trade = sqlx::query_as::<_, CircularTrade>(&format!(
        "SELECT {TRADE_COLUMNS} FROM circular_trades WHERE id = $1 FOR UPDATE"
    ))
    .bind(trade_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("trade"))?;

    let current = participants(&mut *tx, trade_id).await?;
    let already_member = current.iter().any(|p| p.user_id == user_id);
    let count = i32::try_from(current.len()).unwrap_or(i32::MAX);

    let admission = admit(&trade, count, already_member)?;
    ensure_own_active_product(&mut tx, user_id, product_id).await?;

    let joined = insert_participant(&mut tx, trade_id, user_id, product_id, admission.position).await?;

    let trade = if admission.activates {
        sqlx::query_as::<_, CircularTrade>(&format!(
            r#"UPDATE circular_trades SET status = 'in_progress', updated_at = NOW()
               WHERE id = $1
               RETURNING {TRADE_COLUMNS}"#
        ))
        .bind(trade_id)
        .fetch_one(&mut *tx)
        .await?
    } else {
        trade
    };

    tx.commit().await?;

    let mut members = current;
    members.push(joined);

    log::info!(
        "user {user_id} joined circular trade {trade_id} at position {}",
        admission.position
    );

    if admission.activates {
        log::info!("circular trade {trade_id} activated with {} participants", members.len());
        let payload = json!(trade);
        for p in &members {
            ws::notify(&state.hub, p.user_id, ws::TRADE_ACTIVATED, payload.clone());
        }
    }
    missions::track(&state.pool, flags, user_id, missions::ACTION_JOIN_TRADE).await;

    Ok(TradeDetail {
        trade,
        participants: members,
    })
}

pub async fn list_open_trades(pool: &PgPool) -> Result<Vec<CircularTrade>, sqlx::Error> {
    sqlx::query_as::<_, CircularTrade>(&format!(
        "SELECT {TRADE_COLUMNS} FROM circular_trades WHERE status = 'pending' ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await
}

pub async fn get_trade(pool: &PgPool, trade_id: i32) -> Result<TradeDetail, AppError> {
    let trade = sqlx::query_as::<_, CircularTrade>(&format!(
        "SELECT {TRADE_COLUMNS} FROM circular_trades WHERE id = $1"
    ))
    .bind(trade_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("trade"))?;

    let participants = participants(pool, trade_id).await?;
    Ok(TradeDetail {
        trade,
        participants,
    })
}

/// Creator closes an in-progress ring; every product in it becomes traded.
pub async fn complete_trade(
    state: &AppState,
    flags: &FeatureFlags,
    user_id: i32,
    trade_id: i32,
) -> Result<TradeDetail, AppError> {
    let mut tx = state.pool.begin().await?;
    let trade = sqlx::query_as::<_, CircularTrade>(&format!(
        "SELECT {TRADE_COLUMNS} FROM circular_trades WHERE id = $1 FOR UPDATE"
    ))
    .bind(trade_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("trade"))?;

    if trade.creator_id != user_id {
        return Err(TradeRejection::NotCreator.into());
    }
    if trade.status != TradeStatus::InProgress {
        return Err(TradeRejection::NotInProgress.into());
    }

    let trade = sqlx::query_as::<_, CircularTrade>(&format!(
        r#"UPDATE circular_trades SET status = 'completed', updated_at = NOW()
           WHERE id = $1
           RETURNING {TRADE_COLUMNS}"#
    ))
    .bind(trade_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"UPDATE products SET status = 'traded', updated_at = NOW()
           WHERE id IN (SELECT product_id FROM circular_trade_participants WHERE trade_id = $1)"#,
    )
    .bind(trade_id)
    .execute(&mut *tx)
    .await?;

    let members = participants(&mut *tx, trade_id).await?;
    tx.commit().await?;

    for p in &members {
        achievements::refresh(&state.pool, flags, p.user_id).await;
    }

    Ok(TradeDetail {
        trade,
        participants: members,
    })
}

/// Creator abandons a ring that has not started yet.
pub async fn cancel_trade(
    state: &AppState,
    user_id: i32,
    trade_id: i32,
) -> Result<CircularTrade, AppError> {
    let cancelled = sqlx::query_as::<_, CircularTrade>(&format!(
        r#"UPDATE circular_trades SET status = 'cancelled', updated_at = NOW()
           WHERE id = $1 AND creator_id = $2 AND status = 'pending'
           RETURNING {TRADE_COLUMNS}"#
    ))
    .bind(trade_id)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?;

    match cancelled {
        Some(trade) => Ok(trade),
        None => {
            let exists = get_trade(&state.pool, trade_id).await?;
            if exists.trade.creator_id != user_id {
                Err(TradeRejection::NotCreator.into())
            } else {
                Err(TradeRejection::NotOpen.into())
            }
        }
    }
}
