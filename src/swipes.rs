// src/swipes.rs
//
// Swipes, match detection and chat. A match appears when two users like
// each other's products; the check and the insert run in the same
// transaction, serialized per user pair.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgConnection, Row};

use crate::error::AppError;
use crate::flags::FeatureFlags;
use crate::models::{Match, MatchStatus, Message, ProductStatus, Swipe, SwipeAction};
use crate::{achievements, db, missions, ws, AppState};

pub const MAX_MESSAGE_LEN: usize = 2000;

const SWIPE_COLUMNS: &str = "id, user_id, product_id, action, is_super_like, offered_product_id, created_at";
const MATCH_COLUMNS: &str =
    "id, user1_id, user2_id, product1_id, product2_id, status, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, match_id, sender_id, content, read_at, created_at";

#[derive(Debug, Deserialize)]
pub struct SwipeRequest {
    pub product_id: i32,
    pub action: SwipeAction,
    pub offered_product_id: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct SwipeOutcome {
    pub swipe: Swipe,
    pub new_match: Option<Match>,
}

/// Validates and stores a swipe inside the caller's transaction, creating a
/// match when the product owner already liked one of the swiper's products.
pub(crate) async fn apply_swipe(
    conn: &mut PgConnection,
    user_id: i32,
    product_id: i32,
    action: SwipeAction,
    is_super_like: bool,
    offered_product_id: Option<i32>,
) -> Result<SwipeOutcome, AppError> {
    let product = db::get_product(&mut *conn, product_id)
        .await?
        .ok_or(AppError::NotFound("product"))?;

    if product.owner_id == user_id {
        return Err(AppError::bad_request("No puedes deslizar tu propio producto"));
    }
    if product.status != ProductStatus::Active {
        return Err(AppError::bad_request("El producto no está disponible"));
    }

    if let Some(offered_id) = offered_product_id {
        let offered = db::get_product(&mut *conn, offered_id).await?;
        let valid = offered
            .is_some_and(|p| p.owner_id == user_id && p.status == ProductStatus::Active);
        if !valid {
            return Err(AppError::bad_request("El producto ofrecido no es válido"));
        }
    }

    let owner_id = product.owner_id;
    sqlx::query("SELECT pg_advisory_xact_lock(LEAST($1, $2), GREATEST($1, $2))")
        .bind(user_id)
        .bind(owner_id)
        .execute(&mut *conn)
        .await?;

    let swipe = sqlx::query_as::<_, Swipe>(&format!(
        r#"INSERT INTO swipes (user_id, product_id, action, is_super_like, offered_product_id)
           VALUES ($1, $2, $3, $4, $5)
           ON CONFLICT (user_id, product_id) DO UPDATE SET
               action = EXCLUDED.action,
               is_super_like = EXCLUDED.is_super_like,
               offered_product_id = EXCLUDED.offered_product_id,
               created_at = NOW()
           RETURNING {SWIPE_COLUMNS}"#
    ))
    .bind(user_id)
    .bind(product_id)
    .bind(action)
    .bind(is_super_like)
    .bind(offered_product_id)
    .fetch_one(&mut *conn)
    .await?;

    if action == SwipeAction::Dislike {
        return Ok(SwipeOutcome {
            swipe,
            new_match: None,
        });
    }

    // The owner's like on one of our products, preferring the one we offered.
    let reciprocal = sqlx::query(
        r#"SELECT s.product_id
           FROM swipes s
           JOIN products p ON p.id = s.product_id
           WHERE s.user_id = $1
             AND p.owner_id = $2
             AND s.action = 'like'
             AND p.status = 'active'
           ORDER BY CASE WHEN s.product_id = $3 THEN 0 ELSE 1 END, s.created_at DESC
           LIMIT 1"#,
    )
    .bind(owner_id)
    .bind(user_id)
    .bind(offered_product_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(reciprocal) = reciprocal else {
        return Ok(SwipeOutcome {
            swipe,
            new_match: None,
        });
    };
    let liked_product_id: i32 = reciprocal.get("product_id");

    let open_match = sqlx::query(
        r#"SELECT id FROM matches
           WHERE ((user1_id = $1 AND user2_id = $2) OR (user1_id = $2 AND user2_id = $1))
             AND status IN ('pending', 'accepted')
           LIMIT 1"#,
    )
    .bind(user_id)
    .bind(owner_id)
    .fetch_optional(&mut *conn)
    .await?;

    if open_match.is_some() {
        return Ok(SwipeOutcome {
            swipe,
            new_match: None,
        });
    }

    let new_match = sqlx::query_as::<_, Match>(&format!(
        r#"INSERT INTO matches (user1_id, user2_id, product1_id, product2_id)
           VALUES ($1, $2, $3, $4)
           RETURNING {MATCH_COLUMNS}"#
    ))
    .bind(user_id)
    .bind(owner_id)
    .bind(liked_product_id)
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    log::info!(
        "match created id={} user1={} user2={}",
        new_match.id,
        new_match.user1_id,
        new_match.user2_id
    );

    Ok(SwipeOutcome {
        swipe,
        new_match: Some(new_match),
    })
}

/// Notifications and gamification hooks once a swipe has committed.
pub(crate) async fn after_swipe(
    state: &AppState,
    flags: &FeatureFlags,
    user_id: i32,
    outcome: &SwipeOutcome,
) {
    missions::track(&state.pool, flags, user_id, missions::ACTION_SWIPE).await;

    if let Some(m) = &outcome.new_match {
        for uid in [m.user1_id, m.user2_id] {
            ws::notify(&state.hub, uid, ws::MATCH_NEW, json!(m));
            missions::track(&state.pool, flags, uid, missions::ACTION_MATCH).await;
            achievements::refresh(&state.pool, flags, uid).await;
        }
    } else {
        achievements::refresh(&state.pool, flags, user_id).await;
    }
}

pub async fn record_swipe(
    state: &AppState,
    flags: &FeatureFlags,
    user_id: i32,
    req: &SwipeRequest,
) -> Result<SwipeOutcome, AppError> {
    let mut tx = state.pool.begin().await?;
    let outcome = apply_swipe(
        &mut tx,
        user_id,
        req.product_id,
        req.action,
        false,
        req.offered_product_id,
    )
    .await?;
    tx.commit().await?;

    after_swipe(state, flags, user_id, &outcome).await;
    Ok(outcome)
}

/// Deletes the user's most recent swipe and returns the product it pointed
/// at. A swipe whose product already belongs to one of the user's matches
/// cannot be undone.
pub(crate) async fn remove_latest(
    conn: &mut PgConnection,
    user_id: i32,
) -> Result<Option<i32>, AppError> {
    let latest = sqlx::query(
        r#"SELECT id, product_id FROM swipes
           WHERE user_id = $1
           ORDER BY created_at DESC, id DESC
           LIMIT 1
           FOR UPDATE"#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(latest) = latest else {
        return Ok(None);
    };
    let swipe_id: i32 = latest.get("id");
    let product_id: i32 = latest.get("product_id");

    let matched: bool = sqlx::query_scalar(
        r#"SELECT EXISTS (
               SELECT 1 FROM matches
               WHERE (user1_id = $1 OR user2_id = $1)
                 AND (product1_id = $2 OR product2_id = $2)
           )"#,
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;
    if matched {
        return Err(AppError::bad_request(
            "No puedes deshacer un swipe que ya generó un match",
        ));
    }

    sqlx::query("DELETE FROM swipes WHERE id = $1")
        .bind(swipe_id)
        .execute(&mut *conn)
        .await?;

    Ok(Some(product_id))
}

async fn get_match_for_update(
    conn: &mut PgConnection,
    match_id: i32,
) -> Result<Option<Match>, sqlx::Error> {
    sqlx::query_as::<_, Match>(&format!(
        "SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1 FOR UPDATE"
    ))
    .bind(match_id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn update_match_status(
    state: &AppState,
    user_id: i32,
    match_id: i32,
    next: MatchStatus,
) -> Result<Match, AppError> {
    let mut tx = state.pool.begin().await?;

    let current = get_match_for_update(&mut tx, match_id)
        .await?
        .filter(|m| m.involves(user_id))
        .ok_or(AppError::NotFound("match"))?;

    if !current.status.can_transition_to(next) {
        return Err(AppError::bad_request("Transición de estado no permitida"));
    }

    let updated = sqlx::query_as::<_, Match>(&format!(
        "UPDATE matches SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {MATCH_COLUMNS}"
    ))
    .bind(match_id)
    .bind(next)
    .fetch_one(&mut *tx)
    .await?;

    if next == MatchStatus::Completed {
        sqlx::query("UPDATE products SET status = 'traded', updated_at = NOW() WHERE id IN ($1, $2)")
            .bind(updated.product1_id)
            .bind(updated.product2_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    ws::notify(
        &state.hub,
        updated.other_party(user_id),
        ws::MATCH_STATUS,
        json!(updated),
    );
    Ok(updated)
}

pub async fn send_message(
    state: &AppState,
    flags: &FeatureFlags,
    user_id: i32,
    match_id: i32,
    content: &str,
) -> Result<Message, AppError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::bad_request("El mensaje está vacío"));
    }
    if content.chars().count() > MAX_MESSAGE_LEN {
        return Err(AppError::bad_request("El mensaje es demasiado largo"));
    }

    let m = get_match(state, user_id, match_id).await?;
    if !m.status.is_open() {
        return Err(AppError::bad_request("El match ya no está activo"));
    }

    let message = sqlx::query_as::<_, Message>(&format!(
        r#"INSERT INTO messages (match_id, sender_id, content)
           VALUES ($1, $2, $3)
           RETURNING {MESSAGE_COLUMNS}"#
    ))
    .bind(match_id)
    .bind(user_id)
    .bind(content)
    .fetch_one(&state.pool)
    .await?;

    ws::notify(&state.hub, m.other_party(user_id), ws::MESSAGE_NEW, json!(message));
    missions::track(&state.pool, flags, user_id, missions::ACTION_SEND_MESSAGE).await;

    Ok(message)
}

/// Match visible to `user_id`; strangers get `NotFound`.
pub async fn get_match(state: &AppState, user_id: i32, match_id: i32) -> Result<Match, AppError> {
    sqlx::query_as::<_, Match>(&format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1"))
        .bind(match_id)
        .fetch_optional(&state.pool)
        .await?
        .filter(|m| m.involves(user_id))
        .ok_or(AppError::NotFound("match"))
}

pub async fn list_matches(state: &AppState, user_id: i32) -> Result<Vec<Match>, AppError> {
    let matches = sqlx::query_as::<_, Match>(&format!(
        r#"SELECT {MATCH_COLUMNS} FROM matches
           WHERE user1_id = $1 OR user2_id = $1
           ORDER BY updated_at DESC"#
    ))
    .bind(user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(matches)
}

/// Returns the conversation and marks the other party's messages as read.
pub async fn list_messages(
    state: &AppState,
    user_id: i32,
    match_id: i32,
) -> Result<Vec<Message>, AppError> {
    get_match(state, user_id, match_id).await?;

    sqlx::query(
        r#"UPDATE messages SET read_at = NOW()
           WHERE match_id = $1 AND sender_id <> $2 AND read_at IS NULL"#,
    )
    .bind(match_id)
    .bind(user_id)
    .execute(&state.pool)
    .await?;

    let messages = sqlx::query_as::<_, Message>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE match_id = $1 ORDER BY created_at, id"
    ))
    .bind(match_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(messages)
}
