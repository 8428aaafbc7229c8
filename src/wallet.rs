// src/wallet.rs
//
// TruKoin ledger. Every balance change has a matching transaction row.

use sqlx::{PgConnection, PgPool, Row};

use crate::models::WalletTransaction;

pub const REASON_MISSION_REWARD: &str = "mission_reward";
pub const REASON_ACHIEVEMENT_REWARD: &str = "achievement_reward";

/// Credits `amount` inside the caller's transaction. Returns the new balance.
pub async fn credit(
    conn: &mut PgConnection,
    user_id: i32,
    amount: i64,
    reason: &str,
    reference_id: Option<i32>,
) -> Result<i64, sqlx::Error> {
    let balance: i64 = sqlx::query(
        r#"INSERT INTO trukoin_wallets (user_id, balance)
           VALUES ($1, $2)
           ON CONFLICT (user_id)
           DO UPDATE SET balance = trukoin_wallets.balance + EXCLUDED.balance, updated_at = NOW()
           RETURNING balance"#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_one(&mut *conn)
    .await?
    .get("balance");

    sqlx::query(
        r#"INSERT INTO trukoin_transactions (user_id, amount, reason, reference_id)
           VALUES ($1, $2, $3, $4)"#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(reason)
    .bind(reference_id)
    .execute(&mut *conn)
    .await?;

    log::info!("trukoin credit user_id={user_id} amount={amount} reason={reason} balance={balance}");
    Ok(balance)
}

pub async fn balance(pool: &PgPool, user_id: i32) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT balance FROM trukoin_wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.get("balance")).unwrap_or(0))
}

pub async fn recent_transactions(
    pool: &PgPool,
    user_id: i32,
    limit: i64,
) -> Result<Vec<WalletTransaction>, sqlx::Error> {
    sqlx::query_as::<_, WalletTransaction>(
        r#"SELECT id, user_id, amount, reason, reference_id, created_at
           FROM trukoin_transactions
           WHERE user_id = $1
           ORDER BY created_at DESC, id DESC
           LIMIT $2"#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}
