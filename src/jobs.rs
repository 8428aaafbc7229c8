// src/jobs.rs
//
// Periodic sweeps. They run on a background loop and can also be triggered
// over HTTP by an external cron (see `api::jobs`). Per-item failures are
// logged and skipped; the next run picks the item up again.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::Row;

use crate::mail::{templates, EmailMessage};
use crate::{auctions, ws, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryNotice {
    ThreeDays,
    OneDay,
}

impl ExpiryNotice {
    pub fn days_left(self) -> i64 {
        match self {
            ExpiryNotice::ThreeDays => 3,
            ExpiryNotice::OneDay => 1,
        }
    }

    fn flag_column(self) -> &'static str {
        match self {
            ExpiryNotice::ThreeDays => "notified_3d_at",
            ExpiryNotice::OneDay => "notified_1d_at",
        }
    }
}

/// Which notice, if any, a product is due. Inside the last 24 hours only the
/// 1-day notice is considered; a missed 3-day notice is not sent late.
pub fn product_notice(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    notified_1d: bool,
    notified_3d: bool,
) -> Option<ExpiryNotice> {
    if expires_at <= now {
        return None;
    }
    let remaining = expires_at - now;
    if remaining <= chrono::Duration::hours(24) {
        (!notified_1d).then_some(ExpiryNotice::OneDay)
    } else if remaining <= chrono::Duration::days(3) {
        (!notified_3d).then_some(ExpiryNotice::ThreeDays)
    } else {
        None
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepReport {
    pub expired: u64,
    pub notified: u64,
    pub failed: u64,
}

pub async fn product_expiry_sweep(state: &AppState) -> Result<SweepReport, sqlx::Error> {
    let mut report = SweepReport::default();

    let expired = sqlx::query(
        r#"UPDATE products SET status = 'expired', updated_at = NOW()
           WHERE status = 'active' AND expires_at <= NOW()"#,
    )
    .execute(&state.pool)
    .await?;
    report.expired = expired.rows_affected();

    let rows = sqlx::query(
        r#"SELECT p.id, p.title, p.expires_at, p.notified_1d_at, p.notified_3d_at, u.email
           FROM products p
           JOIN users u ON u.id = p.owner_id
           WHERE p.status = 'active'
             AND p.expires_at > NOW()
             AND p.expires_at <= NOW() + INTERVAL '3 days'"#,
    )
    .fetch_all(&state.pool)
    .await?;

    let now = Utc::now();
    for r in rows {
        let product_id: i32 = r.get("id");
        let notified_1d = r.get::<Option<DateTime<Utc>>, _>("notified_1d_at").is_some();
        let notified_3d = r.get::<Option<DateTime<Utc>>, _>("notified_3d_at").is_some();

        let Some(notice) = product_notice(r.get("expires_at"), now, notified_1d, notified_3d) else {
            continue;
        };

        let title: String = r.get("title");
        let email: String = r.get("email");
        let (subject, html, text) =
            templates::product_expiry(&title, notice.days_left(), &state.config.app_url);

        let message = EmailMessage::new(email, subject).html(html).text(text);
        if let Err(e) = state.mailer.send(message).await {
            log::error!("product expiry mail failed product_id={product_id}: {e}");
            report.failed += 1;
            continue;
        }

        sqlx::query(&format!(
            "UPDATE products SET {} = NOW() WHERE id = $1",
            notice.flag_column()
        ))
        .bind(product_id)
        .execute(&state.pool)
        .await?;
        report.notified += 1;
    }

    log::info!(
        "product expiry sweep: expired={} notified={} failed={}",
        report.expired,
        report.notified,
        report.failed
    );
    Ok(report)
}

pub async fn subscription_expiry_sweep(state: &AppState) -> Result<SweepReport, sqlx::Error> {
    let mut report = SweepReport::default();

    let lapsed = sqlx::query(
        r#"UPDATE user_subscriptions SET status = 'expired'
           WHERE status = 'active' AND expires_at <= NOW()
           RETURNING id, user_id, plan_id"#,
    )
    .fetch_all(&state.pool)
    .await?;
    report.expired = lapsed.len() as u64;

    for r in &lapsed {
        let user_id: i32 = r.get("user_id");
        ws::notify(
            &state.hub,
            user_id,
            ws::SUBSCRIPTION_STATUS,
            json!({ "id": r.get::<i32, _>("id"), "plan_id": r.get::<i32, _>("plan_id"), "status": "expired" }),
        );
    }

    let rows = sqlx::query(
        r#"SELECT s.id, s.expires_at, p.name, u.email
           FROM user_subscriptions s
           JOIN premium_plans p ON p.id = s.plan_id
           JOIN users u ON u.id = s.user_id
           WHERE s.status = 'active'
             AND s.expiry_notified_at IS NULL
             AND s.expires_at > NOW()
             AND s.expires_at <= NOW() + INTERVAL '3 days'"#,
    )
    .fetch_all(&state.pool)
    .await?;

    for r in rows {
        let subscription_id: i32 = r.get("id");
        let plan_name: String = r.get("name");
        let email: String = r.get("email");
        let (subject, html, text) =
            templates::subscription_expiry(&plan_name, r.get("expires_at"), &state.config.app_url);

        let message = EmailMessage::new(email, subject).html(html).text(text);
        if let Err(e) = state.mailer.send(message).await {
            log::error!("subscription expiry mail failed subscription_id={subscription_id}: {e}");
            report.failed += 1;
            continue;
        }

        sqlx::query("UPDATE user_subscriptions SET expiry_notified_at = NOW() WHERE id = $1")
            .bind(subscription_id)
            .execute(&state.pool)
            .await?;
        report.notified += 1;
    }

    log::info!(
        "subscription expiry sweep: expired={} notified={} failed={}",
        report.expired,
        report.notified,
        report.failed
    );
    Ok(report)
}

pub async fn close_auctions(state: &AppState) -> Result<SweepReport, sqlx::Error> {
    let closed = auctions::close_expired_auctions(state).await?;
    Ok(SweepReport {
        expired: closed.len() as u64,
        ..SweepReport::default()
    })
}

async fn run_all(state: &AppState) {
    if let Err(e) = product_expiry_sweep(state).await {
        log::error!("product expiry sweep failed: {e}");
    }
    if let Err(e) = subscription_expiry_sweep(state).await {
        log::error!("subscription expiry sweep failed: {e}");
    }
    if let Err(e) = close_auctions(state).await {
        log::error!("auction close sweep failed: {e}");
    }
}

pub fn start_scheduled_jobs(state: AppState) {
    let interval = Duration::from_secs(state.config.job_interval_secs.max(1));
    log::info!("scheduled jobs every {}s", interval.as_secs());

    tokio::spawn(async move {
        loop {
            run_all(&state).await;
            tokio::time::sleep(interval).await;
        }
    });
}
