#![allow(dead_code)]

use std::env;
use std::sync::{Arc, OnceLock};

use actix::Actor;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::Client as S3Client;
use sqlx::{PgPool, Row};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use trueke::api::auth::generate_jwt;
use trueke::config::{Config, MailProvider, MailSettings};
use trueke::flags::{self, FeatureFlags};
use trueke::mail::LogMailClient;
use trueke::ws::NotificationHub;
use trueke::AppState;

pub const JWT_SECRET: &str = "test-secret";
pub const CRON_SECRET: &str = "test-cron";

fn split_db_url(url: &str) -> Result<(String, String), String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query)),
        None => (url.to_string(), None),
    };

    let db_start = base
        .rfind('/')
        .ok_or_else(|| "invalid database url".to_string())?;
    if db_start + 1 >= base.len() {
        return Err("database name is empty".to_string());
    }

    let db_name = base[db_start + 1..].to_string();
    let mut admin_url = format!("{}postgres", &base[..db_start + 1]);
    if let Some(query) = query {
        admin_url = format!("{admin_url}?{query}");
    }

    Ok((admin_url, db_name))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestDb {
    pub pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

/// Fresh migrated database, or `None` when `TEST_DATABASE_URL` is not set
/// so database tests skip instead of failing.
pub async fn init_test_db() -> Option<TestDb> {
    dotenvy::dotenv().ok();
    let Ok(test_url) = env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping database test");
        return None;
    };
    let (admin_url, db_name) =
        split_db_url(&test_url).expect("invalid TEST_DATABASE_URL format");

    let lock = TEST_DB_LOCK.get_or_init(|| Mutex::new(()));
    let guard = lock.lock().await;

    let admin_pool = PgPool::connect(&admin_url)
        .await
        .expect("connect admin db");

    let _ = sqlx::query("SELECT pg_advisory_lock(424242)")
        .execute(&admin_pool)
        .await;

    let quoted_name = quote_identifier(&db_name);
    let drop_sql = format!("DROP DATABASE IF EXISTS {quoted_name} WITH (FORCE)");
    let create_sql = format!("CREATE DATABASE {quoted_name}");

    let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
    if let Err(e) = sqlx::query(&create_sql).execute(&admin_pool).await {
        eprintln!("create test db error: {e}");
        let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
        sqlx::query(&create_sql)
            .execute(&admin_pool)
            .await
            .expect("create test db retry");
    }

    let _ = sqlx::query("SELECT pg_advisory_unlock(424242)")
        .execute(&admin_pool)
        .await;
    admin_pool.close().await;

    let pool = PgPool::connect(&test_url)
        .await
        .expect("connect test db");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    Some(TestDb {
        pool,
        _guard: guard,
    })
}

pub fn test_config() -> Config {
    Config {
        database_url: String::new(),
        host: "127.0.0.1".to_string(),
        port: 0,
        jwt_secret: JWT_SECRET.to_string(),
        s3_bucket: "test-bucket".to_string(),
        s3_endpoint: None,
        s3_public_base_url: "http://localhost:9000".to_string(),
        mock_s3: true,
        mail: MailSettings {
            provider: MailProvider::Log,
            from_email: "no-reply@test.local".to_string(),
            from_name: "Trueke".to_string(),
            api_key: None,
            api_base_url: None,
            smtp: None,
        },
        cron_secret: Some(CRON_SECRET.to_string()),
        job_interval_secs: 3600,
        app_url: "http://localhost:5173".to_string(),
    }
}

/// Must run inside an actix system (`#[actix_web::test]`) since it starts
/// the notification hub.
pub async fn build_state(pool: PgPool) -> AppState {
    let config = test_config();
    let region_provider = RegionProviderChain::default_provider().or_else("us-east-1");
    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await;
    let s3_client = S3Client::from_conf(aws_sdk_s3::config::Builder::from(&aws_config).build());

    AppState {
        pool,
        mailer: Arc::new(LogMailClient::new(&config.mail)),
        config: Arc::new(config),
        s3_client,
        hub: NotificationHub::new().start(),
    }
}

pub async fn load_flags(pool: &PgPool) -> FeatureFlags {
    flags::load(pool).await.expect("load flags")
}

pub fn token(user_id: i32) -> String {
    generate_jwt(JWT_SECRET, user_id).expect("jwt")
}

pub async fn insert_user(pool: &PgPool, is_admin: bool) -> i32 {
    let suffix = Uuid::new_v4();
    sqlx::query(
        r#"INSERT INTO users (email, username, password_hash, is_admin)
           VALUES ($1, $2, 'test-hash', $3)
           RETURNING id"#,
    )
    .bind(format!("user_{suffix}@trueke.test"))
    .bind(format!("user_{suffix}"))
    .bind(is_admin)
    .fetch_one(pool)
    .await
    .expect("insert user")
    .get("id")
}

pub async fn insert_product(pool: &PgPool, owner_id: i32) -> i32 {
    insert_product_expiring(pool, owner_id, "30 days").await
}

/// `interval` is a Postgres interval literal relative to now, e.g. `-1 hour`.
pub async fn insert_product_expiring(pool: &PgPool, owner_id: i32, interval: &str) -> i32 {
    sqlx::query(
        r#"INSERT INTO products (owner_id, title, category, estimated_value, expires_at)
           VALUES ($1, 'Bicicleta', 'deportes', 100, NOW() + $2::INTERVAL)
           RETURNING id"#,
    )
    .bind(owner_id)
    .bind(interval)
    .fetch_one(pool)
    .await
    .expect("insert product")
    .get("id")
}

pub async fn insert_plan(pool: &PgPool, price_cents: i64, super_likes_per_day: i32) -> i32 {
    sqlx::query(
        r#"INSERT INTO premium_plans
               (name, price_cents, duration_days, super_likes_per_day, boosts_per_month, rewinds_per_day)
           VALUES ('Plus', $1, 30, $2, 5, 5)
           RETURNING id"#,
    )
    .bind(price_cents)
    .bind(super_likes_per_day)
    .fetch_one(pool)
    .await
    .expect("insert plan")
    .get("id")
}
