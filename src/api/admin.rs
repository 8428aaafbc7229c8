// src/api/admin.rs
//
// Admin panel. Every handler checks `users.is_admin` before doing anything.

use actix_web::web::ReqData;
use actix_web::{get, post, put, web, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::Row;

use crate::achievements::{self, NewAchievement};
use crate::api::auth::require_admin;
use crate::config::{MailProvider, MailSettings, SmtpSettings};
use crate::discounts::{self, NewDiscountCode};
use crate::error::AppError;
use crate::mail::{self, templates, EmailMessage};
use crate::missions::{self, NewMission};
use crate::premium::{self, PlanInput};
use crate::{db, flags, products, ws, AppState};

#[derive(Debug, Deserialize)]
pub struct FlagBody {
    pub is_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct FeaturedBody {
    pub featured: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct TestEmailCredentials {
    pub api_key: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestEmailBody {
    pub to: String,
    pub provider: String,
    pub sender_email: String,
    pub sender_name: Option<String>,
    #[serde(default)]
    pub credentials: TestEmailCredentials,
}

impl TestEmailBody {
    /// Settings for a one-off client; nothing comes from the environment.
    pub fn mail_settings(&self) -> Result<MailSettings, AppError> {
        let provider: MailProvider = self.provider.parse().map_err(AppError::bad_request)?;
        let creds = &self.credentials;

        let smtp = if provider == MailProvider::Smtp {
            match (&creds.host, &creds.username, &creds.password) {
                (Some(host), Some(username), Some(password)) => Some(SmtpSettings {
                    host: host.clone(),
                    port: creds.port.unwrap_or(587),
                    username: username.clone(),
                    password: password.clone(),
                }),
                _ => {
                    return Err(AppError::bad_request(
                        "SMTP requires host, username and password",
                    ))
                }
            }
        } else {
            None
        };

        if matches!(provider, MailProvider::Resend | MailProvider::Sendgrid)
            && creds.api_key.as_deref().map_or(true, str::is_empty)
        {
            return Err(AppError::bad_request("api_key is required for this provider"));
        }

        Ok(MailSettings {
            provider,
            from_email: self.sender_email.clone(),
            from_name: self
                .sender_name
                .clone()
                .unwrap_or_else(|| "Trueke".to_string()),
            api_key: creds.api_key.clone(),
            api_base_url: None,
            smtp,
        })
    }
}

#[get("/admin/flags")]
pub async fn list_flags(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(flags::list(&state.pool).await?))
}

#[put("/admin/flags/{key}")]
pub async fn update_flag(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<String>,
    payload: web::Json<FlagBody>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;
    let key = path.into_inner();

    let flag = flags::set_enabled(&state.pool, &key, payload.is_enabled)
        .await?
        .ok_or(AppError::NotFound("feature flag"))?;
    log::info!("feature flag {key} set to {}", payload.is_enabled);
    Ok(HttpResponse::Ok().json(flag))
}

#[get("/admin/settings/{key}")]
pub async fn get_setting(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;
    let key = path.into_inner();
    let value = db::get_setting(&state.pool, &key)
        .await?
        .ok_or(AppError::NotFound("setting"))?;
    Ok(HttpResponse::Ok().json(json!({ "key": key, "value": value })))
}

#[put("/admin/settings/{key}")]
pub async fn put_setting(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<String>,
    payload: web::Json<Value>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;
    let key = path.into_inner();

    if key == "product_expiry_days"
        && !payload
            .as_i64()
            .is_some_and(|d| (1..=db::MAX_DURATION_DAYS).contains(&d))
    {
        return Err(AppError::bad_request(format!(
            "product_expiry_days must be an integer between 1 and {}",
            db::MAX_DURATION_DAYS
        )));
    }

    db::put_setting(&state.pool, &key, &payload).await?;
    Ok(HttpResponse::Ok().json(json!({ "key": key, "value": payload.into_inner() })))
}

#[post("/admin/plans")]
pub async fn create_plan(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<PlanInput>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;
    let plan = premium::create_plan(&state.pool, &payload).await?;
    Ok(HttpResponse::Created().json(plan))
}

#[put("/admin/plans/{id}")]
pub async fn update_plan(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
    payload: web::Json<PlanInput>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;
    let plan = premium::update_plan(&state.pool, path.into_inner(), &payload).await?;
    Ok(HttpResponse::Ok().json(plan))
}

#[get("/admin/discounts")]
pub async fn list_discounts(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(discounts::list(&state.pool).await?))
}

#[post("/admin/discounts")]
pub async fn create_discount(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<NewDiscountCode>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;
    let code = discounts::create(&state.pool, &payload).await?;
    Ok(HttpResponse::Created().json(code))
}

#[post("/admin/discounts/{id}/deactivate")]
pub async fn deactivate_discount(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;
    discounts::deactivate(&state.pool, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/admin/missions")]
pub async fn list_missions(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(missions::list_all(&state.pool).await?))
}

#[post("/admin/missions")]
pub async fn create_mission(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<NewMission>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;
    let mission = missions::create(&state.pool, &payload).await?;
    Ok(HttpResponse::Created().json(mission))
}

#[put("/admin/missions/{id}/active")]
pub async fn toggle_mission(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
    payload: web::Json<ActiveBody>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;
    missions::set_active(&state.pool, path.into_inner(), payload.is_active).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/admin/achievements")]
pub async fn list_achievements(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(achievements::list_all(&state.pool).await?))
}

#[post("/admin/achievements")]
pub async fn create_achievement(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<NewAchievement>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;
    let achievement = achievements::create(&state.pool, &payload).await?;
    Ok(HttpResponse::Created().json(achievement))
}

#[put("/admin/products/{id}/featured")]
pub async fn feature_product(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
    payload: web::Json<FeaturedBody>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;
    let product = products::set_featured(&state, path.into_inner(), payload.featured).await?;
    Ok(HttpResponse::Ok().json(product))
}

#[get("/admin/stats")]
pub async fn stats(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;

    let r = sqlx::query(
        r#"SELECT
               (SELECT COUNT(*) FROM users) AS users,
               (SELECT COUNT(*) FROM products WHERE status = 'active') AS active_products,
               (SELECT COUNT(*) FROM matches) AS matches,
               (SELECT COUNT(*) FROM user_subscriptions
                 WHERE status = 'active' AND expires_at > NOW()) AS active_subscriptions,
               (SELECT COUNT(*) FROM auctions WHERE status = 'active') AS open_auctions,
               (SELECT COALESCE(SUM(amount), 0)::BIGINT FROM trukoin_transactions
                 WHERE amount > 0) AS trukoins_issued"#,
    )
    .fetch_one(&state.pool)
    .await?;

    let connected_users = state.hub.send(ws::ConnectedUsers).await.unwrap_or_else(|e| {
        log::warn!("notification hub unavailable: {e}");
        0
    });

    Ok(HttpResponse::Ok().json(json!({
        "users": r.get::<i64, _>("users"),
        "active_products": r.get::<i64, _>("active_products"),
        "matches": r.get::<i64, _>("matches"),
        "active_subscriptions": r.get::<i64, _>("active_subscriptions"),
        "open_auctions": r.get::<i64, _>("open_auctions"),
        "trukoins_issued": r.get::<i64, _>("trukoins_issued"),
        "connected_users": connected_users,
    })))
}

#[post("/admin/send-test-email")]
pub async fn send_test_email(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<TestEmailBody>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, user_id.into_inner()).await?;

    let settings = payload.mail_settings()?;
    let client = mail::create_mail_client(&settings)?;
    let (subject, html, text) = templates::test_email(client.provider());

    let message = EmailMessage::new(payload.to.trim(), subject).html(html).text(text);
    match client.send(message).await {
        Ok(()) => {
            log::info!("test email sent via {} to {}", client.provider(), payload.to);
            Ok(HttpResponse::Ok().json(json!({ "success": true, "provider": client.provider() })))
        }
        Err(e) => {
            log::warn!("test email via {} failed: {e}", client.provider());
            Ok(HttpResponse::BadGateway().json(json!({ "success": false, "error": e.to_string() })))
        }
    }
}
