// src/api/jobs.rs
//
// Cron entry points. Not behind JWT; they require `X-Cron-Secret` instead,
// and are disabled entirely when `CRON_SECRET` is unset.

use actix_web::{post, web, HttpRequest, HttpResponse};

use crate::error::AppError;
use crate::{jobs, AppState};

pub const CRON_SECRET_HEADER: &str = "X-Cron-Secret";

fn check_cron_secret(req: &HttpRequest, state: &AppState) -> Result<(), AppError> {
    let Some(expected) = state.config.cron_secret.as_deref() else {
        return Err(AppError::Forbidden);
    };

    let provided = req
        .headers()
        .get(CRON_SECRET_HEADER)
        .and_then(|h| h.to_str().ok());

    if provided == Some(expected) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

#[post("/jobs/product-expiry")]
pub async fn product_expiry(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    check_cron_secret(&req, &state)?;
    let report = jobs::product_expiry_sweep(&state).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[post("/jobs/subscription-expiry")]
pub async fn subscription_expiry(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    check_cron_secret(&req, &state)?;
    let report = jobs::subscription_expiry_sweep(&state).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[post("/jobs/close-auctions")]
pub async fn close_auctions(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    check_cron_secret(&req, &state)?;
    let report = jobs::close_auctions(&state).await?;
    Ok(HttpResponse::Ok().json(report))
}
