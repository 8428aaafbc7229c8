// src/api/premium.rs

use actix_web::web::ReqData;
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;

use crate::error::AppError;
use crate::premium::{self, SubscribeRequest};
use crate::{db, AppState};

#[derive(Debug, Deserialize)]
pub struct SuperLikeBody {
    pub product_id: i32,
    pub offered_product_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct BoostBody {
    pub product_id: i32,
}

#[post("/premium/super-like")]
pub async fn super_like(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<SuperLikeBody>,
) -> Result<HttpResponse, AppError> {
    let flags = super::load_flags(&state).await?;
    let receipt = premium::send_super_like(
        &state,
        &flags,
        user_id.into_inner(),
        payload.product_id,
        payload.offered_product_id,
    )
    .await?;
    Ok(HttpResponse::Ok().json(receipt))
}

#[post("/premium/boost")]
pub async fn boost(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<BoostBody>,
) -> Result<HttpResponse, AppError> {
    let flags = super::load_flags(&state).await?;
    let receipt =
        premium::activate_boost(&state, &flags, user_id.into_inner(), payload.product_id).await?;
    Ok(HttpResponse::Ok().json(receipt))
}

#[post("/premium/rewind")]
pub async fn rewind(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let flags = super::load_flags(&state).await?;
    let receipt = premium::use_rewind(&state, &flags, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(receipt))
}

#[get("/premium/usage")]
pub async fn usage(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let flags = super::load_flags(&state).await?;
    let summary = premium::usage_summary(&state.pool, &flags, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[get("/plans")]
pub async fn list_plans(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let plans = db::list_active_plans(&state.pool).await?;
    Ok(HttpResponse::Ok().json(plans))
}

#[get("/subscriptions/current")]
pub async fn current_subscription(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let current = premium::current_subscription(&state.pool, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(current))
}

#[get("/subscriptions")]
pub async fn list_subscriptions(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let subs = premium::list_subscriptions(&state.pool, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(subs))
}

#[post("/subscriptions")]
pub async fn subscribe(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<SubscribeRequest>,
) -> Result<HttpResponse, AppError> {
    let flags = super::load_flags(&state).await?;
    let receipt = premium::subscribe(&state, &flags, user_id.into_inner(), &payload).await?;
    Ok(HttpResponse::Created().json(receipt))
}

#[post("/subscriptions/{id}/cancel")]
pub async fn cancel_subscription(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let sub = premium::cancel_subscription(&state, user_id.into_inner(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(sub))
}
