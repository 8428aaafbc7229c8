// src/api/trades.rs

use actix_web::web::ReqData;
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;

use crate::error::AppError;
use crate::trades::{self, NewTrade};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct JoinBody {
    pub product_id: i32,
}

#[get("/trades")]
pub async fn list(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let items = trades::list_open_trades(&state.pool).await?;
    Ok(HttpResponse::Ok().json(items))
}

#[post("/trades")]
pub async fn create(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<NewTrade>,
) -> Result<HttpResponse, AppError> {
    let flags = super::load_flags(&state).await?;
    let detail =
        trades::create_circular_trade(&state, &flags, user_id.into_inner(), &payload).await?;
    Ok(HttpResponse::Created().json(detail))
}

#[get("/trades/{id}")]
pub async fn get_one(
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let detail = trades::get_trade(&state.pool, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[post("/trades/{id}/join")]
pub async fn join(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
    payload: web::Json<JoinBody>,
) -> Result<HttpResponse, AppError> {
    let flags = super::load_flags(&state).await?;
    let detail = trades::join_circular_trade(
        &state,
        &flags,
        user_id.into_inner(),
        path.into_inner(),
        payload.product_id,
    )
    .await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[post("/trades/{id}/complete")]
pub async fn complete(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let flags = super::load_flags(&state).await?;
    let detail =
        trades::complete_trade(&state, &flags, user_id.into_inner(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[post("/trades/{id}/cancel")]
pub async fn cancel(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let trade = trades::cancel_trade(&state, user_id.into_inner(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(trade))
}
