// src/api/auctions.rs

use actix_web::web::ReqData;
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;

use crate::auctions::{self, NewAuction};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BidBody {
    pub amount: i64,
}

#[get("/auctions")]
pub async fn list(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let items = auctions::list_active_auctions(&state.pool).await?;
    Ok(HttpResponse::Ok().json(items))
}

#[post("/auctions")]
pub async fn create(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<NewAuction>,
) -> Result<HttpResponse, AppError> {
    let flags = super::load_flags(&state).await?;
    let auction = auctions::create_auction(&state, &flags, user_id.into_inner(), &payload).await?;
    Ok(HttpResponse::Created().json(auction))
}

#[get("/auctions/{id}")]
pub async fn get_one(
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let detail = auctions::get_auction(&state.pool, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[post("/auctions/{id}/bids")]
pub async fn bid(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
    payload: web::Json<BidBody>,
) -> Result<HttpResponse, AppError> {
    let flags = super::load_flags(&state).await?;
    let receipt = auctions::place_bid(
        &state,
        &flags,
        user_id.into_inner(),
        path.into_inner(),
        payload.amount,
    )
    .await?;
    Ok(HttpResponse::Created().json(receipt))
}

#[post("/auctions/{id}/cancel")]
pub async fn cancel(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let auction = auctions::cancel_auction(&state, user_id.into_inner(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(auction))
}
