// src/api/missions.rs
//
// Gamification: missions, achievements and the TruKoin wallet.

use actix_web::web::ReqData;
use actix_web::{get, post, web, HttpResponse};
use serde_json::json;

use crate::error::AppError;
use crate::{achievements, missions, wallet, AppState};

const WALLET_HISTORY: i64 = 50;

#[get("/missions")]
pub async fn list_missions(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let views = missions::list_for_user(&state.pool, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(views))
}

#[post("/missions/{user_mission_id}/claim")]
pub async fn claim(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let flags = super::load_flags(&state).await?;
    let receipt =
        missions::claim_mission_reward(&state.pool, &flags, user_id.into_inner(), path.into_inner())
            .await?;
    Ok(HttpResponse::Ok().json(receipt))
}

#[get("/achievements")]
pub async fn list_achievements(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let views = achievements::list_for_user(&state.pool, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(views))
}

#[get("/wallet")]
pub async fn wallet_summary(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let user_id = user_id.into_inner();
    let balance = wallet::balance(&state.pool, user_id).await?;
    let transactions = wallet::recent_transactions(&state.pool, user_id, WALLET_HISTORY).await?;

    Ok(HttpResponse::Ok().json(json!({
        "balance": balance,
        "transactions": transactions,
    })))
}
