// src/api/swipes.rs

use actix_web::web::ReqData;
use actix_web::{get, post, put, web, HttpResponse};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::MatchStatus;
use crate::swipes::{self, SwipeRequest};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: MatchStatus,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub content: String,
}

#[post("/swipes")]
pub async fn swipe(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<SwipeRequest>,
) -> Result<HttpResponse, AppError> {
    let flags = super::load_flags(&state).await?;
    let outcome = swipes::record_swipe(&state, &flags, user_id.into_inner(), &payload).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[get("/matches")]
pub async fn list_matches(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, AppError> {
    let matches = swipes::list_matches(&state, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(matches))
}

#[get("/matches/{id}")]
pub async fn get_match(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let m = swipes::get_match(&state, user_id.into_inner(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(m))
}

#[put("/matches/{id}/status")]
pub async fn update_status(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
    payload: web::Json<StatusBody>,
) -> Result<HttpResponse, AppError> {
    let m = swipes::update_match_status(
        &state,
        user_id.into_inner(),
        path.into_inner(),
        payload.status,
    )
    .await?;
    Ok(HttpResponse::Ok().json(m))
}

#[get("/matches/{id}/messages")]
pub async fn list_messages(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let messages = swipes::list_messages(&state, user_id.into_inner(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(messages))
}

#[post("/matches/{id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    path: web::Path<i32>,
    payload: web::Json<MessageBody>,
) -> Result<HttpResponse, AppError> {
    let flags = super::load_flags(&state).await?;
    let message = swipes::send_message(
        &state,
        &flags,
        user_id.into_inner(),
        path.into_inner(),
        &payload.content,
    )
    .await?;
    Ok(HttpResponse::Created().json(message))
}
