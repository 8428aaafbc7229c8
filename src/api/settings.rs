// src/api/settings.rs

use actix_web::{get, web, HttpResponse};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::{db, flags, AppState};

/// Enabled state of every feature, so clients can hide what is off.
#[get("/features")]
pub async fn feature_flags(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let all = flags::list(&state.pool).await?;
    let map: serde_json::Map<String, Value> = all
        .into_iter()
        .map(|f| (f.feature_key, Value::Bool(f.is_enabled)))
        .collect();
    Ok(HttpResponse::Ok().json(map))
}

#[get("/terms")]
pub async fn terms(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let terms = db::get_setting(&state.pool, "terms")
        .await?
        .unwrap_or_else(|| Value::String(String::new()));
    Ok(HttpResponse::Ok().json(json!({ "terms": terms })))
}
