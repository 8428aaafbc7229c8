// src/api/discounts.rs

use actix_web::web::ReqData;
use actix_web::{post, web, HttpResponse};
use serde::Deserialize;

use crate::discounts;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateBody {
    pub code: String,
    pub plan_id: i32,
}

/// Checkout preview: returns the quote without consuming the code.
#[post("/discounts/validate")]
pub async fn validate(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<ValidateBody>,
) -> Result<HttpResponse, AppError> {
    let flags = super::load_flags(&state).await?;
    let quote = discounts::validate_discount_code(
        &state.pool,
        &flags,
        user_id.into_inner(),
        &payload.code,
        payload.plan_id,
    )
    .await?;
    Ok(HttpResponse::Ok().json(quote))
}
