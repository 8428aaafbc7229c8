// src/error.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::auctions::BidRejection;
use crate::discounts::DiscountRejection;
use crate::mail::MailError;
use crate::missions::MissionRejection;
use crate::trades::TradeRejection;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Esta función está desactivada")]
    FeatureDisabled(&'static str),

    #[error("Limit reached")]
    LimitReached,

    #[error(transparent)]
    Bid(#[from] BidRejection),

    #[error(transparent)]
    Trade(#[from] TradeRejection),

    #[error(transparent)]
    Discount(#[from] DiscountRejection),

    #[error(transparent)]
    Mission(#[from] MissionRejection),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("forbidden")]
    Forbidden,

    #[error("unauthorized")]
    Unauthorized,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("mail error: {0}")]
    Mail(#[from] MailError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("password hashing error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Stable machine-readable code sent next to the human message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::FeatureDisabled(_) => "feature_disabled",
            AppError::LimitReached => "limit_reached",
            AppError::Bid(_) => "bid_rejected",
            AppError::Trade(_) => "trade_rejected",
            AppError::Discount(_) => "discount_rejected",
            AppError::Mission(_) => "mission_rejected",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden => "forbidden",
            AppError::Unauthorized => "unauthorized",
            AppError::Database(_)
            | AppError::Mail(_)
            | AppError::Storage(_)
            | AppError::PasswordHash(_) => "internal",
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Mail(_)
                | AppError::Storage(_)
                | AppError::PasswordHash(_)
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::FeatureDisabled(_) | AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::LimitReached => StatusCode::CONFLICT,
            AppError::Mission(MissionRejection::AlreadyClaimed) => StatusCode::CONFLICT,
            AppError::Bid(_)
            | AppError::Trade(_)
            | AppError::Discount(_)
            | AppError::Mission(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Database(_)
            | AppError::Mail(_)
            | AppError::Storage(_)
            | AppError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = if self.is_internal() {
            log::error!("request failed: {self}");
            "Algo salió mal".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": message,
            "code": self.code(),
        }))
    }
}
