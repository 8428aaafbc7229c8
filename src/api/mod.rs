pub mod admin;
pub mod auctions;
pub mod auth;
pub mod discounts;
pub mod jobs;
pub mod missions;
pub mod premium;
pub mod products;
pub mod settings;
pub mod swipes;
pub mod trades;

use actix_web::web;

use crate::error::AppError;
use crate::flags::{self, FeatureFlags};
use crate::AppState;

/// Flag snapshot for the current request.
pub(crate) async fn load_flags(state: &AppState) -> Result<FeatureFlags, AppError> {
    Ok(flags::load(&state.pool).await?)
}

/// Routes behind `JwtMiddleware`, mounted under `/api`.
pub fn protected_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(products::feed)
        .service(products::list_own)
        .service(products::create)
        .service(products::get_one)
        .service(products::update)
        .service(products::delete)
        .service(products::renew)
        .service(products::upload_image)
        .service(swipes::swipe)
        .service(swipes::list_matches)
        .service(swipes::get_match)
        .service(swipes::update_status)
        .service(swipes::list_messages)
        .service(swipes::send_message)
        .service(premium::super_like)
        .service(premium::boost)
        .service(premium::rewind)
        .service(premium::usage)
        .service(premium::list_plans)
        .service(premium::current_subscription)
        .service(premium::list_subscriptions)
        .service(premium::subscribe)
        .service(premium::cancel_subscription)
        .service(discounts::validate)
        .service(auctions::list)
        .service(auctions::create)
        .service(auctions::get_one)
        .service(auctions::bid)
        .service(auctions::cancel)
        .service(trades::list)
        .service(trades::create)
        .service(trades::get_one)
        .service(trades::join)
        .service(trades::complete)
        .service(trades::cancel)
        .service(missions::list_missions)
        .service(missions::claim)
        .service(missions::list_achievements)
        .service(missions::wallet_summary)
        .service(settings::feature_flags)
        .service(settings::terms)
        .service(admin::list_flags)
        .service(admin::update_flag)
        .service(admin::get_setting)
        .service(admin::put_setting)
        .service(admin::create_plan)
        .service(admin::update_plan)
        .service(admin::list_discounts)
        .service(admin::create_discount)
        .service(admin::deactivate_discount)
        .service(admin::list_missions)
        .service(admin::create_mission)
        .service(admin::toggle_mission)
        .service(admin::list_achievements)
        .service(admin::create_achievement)
        .service(admin::feature_product)
        .service(admin::stats)
        .service(admin::send_test_email);
}
