use actix_web::test::TestRequest;
use actix_web::{test, web, App};
use chrono::{Duration, Utc};
use futures_util::future::join_all;
use serde_json::{json, Value};
use sqlx::Row;

use trueke::api;
use trueke::auctions::{self, BidRejection, NewAuction};
use trueke::discounts::{self, DiscountRejection, NewDiscountCode};
use trueke::error::AppError;
use trueke::jobs;
use trueke::missions::{self, MissionRejection};
use trueke::models::{
    AuctionStatus, DiscountType, MatchStatus, SwipeAction, TradeStatus, UsageType,
};
use trueke::premium::{self, PlanInput, SubscribeRequest};
use trueke::products::{self, NewProduct};
use trueke::{db, flags};
use trueke::swipes::{self, SwipeRequest};
use trueke::trades::{self, NewTrade, TradeRejection};

mod support;

#[actix_web::test]
async fn super_like_stops_at_daily_limit() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let liker = support::insert_user(pool, false).await;
    let owner = support::insert_user(pool, false).await;
    let first = support::insert_product(pool, owner).await;
    let second = support::insert_product(pool, owner).await;

    let state = web::Data::new(support::build_state(pool.clone()).await);
    let app = test::init_service(
        App::new().app_data(state.clone()).service(
            web::scope("/api")
                .wrap(api::auth::JwtMiddleware)
                .configure(api::protected_routes),
        ),
    )
    .await;
    let bearer = format!("Bearer {}", support::token(liker));

    let req = TestRequest::post()
        .uri("/api/premium/super-like")
        .insert_header(("Authorization", bearer.clone()))
        .set_json(json!({ "product_id": first }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["used"], 1);

    let req = TestRequest::post()
        .uri("/api/premium/super-like")
        .insert_header(("Authorization", bearer))
        .set_json(json!({ "product_id": second }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 409);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Limit reached");

    let count: i32 = sqlx::query(
        "SELECT count FROM premium_usage WHERE user_id = $1 AND usage_type = 'super_like'",
    )
    .bind(liker)
    .fetch_one(pool)
    .await
    .expect("usage row")
    .get("count");
    assert_eq!(count, 1);

    let swiped: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM swipes WHERE user_id = $1")
        .bind(liker)
        .fetch_one(pool)
        .await
        .expect("count swipes");
    assert_eq!(swiped, 1);
}

#[actix_web::test]
async fn concurrent_super_likes_respect_limit() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let liker = support::insert_user(pool, false).await;
    let mut products = Vec::new();
    for _ in 0..5 {
        let owner = support::insert_user(pool, false).await;
        products.push(support::insert_product(pool, owner).await);
    }

    let state = support::build_state(pool.clone()).await;
    let flags = support::load_flags(pool).await;

    let results = join_all(
        products
            .iter()
            .map(|p| premium::send_super_like(&state, &flags, liker, *p, None)),
    )
    .await;

    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, AppError::LimitReached)));
}

#[actix_web::test]
async fn premium_plan_raises_super_like_limit() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let liker = support::insert_user(pool, false).await;
    let owner = support::insert_user(pool, false).await;
    let plan = support::insert_plan(pool, 999, 3).await;

    let state = support::build_state(pool.clone()).await;
    let flags = support::load_flags(pool).await;

    premium::subscribe(
        &state,
        &flags,
        liker,
        &SubscribeRequest {
            plan_id: plan,
            discount_code: None,
        },
    )
    .await
    .expect("subscribe");

    for expected in 1..=3 {
        let product = support::insert_product(pool, owner).await;
        let receipt = premium::send_super_like(&state, &flags, liker, product, None)
            .await
            .expect("super like within plan limit");
        assert_eq!(receipt.used, expected);
    }

    let product = support::insert_product(pool, owner).await;
    let err = premium::send_super_like(&state, &flags, liker, product, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LimitReached));
}

#[actix_web::test]
async fn mutual_likes_create_one_match() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let alice = support::insert_user(pool, false).await;
    let bob = support::insert_user(pool, false).await;
    let alice_product = support::insert_product(pool, alice).await;
    let bob_product = support::insert_product(pool, bob).await;

    let state = support::build_state(pool.clone()).await;
    let flags = support::load_flags(pool).await;

    let first = swipes::record_swipe(
        &state,
        &flags,
        alice,
        &SwipeRequest {
            product_id: bob_product,
            action: SwipeAction::Like,
            offered_product_id: Some(alice_product),
        },
    )
    .await
    .expect("alice swipe");
    assert!(first.new_match.is_none());

    let second = swipes::record_swipe(
        &state,
        &flags,
        bob,
        &SwipeRequest {
            product_id: alice_product,
            action: SwipeAction::Like,
            offered_product_id: None,
        },
    )
    .await
    .expect("bob swipe");
    let m = second.new_match.expect("match created");
    assert_eq!(m.user1_id, bob);
    assert_eq!(m.product1_id, bob_product);
    assert_eq!(m.user2_id, alice);
    assert_eq!(m.product2_id, alice_product);
    assert_eq!(m.status, MatchStatus::Pending);

    let accepted = swipes::update_match_status(&state, alice, m.id, MatchStatus::Accepted)
        .await
        .expect("accept");
    assert_eq!(accepted.status, MatchStatus::Accepted);

    let err = swipes::update_match_status(&state, alice, m.id, MatchStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let message = swipes::send_message(&state, &flags, bob, m.id, "  ¿Cambiamos?  ")
        .await
        .expect("send message");
    assert_eq!(message.content, "¿Cambiamos?");

    swipes::update_match_status(&state, bob, m.id, MatchStatus::Completed)
        .await
        .expect("complete");
    let traded: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM products WHERE id IN ($1, $2) AND status = 'traded'",
    )
    .bind(alice_product)
    .bind(bob_product)
    .fetch_one(pool)
    .await
    .expect("count traded");
    assert_eq!(traded, 2);
}

async fn open_auction(state: &trueke::AppState, seller: i32) -> i32 {
    let flags = support::load_flags(&state.pool).await;
    let product = support::insert_product(&state.pool, seller).await;
    auctions::create_auction(
        state,
        &flags,
        seller,
        &NewAuction {
            product_id: product,
            starting_price: 100,
            min_increment: 10,
            ends_at: Utc::now() + Duration::hours(1),
        },
    )
    .await
    .expect("create auction")
    .id
}

#[actix_web::test]
async fn underbid_is_rejected_and_valid_bid_raises_price() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let seller = support::insert_user(pool, false).await;
    let bidder = support::insert_user(pool, false).await;
    let rival = support::insert_user(pool, false).await;

    let state = support::build_state(pool.clone()).await;
    let flags = support::load_flags(pool).await;
    let auction_id = open_auction(&state, seller).await;

    let err = auctions::place_bid(&state, &flags, bidder, auction_id, 105)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Bid(BidRejection::TooLow { minimum: 110 })
    ));
    assert_eq!(err.to_string(), "Oferta muy baja");

    let receipt = auctions::place_bid(&state, &flags, bidder, auction_id, 110)
        .await
        .expect("valid bid");
    assert_eq!(receipt.current_price, 110);
    assert_eq!(receipt.previous_winner_id, None);

    let err = auctions::place_bid(&state, &flags, seller, auction_id, 500)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Bid(BidRejection::OwnAuction)));

    let receipt = auctions::place_bid(&state, &flags, rival, auction_id, 120)
        .await
        .expect("outbid");
    assert_eq!(receipt.previous_winner_id, Some(bidder));

    let detail = auctions::get_auction(pool, auction_id).await.expect("detail");
    assert_eq!(detail.auction.current_price, 120);
    assert_eq!(detail.minimum_bid, 130);
    assert_eq!(detail.bids.iter().filter(|b| b.is_winning).count(), 1);
}

#[actix_web::test]
async fn concurrent_bids_keep_one_winner() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let seller = support::insert_user(pool, false).await;
    let mut bidders = Vec::new();
    for _ in 0..5 {
        bidders.push(support::insert_user(pool, false).await);
    }

    let state = support::build_state(pool.clone()).await;
    let flags = support::load_flags(pool).await;
    let auction_id = open_auction(&state, seller).await;

    // Everyone bids the same opening amount; only one can win it.
    let results = join_all(
        bidders
            .iter()
            .map(|b| auctions::place_bid(&state, &flags, *b, auction_id, 110)),
    )
    .await;
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    let detail = auctions::get_auction(pool, auction_id).await.expect("detail");
    assert_eq!(detail.auction.current_price, 110);
    assert_eq!(detail.bids.len(), 1);
}

#[actix_web::test]
async fn expired_auction_closes_with_winner() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let seller = support::insert_user(pool, false).await;
    let bidder = support::insert_user(pool, false).await;

    let state = support::build_state(pool.clone()).await;
    let flags = support::load_flags(pool).await;
    let auction_id = open_auction(&state, seller).await;
    auctions::place_bid(&state, &flags, bidder, auction_id, 150)
        .await
        .expect("bid");

    sqlx::query("UPDATE auctions SET ends_at = NOW() - INTERVAL '1 minute' WHERE id = $1")
        .bind(auction_id)
        .execute(pool)
        .await
        .expect("age auction");

    let err = auctions::place_bid(&state, &flags, bidder, auction_id, 200)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Bid(BidRejection::Ended)));

    let report = jobs::close_auctions(&state).await.expect("close");
    assert_eq!(report.expired, 1);

    let detail = auctions::get_auction(pool, auction_id).await.expect("detail");
    assert_eq!(detail.auction.status, AuctionStatus::Ended);
    assert_eq!(detail.auction.winner_id, Some(bidder));
}

#[actix_web::test]
async fn circular_trade_activates_at_minimum() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let state = support::build_state(pool.clone()).await;
    let flags = support::load_flags(pool).await;

    let mut users = Vec::new();
    for _ in 0..4 {
        let user = support::insert_user(pool, false).await;
        let product = support::insert_product(pool, user).await;
        users.push((user, product));
    }

    let detail = trades::create_circular_trade(
        &state,
        &flags,
        users[0].0,
        &NewTrade {
            title: "Anillo de bicis".to_string(),
            description: None,
            min_participants: 3,
            max_participants: 4,
            product_id: users[0].1,
        },
    )
    .await
    .expect("create trade");
    let trade_id = detail.trade.id;

    let second = trades::join_circular_trade(&state, &flags, users[1].0, trade_id, users[1].1)
        .await
        .expect("second joins");
    assert_eq!(second.trade.status, TradeStatus::Pending);
    assert_eq!(second.participants.last().map(|p| p.position), Some(2));

    let err = trades::join_circular_trade(&state, &flags, users[1].0, trade_id, users[1].1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Trade(TradeRejection::AlreadyJoined)));

    let third = trades::join_circular_trade(&state, &flags, users[2].0, trade_id, users[2].1)
        .await
        .expect("third joins");
    assert_eq!(third.trade.status, TradeStatus::InProgress);
    assert_eq!(third.participants.len(), 3);

    let err = trades::join_circular_trade(&state, &flags, users[3].0, trade_id, users[3].1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Trade(TradeRejection::NotOpen)));
    assert_eq!(err.to_string(), "El intercambio ya no acepta participantes");

    let done = trades::complete_trade(&state, &flags, users[0].0, trade_id)
        .await
        .expect("complete");
    assert_eq!(done.trade.status, TradeStatus::Completed);
}

#[actix_web::test]
async fn concurrent_joins_never_exceed_capacity() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let state = support::build_state(pool.clone()).await;
    let flags = support::load_flags(pool).await;

    let creator = support::insert_user(pool, false).await;
    let creator_product = support::insert_product(pool, creator).await;
    let trade_id = trades::create_circular_trade(
        &state,
        &flags,
        creator,
        &NewTrade {
            title: "Trueque a tres".to_string(),
            description: None,
            min_participants: 3,
            max_participants: 3,
            product_id: creator_product,
        },
    )
    .await
    .expect("create trade")
    .trade
    .id;

    let mut joiners = Vec::new();
    for _ in 0..6 {
        let user = support::insert_user(pool, false).await;
        let product = support::insert_product(pool, user).await;
        joiners.push((user, product));
    }

    let results = join_all(
        joiners
            .iter()
            .map(|(u, p)| trades::join_circular_trade(&state, &flags, *u, trade_id, *p)),
    )
    .await;
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);

    let detail = trades::get_trade(pool, trade_id).await.expect("trade");
    assert_eq!(detail.participants.len(), 3);
    assert_eq!(detail.trade.status, TradeStatus::InProgress);
    let positions: Vec<i32> = detail.participants.iter().map(|p| p.position).collect();
    assert_eq!(positions, vec![1, 2, 3]);
}

#[actix_web::test]
async fn mission_reward_is_claimed_once() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let state = support::build_state(pool.clone()).await;
    let flags = support::load_flags(pool).await;

    missions::create(
        pool,
        &missions::NewMission {
            title: "Primer swipe".to_string(),
            description: None,
            action_type: missions::ACTION_SWIPE.to_string(),
            target_count: 1,
            reward_trukoins: 50,
        },
    )
    .await
    .expect("create mission");

    let user = support::insert_user(pool, false).await;
    let owner = support::insert_user(pool, false).await;
    let product = support::insert_product(pool, owner).await;

    swipes::record_swipe(
        &state,
        &flags,
        user,
        &SwipeRequest {
            product_id: product,
            action: SwipeAction::Dislike,
            offered_product_id: None,
        },
    )
    .await
    .expect("swipe");

    let user_mission_id: i32 =
        sqlx::query_scalar("SELECT id FROM user_missions WHERE user_id = $1 AND completed_at IS NOT NULL")
            .bind(user)
            .fetch_one(pool)
            .await
            .expect("completed mission");

    let receipt = missions::claim_mission_reward(pool, &flags, user, user_mission_id)
        .await
        .expect("first claim");
    assert_eq!(receipt.reward, 50);
    assert_eq!(receipt.balance, 50);

    let err = missions::claim_mission_reward(pool, &flags, user, user_mission_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Mission(MissionRejection::AlreadyClaimed)));
    assert_eq!(err.to_string(), "Recompensa ya reclamada");

    let balance = trueke::wallet::balance(pool, user).await.expect("balance");
    assert_eq!(balance, 50);
}

fn single_use_code(code: &str, discount_type: DiscountType, value: i64) -> NewDiscountCode {
    NewDiscountCode {
        code: code.to_string(),
        description: None,
        discount_type,
        discount_value: value,
        max_uses: Some(1),
        valid_from: Some(Utc::now() - Duration::hours(1)),
        valid_until: None,
        min_plan_price_cents: None,
        applicable_plan_ids: Vec::new(),
    }
}

#[actix_web::test]
async fn single_use_discount_cannot_be_reused() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let state = support::build_state(pool.clone()).await;
    let flags = support::load_flags(pool).await;

    let user = support::insert_user(pool, false).await;
    let plan = support::insert_plan(pool, 1000, 5).await;
    discounts::create(pool, &single_use_code("welcome20", DiscountType::Percentage, 20))
        .await
        .expect("create code");

    let quote = discounts::validate_discount_code(pool, &flags, user, "WELCOME20", plan)
        .await
        .expect("validate");
    assert_eq!(quote.final_price, 800);

    let request = SubscribeRequest {
        plan_id: plan,
        discount_code: Some("welcome20".to_string()),
    };
    let receipt = premium::subscribe(&state, &flags, user, &request)
        .await
        .expect("first redemption");
    assert_eq!(receipt.subscription.amount_paid_cents, 800);

    let err = premium::subscribe(&state, &flags, user, &request)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Discount(DiscountRejection::AlreadyUsed)));
    assert_eq!(err.to_string(), "Ya has usado este código");

    let uses: i32 = sqlx::query_scalar("SELECT current_uses FROM discount_codes WHERE code = 'WELCOME20'")
        .fetch_one(pool)
        .await
        .expect("uses");
    assert_eq!(uses, 1);

    // The failed attempt rolled back and left the first subscription active.
    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM user_subscriptions WHERE user_id = $1 AND status = 'active'",
    )
    .bind(user)
    .fetch_one(pool)
    .await
    .expect("count");
    assert_eq!(active, 1);

    let other = support::insert_user(pool, false).await;
    let err = discounts::validate_discount_code(pool, &flags, other, "WELCOME20", plan)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Discount(DiscountRejection::Exhausted)));
}

#[actix_web::test]
async fn fixed_discount_never_goes_negative() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let flags = support::load_flags(pool).await;
    let user = support::insert_user(pool, false).await;
    let plan = support::insert_plan(pool, 1000, 5).await;
    discounts::create(pool, &single_use_code("BIGFIX", DiscountType::Fixed, 5000))
        .await
        .expect("create code");

    let quote = discounts::validate_discount_code(pool, &flags, user, "bigfix", plan)
        .await
        .expect("validate");
    assert_eq!(quote.discount_amount, 1000);
    assert_eq!(quote.final_price, 0);
}

#[actix_web::test]
async fn product_sweep_expires_and_notifies_once() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let state = support::build_state(pool.clone()).await;
    let owner = support::insert_user(pool, false).await;

    let past_due = support::insert_product_expiring(pool, owner, "-1 hour").await;
    let tomorrow = support::insert_product_expiring(pool, owner, "12 hours").await;
    let soon = support::insert_product_expiring(pool, owner, "2 days").await;
    let later = support::insert_product_expiring(pool, owner, "20 days").await;

    let report = jobs::product_expiry_sweep(&state).await.expect("sweep");
    assert_eq!(report.expired, 1);
    assert_eq!(report.notified, 2);

    let row = sqlx::query(
        "SELECT status::TEXT AS status, notified_1d_at, notified_3d_at FROM products WHERE id = $1",
    )
    .bind(past_due)
    .fetch_one(pool)
    .await
    .expect("past due row");
    assert_eq!(row.get::<String, _>("status"), "expired");
    assert!(row.get::<Option<chrono::DateTime<Utc>>, _>("notified_1d_at").is_none());
    assert!(row.get::<Option<chrono::DateTime<Utc>>, _>("notified_3d_at").is_none());

    let flagged = |id: i32, column: &'static str| {
        let pool = pool.clone();
        async move {
            sqlx::query(&format!("SELECT {column} IS NOT NULL AS set FROM products WHERE id = $1"))
                .bind(id)
                .fetch_one(&pool)
                .await
                .expect("flag row")
                .get::<bool, _>("set")
        }
    };
    assert!(flagged(tomorrow, "notified_1d_at").await);
    assert!(flagged(soon, "notified_3d_at").await);
    assert!(!flagged(soon, "notified_1d_at").await);
    assert!(!flagged(later, "notified_3d_at").await);

    let again = jobs::product_expiry_sweep(&state).await.expect("second sweep");
    assert_eq!(again.expired, 0);
    assert_eq!(again.notified, 0);
}

#[actix_web::test]
async fn cron_routes_require_secret() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let state = web::Data::new(support::build_state(test_db.pool.clone()).await);
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .service(api::jobs::product_expiry),
    )
    .await;

    let req = TestRequest::post().uri("/jobs/product-expiry").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);

    let req = TestRequest::post()
        .uri("/jobs/product-expiry")
        .insert_header((api::jobs::CRON_SECRET_HEADER, support::CRON_SECRET))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn admin_routes_reject_regular_users() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let regular = support::insert_user(pool, false).await;
    let admin = support::insert_user(pool, true).await;

    let state = web::Data::new(support::build_state(pool.clone()).await);
    let app = test::init_service(
        App::new().app_data(state.clone()).service(
            web::scope("/api")
                .wrap(api::auth::JwtMiddleware)
                .configure(api::protected_routes),
        ),
    )
    .await;

    let req = TestRequest::put()
        .uri("/api/admin/flags/auctions")
        .insert_header(("Authorization", format!("Bearer {}", support::token(regular))))
        .set_json(json!({ "is_enabled": false }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 403);

    let req = TestRequest::put()
        .uri("/api/admin/flags/auctions")
        .insert_header(("Authorization", format!("Bearer {}", support::token(admin))))
        .set_json(json!({ "is_enabled": false }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    // With the flag off, auctions refuse new bids.
    let flags = support::load_flags(pool).await;
    let err = auctions::place_bid(&state, &flags, regular, 1, 100)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::FeatureDisabled(_)));
}

async fn usage_count(pool: &sqlx::PgPool, user_id: i32, kind: &str) -> i64 {
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(count), 0)::BIGINT FROM premium_usage WHERE user_id = $1 AND usage_type::TEXT = $2",
    )
    .bind(user_id)
    .bind(kind)
    .fetch_one(pool)
    .await
    .expect("usage count")
}

#[actix_web::test]
async fn boosts_need_a_plan_and_count_per_month() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let state = support::build_state(pool.clone()).await;
    let flags = support::load_flags(pool).await;

    let user = support::insert_user(pool, false).await;
    let product = support::insert_product(pool, user).await;

    let err = premium::activate_boost(&state, &flags, user, product)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LimitReached));
    assert_eq!(usage_count(pool, user, "boost").await, 0);

    let plan = support::insert_plan(pool, 500, 3).await;
    premium::subscribe(
        &state,
        &flags,
        user,
        &SubscribeRequest {
            plan_id: plan,
            discount_code: None,
        },
    )
    .await
    .expect("subscribe");

    let receipt = premium::activate_boost(&state, &flags, user, product)
        .await
        .expect("boost with plan");
    assert_eq!(receipt.used, 1);
    assert_eq!(receipt.boost.product_id, product);
    assert_eq!(
        (receipt.boost.ends_at - receipt.boost.started_at).num_minutes(),
        premium::BOOST_MINUTES
    );

    let period: chrono::NaiveDate = sqlx::query_scalar(
        "SELECT period_start FROM premium_usage WHERE user_id = $1 AND usage_type = 'boost'",
    )
    .bind(user)
    .fetch_one(pool)
    .await
    .expect("boost period");
    assert_eq!(period, premium::period_start(UsageType::Boost, Utc::now()));
    assert_eq!(chrono::Datelike::day(&period), 1);
}

#[actix_web::test]
async fn failed_rewind_keeps_quota() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let state = support::build_state(pool.clone()).await;
    let flags = support::load_flags(pool).await;

    let user = support::insert_user(pool, false).await;
    let owner = support::insert_user(pool, false).await;

    let err = premium::use_rewind(&state, &flags, user).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(usage_count(pool, user, "rewind").await, 0);

    let first = support::insert_product(pool, owner).await;
    swipes::record_swipe(
        &state,
        &flags,
        user,
        &SwipeRequest {
            product_id: first,
            action: SwipeAction::Dislike,
            offered_product_id: None,
        },
    )
    .await
    .expect("swipe");

    let receipt = premium::use_rewind(&state, &flags, user)
        .await
        .expect("rewind");
    assert_eq!(receipt.product_id, first);
    assert_eq!(receipt.used, 1);
    let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM swipes WHERE user_id = $1")
        .bind(user)
        .fetch_one(pool)
        .await
        .expect("count swipes");
    assert_eq!(left, 0);

    let second = support::insert_product(pool, owner).await;
    swipes::record_swipe(
        &state,
        &flags,
        user,
        &SwipeRequest {
            product_id: second,
            action: SwipeAction::Like,
            offered_product_id: None,
        },
    )
    .await
    .expect("swipe");
    let err = premium::use_rewind(&state, &flags, user).await.unwrap_err();
    assert!(matches!(err, AppError::LimitReached));
    assert_eq!(usage_count(pool, user, "rewind").await, 1);
}

#[actix_web::test]
async fn rewind_cannot_undo_a_match() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let state = support::build_state(pool.clone()).await;
    let flags = support::load_flags(pool).await;

    let alice = support::insert_user(pool, false).await;
    let bob = support::insert_user(pool, false).await;
    let alice_product = support::insert_product(pool, alice).await;
    let bob_product = support::insert_product(pool, bob).await;

    for (user, product) in [(alice, bob_product), (bob, alice_product)] {
        swipes::record_swipe(
            &state,
            &flags,
            user,
            &SwipeRequest {
                product_id: product,
                action: SwipeAction::Like,
                offered_product_id: None,
            },
        )
        .await
        .expect("like");
    }

    let err = premium::use_rewind(&state, &flags, bob).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(usage_count(pool, bob, "rewind").await, 0);

    let kept: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM swipes WHERE user_id = $1")
        .bind(bob)
        .fetch_one(pool)
        .await
        .expect("count swipes");
    assert_eq!(kept, 1);
    assert_eq!(swipes::list_matches(&state, bob).await.expect("matches").len(), 1);
}

#[actix_web::test]
async fn disabled_flag_wins_over_remaining_quota() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let state = support::build_state(pool.clone()).await;

    let user = support::insert_user(pool, false).await;
    let owner = support::insert_user(pool, false).await;
    let product = support::insert_product(pool, owner).await;

    flags::set_enabled(pool, flags::SUPER_LIKES, false)
        .await
        .expect("disable")
        .expect("flag row");
    let snapshot = support::load_flags(pool).await;

    let err = premium::send_super_like(&state, &snapshot, user, product, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::FeatureDisabled(flags::SUPER_LIKES)));
    assert_eq!(err.to_string(), "Esta función está desactivada");
    assert_eq!(usage_count(pool, user, "super_like").await, 0);

    let summary = premium::usage_summary(&state.pool, &snapshot, user)
        .await
        .expect("summary");
    let super_likes = summary
        .iter()
        .find(|u| u.usage_type == UsageType::SuperLike)
        .expect("super like entry");
    assert!(!super_likes.enabled);
    assert_eq!(super_likes.used, 0);
}

#[actix_web::test]
async fn subscription_sweep_expires_and_notifies_once() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let state = support::build_state(pool.clone()).await;
    let flags = support::load_flags(pool).await;
    let plan = support::insert_plan(pool, 900, 3).await;

    let mut subscriptions = Vec::new();
    for offset in ["-1 hour", "12 hours", "2 days", "10 days"] {
        let user = support::insert_user(pool, false).await;
        let id = premium::subscribe(
            &state,
            &flags,
            user,
            &SubscribeRequest {
                plan_id: plan,
                discount_code: None,
            },
        )
        .await
        .expect("subscribe")
        .subscription
        .id;
        sqlx::query("UPDATE user_subscriptions SET expires_at = NOW() + $2::INTERVAL WHERE id = $1")
            .bind(id)
            .bind(offset)
            .execute(pool)
            .await
            .expect("move expiry");
        subscriptions.push(id);
    }

    let report = jobs::subscription_expiry_sweep(&state).await.expect("sweep");
    assert_eq!(report.expired, 1);
    assert_eq!(report.notified, 2);
    assert_eq!(report.failed, 0);

    let rows: Vec<(i32, String, bool)> = sqlx::query_as(
        r#"SELECT id, status::TEXT, expiry_notified_at IS NOT NULL
           FROM user_subscriptions WHERE id = ANY($1) ORDER BY id"#,
    )
    .bind(&subscriptions[..])
    .fetch_all(pool)
    .await
    .expect("subscriptions");
    let by_id = |id: i32| rows.iter().find(|r| r.0 == id).expect("row").clone();

    assert_eq!(by_id(subscriptions[0]).1, "expired");
    assert!(!by_id(subscriptions[0]).2);
    assert!(by_id(subscriptions[1]).2);
    assert!(by_id(subscriptions[2]).2);
    assert!(!by_id(subscriptions[3]).2);

    let again = jobs::subscription_expiry_sweep(&state).await.expect("second sweep");
    assert_eq!(again.expired, 0);
    assert_eq!(again.notified, 0);
}

#[actix_web::test]
async fn mission_progress_clamps_and_completes_once() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let flags = support::load_flags(pool).await;

    let mission = missions::create(
        pool,
        &missions::NewMission {
            title: "Conversador".to_string(),
            description: None,
            action_type: missions::ACTION_SEND_MESSAGE.to_string(),
            target_count: 3,
            reward_trukoins: 20,
        },
    )
    .await
    .expect("create mission");
    let user = support::insert_user(pool, false).await;

    let step = missions::update_mission_progress(pool, &flags, user, missions::ACTION_SEND_MESSAGE, 2)
        .await
        .expect("progress");
    assert_eq!(step.len(), 1);
    assert_eq!(step[0].mission_id, mission.id);
    assert_eq!(step[0].current_progress, 2);
    assert!(step[0].completed_at.is_none());

    let over = missions::update_mission_progress(pool, &flags, user, missions::ACTION_SEND_MESSAGE, 2)
        .await
        .expect("overshoot");
    assert_eq!(over[0].current_progress, 3);
    let completed_at = over[0].completed_at.expect("completed");

    let after = missions::update_mission_progress(pool, &flags, user, missions::ACTION_SEND_MESSAGE, 5)
        .await
        .expect("after completion");
    assert!(after.is_empty());

    let (progress, stamped): (i32, Option<chrono::DateTime<Utc>>) = sqlx::query_as(
        "SELECT current_progress, completed_at FROM user_missions WHERE user_id = $1 AND mission_id = $2",
    )
    .bind(user)
    .bind(mission.id)
    .fetch_one(pool)
    .await
    .expect("user mission");
    assert_eq!(progress, 3);
    assert_eq!(stamped, Some(completed_at));
}

#[actix_web::test]
async fn oversized_durations_are_rejected() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let state = support::build_state(pool.clone()).await;
    let flags = support::load_flags(pool).await;

    let err = premium::create_plan(
        pool,
        &PlanInput {
            name: "Eterno".to_string(),
            description: None,
            price_cents: 100,
            duration_days: 2_000_000_000,
            super_likes_per_day: 1,
            boosts_per_month: 0,
            rewinds_per_day: 1,
            can_see_likes: false,
            ad_free: false,
            priority_support: false,
            is_active: true,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // A stored out-of-range setting falls back to the default instead of overflowing.
    db::put_setting(pool, "product_expiry_days", &json!(200_000_000))
        .await
        .expect("store setting");
    let owner = support::insert_user(pool, false).await;
    let product = products::create_product(
        &state,
        &flags,
        owner,
        &NewProduct {
            title: "Guitarra".to_string(),
            description: None,
            category: "música".to_string(),
            estimated_value: 80,
        },
    )
    .await
    .expect("create product");
    let days = (product.expires_at - Utc::now()).num_days();
    assert!((29..=30).contains(&days));

    let admin = support::insert_user(pool, true).await;
    let app = test::init_service(
        App::new().app_data(web::Data::new(state.clone())).service(
            web::scope("/api")
                .wrap(api::auth::JwtMiddleware)
                .configure(api::protected_routes),
        ),
    )
    .await;
    let req = TestRequest::put()
        .uri("/api/admin/settings/product_expiry_days")
        .insert_header(("Authorization", format!("Bearer {}", support::token(admin))))
        .set_json(json!(200_000_000))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[actix_web::test]
async fn admin_stats_report_connected_users() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let admin = support::insert_user(pool, true).await;

    let state = web::Data::new(support::build_state(pool.clone()).await);
    let app = test::init_service(
        App::new().app_data(state.clone()).service(
            web::scope("/api")
                .wrap(api::auth::JwtMiddleware)
                .configure(api::protected_routes),
        ),
    )
    .await;

    let req = TestRequest::get()
        .uri("/api/admin/stats")
        .insert_header(("Authorization", format!("Bearer {}", support::token(admin))))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["users"], 1);
    assert_eq!(body["connected_users"], 0);
}

#[actix_web::test]
async fn wallet_route_returns_balance_and_history() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let pool = &test_db.pool;
    let user = support::insert_user(pool, false).await;

    let state = web::Data::new(support::build_state(pool.clone()).await);
    let app = test::init_service(
        App::new().app_data(state.clone()).service(
            web::scope("/api")
                .wrap(api::auth::JwtMiddleware)
                .configure(api::protected_routes),
        ),
    )
    .await;

    let req = TestRequest::get()
        .uri("/api/wallet")
        .insert_header(("Authorization", format!("Bearer {}", support::token(user))))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["balance"], 0);
    assert!(body["transactions"].as_array().is_some_and(|t| t.is_empty()));
}
