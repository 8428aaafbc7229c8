// src/auctions.rs
//
// Bids are validated and applied under a row lock on the auction, so
// `current_price` only ever grows and there is one winning bid at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;

use crate::error::AppError;
use crate::flags::{self, FeatureFlags};
use crate::models::{Auction, AuctionBid, AuctionStatus, ProductStatus};
use crate::{db, missions, ws, AppState};

const AUCTION_COLUMNS: &str = "id, product_id, seller_id, starting_price, current_price, min_increment, \
     ends_at, status, winner_id, created_at, updated_at";
const BID_COLUMNS: &str = "id, auction_id, bidder_id, amount, is_winning, created_at";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BidRejection {
    #[error("La subasta no está activa")]
    NotActive,

    #[error("No puedes pujar en tu propia subasta")]
    OwnAuction,

    #[error("La subasta ha terminado")]
    Ended,

    #[error("Oferta muy baja")]
    TooLow { minimum: i64 },
}

/// Smallest amount the next bid must reach.
pub fn minimum_bid(auction: &Auction) -> i64 {
    auction.current_price.saturating_add(auction.min_increment)
}

pub fn validate_bid(
    auction: &Auction,
    bidder_id: i32,
    amount: i64,
    now: DateTime<Utc>,
) -> Result<(), BidRejection> {
    if auction.status != AuctionStatus::Active {
        return Err(BidRejection::NotActive);
    }
    if auction.seller_id == bidder_id {
        return Err(BidRejection::OwnAuction);
    }
    if now >= auction.ends_at {
        return Err(BidRejection::Ended);
    }
    let minimum = minimum_bid(auction);
    if amount < minimum {
        return Err(BidRejection::TooLow { minimum });
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct NewAuction {
    pub product_id: i32,
    pub starting_price: i64,
    pub min_increment: i64,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AuctionDetail {
    pub auction: Auction,
    pub minimum_bid: i64,
    pub bids: Vec<AuctionBid>,
}

#[derive(Debug, Serialize)]
pub struct BidReceipt {
    pub bid: AuctionBid,
    pub current_price: i64,
    pub previous_winner_id: Option<i32>,
}

async fn lock_auction(
    conn: &mut PgConnection,
    auction_id: i32,
) -> Result<Option<Auction>, sqlx::Error> {
    sqlx::query_as::<_, Auction>(&format!(
        "SELECT {AUCTION_COLUMNS} FROM auctions WHERE id = $1 FOR UPDATE"
    ))
    .bind(auction_id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn create_auction(
    state: &AppState,
    flags: &FeatureFlags,
    seller_id: i32,
    new: &NewAuction,
) -> Result<Auction, AppError> {
    flags.require(flags::AUCTIONS)?;

    if new.starting_price <= 0 || new.min_increment <= 0 {
        return Err(AppError::bad_request("Los precios deben ser positivos"));
    }
    if new.ends_at <= Utc::now() {
        return Err(AppError::bad_request("La fecha de cierre debe ser futura"));
    }

    let product = db::get_product(&state.pool, new.product_id)
        .await?
        .filter(|p| p.owner_id == seller_id)
        .ok_or(AppError::NotFound("product"))?;
    if product.status != ProductStatus::Active {
        return Err(AppError::bad_request("El producto no está disponible"));
    }

    let auction = sqlx::query_as::<_, Auction>(&format!(
        r#"INSERT INTO auctions (product_id, seller_id, starting_price, current_price, min_increment, ends_at)
           VALUES ($1, $2, $3, $3, $4, $5)
           ON CONFLICT (product_id) WHERE status = 'active' DO NOTHING
           RETURNING {AUCTION_COLUMNS}"#
    ))
    .bind(product.id)
    .bind(seller_id)
    .bind(new.starting_price)
    .bind(new.min_increment)
    .bind(new.ends_at)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::bad_request("El producto ya tiene una subasta activa"))?;

    log::info!("auction created id={} product_id={}", auction.id, product.id);
    Ok(auction)
}

pub async fn place_bid(
    state: &AppState,
    flags: &FeatureFlags,
    bidder_id: i32,
    auction_id: i32,
    amount: i64,
) -> Result<BidReceipt, AppError> {
    flags.require(flags::AUCTIONS)?;

    let mut tx = state.pool.begin().await?;
    let auction = lock_auction(&mut tx, auction_id)
        .await?
        .ok_or(AppError::NotFound("auction"))?;

    validate_bid(&auction, bidder_id, amount, Utc::now())?;

    let previous_winner_id: Option<i32> = sqlx::query_scalar(
        r#"UPDATE auction_bids SET is_winning = false
           WHERE auction_id = $1 AND is_winning
           RETURNING bidder_id"#,
    )
    .bind(auction_id)
    .fetch_optional(&mut *tx)
    .await?;

    let bid = sqlx::query_as::<_, AuctionBid>(&format!(
        r#"INSERT INTO auction_bids (auction_id, bidder_id, amount, is_winning)
           VALUES ($1, $2, $3, true)
           RETURNING {BID_COLUMNS}"#
    ))
    .bind(auction_id)
    .bind(bidder_id)
    .bind(amount)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE auctions SET current_price = $2, updated_at = NOW() WHERE id = $1")
        .bind(auction_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    log::info!("bid accepted auction_id={auction_id} bidder_id={bidder_id} amount={amount}");

    let payload = json!({ "auction_id": auction_id, "amount": amount, "bidder_id": bidder_id });
    ws::notify(&state.hub, auction.seller_id, ws::AUCTION_BID, payload.clone());
    if let Some(prev) = previous_winner_id.filter(|p| *p != bidder_id) {
        ws::notify(&state.hub, prev, ws::AUCTION_OUTBID, payload);
    }
    missions::track(&state.pool, flags, bidder_id, missions::ACTION_PLACE_BID).await;

    Ok(BidReceipt {
        bid,
        current_price: amount,
        previous_winner_id,
    })
}

/// Seller may withdraw an auction nobody has bid on yet.
pub async fn cancel_auction(
    state: &AppState,
    seller_id: i32,
    auction_id: i32,
) -> Result<Auction, AppError> {
    let mut tx = state.pool.begin().await?;
    let auction = lock_auction(&mut tx, auction_id)
        .await?
        .filter(|a| a.seller_id == seller_id)
        .ok_or(AppError::NotFound("auction"))?;

    if auction.status != AuctionStatus::Active {
        return Err(BidRejection::NotActive.into());
    }

    let has_bids: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM auction_bids WHERE auction_id = $1)")
            .bind(auction_id)
            .fetch_one(&mut *tx)
            .await?;
    if has_bids {
        return Err(AppError::bad_request(
            "No se puede cancelar una subasta con pujas",
        ));
    }

    let cancelled = sqlx::query_as::<_, Auction>(&format!(
        r#"UPDATE auctions SET status = 'cancelled', updated_at = NOW()
           WHERE id = $1
           RETURNING {AUCTION_COLUMNS}"#
    ))
    .bind(auction_id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(cancelled)
}

pub async fn list_active_auctions(pool: &PgPool) -> Result<Vec<Auction>, sqlx::Error> {
    sqlx::query_as::<_, Auction>(&format!(
        r#"SELECT {AUCTION_COLUMNS} FROM auctions
           WHERE status = 'active' AND ends_at > NOW()
           ORDER BY ends_at ASC"#
    ))
    .fetch_all(pool)
    .await
}

pub async fn get_auction(pool: &PgPool, auction_id: i32) -> Result<AuctionDetail, AppError> {
    let auction = sqlx::query_as::<_, Auction>(&format!(
        "SELECT {AUCTION_COLUMNS} FROM auctions WHERE id = $1"
    ))
    .bind(auction_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("auction"))?;

    let bids = sqlx::query_as::<_, AuctionBid>(&format!(
        "SELECT {BID_COLUMNS} FROM auction_bids WHERE auction_id = $1 ORDER BY amount DESC"
    ))
    .bind(auction_id)
    .fetch_all(pool)
    .await?;

    Ok(AuctionDetail {
        minimum_bid: minimum_bid(&auction),
        auction,
        bids,
    })
}

/// Ends every active auction past its deadline and records the winner.
/// Returns the auctions that were closed.
pub async fn close_expired_auctions(state: &AppState) -> Result<Vec<Auction>, sqlx::Error> {
    let closed = sqlx::query_as::<_, Auction>(&format!(
        r#"UPDATE auctions a
           SET status = 'ended',
               winner_id = (SELECT b.bidder_id FROM auction_bids b
                            WHERE b.auction_id = a.id AND b.is_winning),
               updated_at = NOW()
           WHERE a.status = 'active' AND a.ends_at <= NOW()
           RETURNING {AUCTION_COLUMNS}"#
    ))
    .fetch_all(&state.pool)
    .await?;

    for auction in &closed {
        log::info!(
            "auction closed id={} winner={:?} price={}",
            auction.id,
            auction.winner_id,
            auction.current_price
        );
        let payload = json!(auction);
        ws::notify(&state.hub, auction.seller_id, ws::AUCTION_WON, payload.clone());
        if let Some(winner) = auction.winner_id {
            ws::notify(&state.hub, winner, ws::AUCTION_WON, payload);
        }
    }

    Ok(closed)
}
