// src/models.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "product_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    Expired,
    Traded,
    Paused,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "swipe_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SwipeAction {
    Like,
    Dislike,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "match_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
    Cancelled,
}

impl MatchStatus {
    /// pending -> accepted | rejected | cancelled, accepted -> completed | cancelled.
    pub fn can_transition_to(self, next: MatchStatus) -> bool {
        use MatchStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Accepted, Completed)
                | (Accepted, Cancelled)
        )
    }

    pub fn is_open(self) -> bool {
        matches!(self, MatchStatus::Pending | MatchStatus::Accepted)
    }
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "auction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Active,
    Ended,
    Cancelled,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "trade_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "usage_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    SuperLike,
    Boost,
    Rewind,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "discount_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub username: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Product {
    pub id: i32,
    pub owner_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub estimated_value: i64,
    pub images: Vec<String>,
    pub status: ProductStatus,
    pub is_featured: bool,
    pub expires_at: DateTime<Utc>,
    pub notified_3d_at: Option<DateTime<Utc>>,
    pub notified_1d_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Swipe {
    pub id: i32,
    pub user_id: i32,
    pub product_id: i32,
    pub action: SwipeAction,
    pub is_super_like: bool,
    pub offered_product_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Match {
    pub id: i32,
    pub user1_id: i32,
    pub user2_id: i32,
    pub product1_id: i32,
    pub product2_id: i32,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    pub fn involves(&self, user_id: i32) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    pub fn other_party(&self, user_id: i32) -> i32 {
        if self.user1_id == user_id {
            self.user2_id
        } else {
            self.user1_id
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: i32,
    pub match_id: i32,
    pub sender_id: i32,
    pub content: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Boost {
    pub id: i32,
    pub user_id: i32,
    pub product_id: i32,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Auction {
    pub id: i32,
    pub product_id: i32,
    pub seller_id: i32,
    pub starting_price: i64,
    pub current_price: i64,
    pub min_increment: i64,
    pub ends_at: DateTime<Utc>,
    pub status: AuctionStatus,
    pub winner_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuctionBid {
    pub id: i32,
    pub auction_id: i32,
    pub bidder_id: i32,
    pub amount: i64,
    pub is_winning: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CircularTrade {
    pub id: i32,
    pub creator_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub min_participants: i32,
    pub max_participants: i32,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CircularTradeParticipant {
    pub id: i32,
    pub trade_id: i32,
    pub user_id: i32,
    pub product_id: i32,
    pub position: i32,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PremiumPlan {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub duration_days: i32,
    pub super_likes_per_day: i32,
    pub boosts_per_month: i32,
    pub rewinds_per_day: i32,
    pub can_see_likes: bool,
    pub ad_free: bool,
    pub priority_support: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserSubscription {
    pub id: i32,
    pub user_id: i32,
    pub plan_id: i32,
    pub status: SubscriptionStatus,
    pub amount_paid_cents: i64,
    pub discount_code_id: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expiry_notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PremiumUsage {
    pub id: i32,
    pub user_id: i32,
    pub usage_type: UsageType,
    pub period_start: NaiveDate,
    pub count: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Mission {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub action_type: String,
    pub target_count: i32,
    pub reward_trukoins: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserMission {
    pub id: i32,
    pub user_id: i32,
    pub mission_id: i32,
    pub current_progress: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub reward_claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Achievement {
    pub id: i32,
    pub key: String,
    pub title: String,
    pub description: Option<String>,
    pub requirement_type: String,
    pub requirement_value: i32,
    pub reward_trukoins: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WalletTransaction {
    pub id: i32,
    pub user_id: i32,
    pub amount: i64,
    pub reason: String,
    pub reference_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DiscountCode {
    pub id: i32,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub min_plan_price_cents: Option<i64>,
    pub applicable_plan_ids: Vec<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FeatureFlag {
    pub feature_key: String,
    pub is_enabled: bool,
    pub requires_api_key: bool,
    pub category: String,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}
