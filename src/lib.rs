pub mod achievements;
pub mod api;
pub mod auctions;
pub mod config;
pub mod db;
pub mod discounts;
pub mod docs;
pub mod error;
pub mod flags;
pub mod jobs;
pub mod mail;
pub mod missions;
pub mod models;
pub mod premium;
pub mod products;
pub mod s3_utils;
pub mod swipes;
pub mod trades;
pub mod wallet;
pub mod ws;

use std::sync::Arc;

use actix::Addr;
use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::config::Config;
use crate::mail::DynMailClient;
use crate::ws::NotificationHub;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub s3_client: S3Client,
    pub mailer: DynMailClient,
    pub hub: Addr<NotificationHub>,
}
