// src/main.rs
use std::sync::Arc;

use actix::Actor;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::Client as S3Client;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use trueke::config::Config;
use trueke::ws::{self, NotificationHub};
use trueke::{api, docs, jobs, mail, AppState};

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Trueke API ready")
}

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    log::error!("{context}: {e}");
    std::io::Error::other(format!("{context}: {e}"))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| startup_error("invalid configuration", e))?;

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .map_err(|e| startup_error("failed to connect to DB", e))?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(|e| startup_error("failed to run migrations", e))?;

    let region_provider = RegionProviderChain::default_provider().or_else("us-east-1");
    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await;
    let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

    // S3-compatible endpoints (MinIO and friends) need path-style addressing.
    if let Some(endpoint) = &config.s3_endpoint {
        s3_config_builder = s3_config_builder
            .endpoint_url(endpoint)
            .force_path_style(true);
    }
    let s3_client = S3Client::from_conf(s3_config_builder.build());

    let mailer = mail::create_mail_client(&config.mail)
        .map_err(|e| startup_error("failed to configure mail", e))?;
    log::info!("mail provider: {}", mailer.provider());

    let hub = NotificationHub::new().start();
    let bind = (config.host.clone(), config.port);

    let app_state = AppState {
        pool,
        config: Arc::new(config),
        s3_client,
        mailer,
        hub,
    };

    jobs::start_scheduled_jobs(app_state.clone());

    let state = web::Data::new(app_state);
    log::info!("listening on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            .service(api::auth::register)
            .service(api::auth::login)
            .route("/ws", web::get().to(ws::notifications_ws))
            .service(api::jobs::product_expiry)
            .service(api::jobs::subscription_expiry)
            .service(api::jobs::close_auctions)
            .service(
                web::scope("/api")
                    .wrap(api::auth::JwtMiddleware)
                    .configure(api::protected_routes),
            )
    })
    .bind(bind)?
    .run()
    .await
}
