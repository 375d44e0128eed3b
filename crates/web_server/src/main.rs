//! Main entry point for the campground reservation server.
//! This crate wires the reservation engine to the booking API and serves it over REST.

use std::sync::Arc;

use actix_web::{App, HttpResponse, HttpServer, middleware::Logger, web};
use anyhow::Context;

use booking_api::BookingApiClient;
use postgres::database::*;
use reservation_engine::{
    InMemoryPromotionLedger, PgPromotionLedger, PromotionAdmin, PromotionLedger,
    ReservationAssembler,
};
use web_handlers::{AppState, configure_api, create_reservation_stores};

mod config;
use config::ServerConfig;

async fn create_ledger(database_url: Option<&str>) -> anyhow::Result<Arc<dyn PromotionLedger>> {
    let Some(database_url) = database_url else {
        log::warn!("DATABASE_URL not set; promotion redemptions are tracked in memory only");
        return Ok(Arc::new(InMemoryPromotionLedger::new()));
    };

    let pool = create_connection_pool(database_url)
        .await
        .context("Failed to create database pool")?;
    log::info!("Database pool created successfully");

    if let Err(e) = test_connection(&pool).await {
        log::error!("Database connection test failed: {}", e);
    }
    ensure_ledger_schema(&pool)
        .await
        .context("Failed to prepare the promotion ledger schema")?;

    Ok(Arc::new(PgPromotionLedger::new(pool)))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("Starting campground reservation server...");

    let config = ServerConfig::from_env()?;
    log::info!("Booking API: {}", config.booking_api.base_url);

    let booking_api = Arc::new(
        BookingApiClient::new(config.booking_api.clone())
            .context("Failed to create booking API client")?,
    );
    let ledger = create_ledger(config.database_url.as_deref()).await?;

    let state = AppState {
        catalog: booking_api.clone(),
        reservations: booking_api.clone(),
        ledger: ledger.clone(),
        promotion_admin: PromotionAdmin::new(booking_api, ledger),
        assembler: ReservationAssembler::default(),
        stores: create_reservation_stores(),
    };

    log::info!("Server will be available at: http://{}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Logger::default())
            .configure(configure_api)
            .route(
                "/health",
                web::get().to(|| async {
                    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
                }),
            )
    })
    .bind(&config.bind_addr)?
    .run()
    .await?;

    Ok(())
}
