//! # Leafline Binary
//!
//! The entry point that assembles the application based on compile-time features.

mod config;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use ll_api::handlers::AppState;
use ll_commerce::{CartService, CheckoutService, ReservationLedger};

use config::AppConfig;

// Feature-gated imports: each plugin can be swapped at compile time
#[cfg(feature = "db-sqlite")]
use ll_db_sqlite::SqliteStore;

#[cfg(feature = "storage-local")]
use ll_storage_local::LocalSubmissionStore;

#[cfg(feature = "payment-mock")]
use ll_payment_mock::MockPaymentProvider;

#[cfg(feature = "auth-simple")]
use ll_auth_simple::SimpleIdentityProvider;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cfg = AppConfig::from_env()?;

    // 1. Database implementation (backs every store port)
    #[cfg(feature = "db-sqlite")]
    let db = Arc::new(SqliteStore::new(&cfg.database_url).await?);

    // 2. Creative-file submission storage
    #[cfg(feature = "storage-local")]
    let submissions = Arc::new(LocalSubmissionStore::new(
        cfg.upload_root.clone().into(),
        cfg.upload_url_prefix.clone(),
    ));

    // 3. Payment provider
    #[cfg(feature = "payment-mock")]
    let payments = Arc::new(MockPaymentProvider::new(&cfg.payment_account_id));

    // 4. Identity provider
    #[cfg(feature = "auth-simple")]
    let identity = Arc::new(SimpleIdentityProvider::new(
        &cfg.session_salt,
        &cfg.admin_key_hash,
    ));

    // 5. Commerce services wired over the ports (dynamic dispatch throughout)
    let ledger = ReservationLedger::new(db.clone(), db.clone(), cfg.reservation_ttl_secs);
    let cart = CartService::new(db.clone(), db.clone(), ledger.clone());
    let checkout = CheckoutService::new(
        cart.clone(),
        ledger.clone(),
        db.clone(),
        db.clone(),
        payments,
        cfg.tax_rate_bp,
    );

    let state = web::Data::new(AppState {
        inventory: db.clone(),
        discounts: db.clone(),
        orders: db.clone(),
        submissions,
        identity,
        cart,
        checkout,
        ledger,
    });

    log::info!("🚀 Leafline starting on http://{}", cfg.bind_addr);

    let bind_addr = cfg.bind_addr.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(ll_api::middleware::standard_middleware())
            .wrap(ll_api::middleware::cors_policy())
            .configure(ll_api::configure_routes)
    })
    .bind(bind_addr)?
    .run()
    .await?;

    Ok(())
}
