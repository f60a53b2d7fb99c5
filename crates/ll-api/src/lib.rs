//! # ll-api
//!
//! The web routing and orchestration layer for Leafline.

pub mod admin;
pub mod error;
pub mod handlers;
pub mod middleware;

pub use error::{ApiError, ApiResult};
pub use handlers::AppState;

use actix_web::web;

/// Configures the routes for the commerce API.
///
/// # Developer Note
/// We use a scoped configuration to allow the main binary to mount
/// the API under different paths if needed (e.g., /api/v1/).
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // Storefront
            .route("/inventory/{state}", web::get().to(handlers::list_inventory))
            // Cart
            .route("/cart", web::get().to(handlers::get_cart))
            .route("/cart", web::post().to(handlers::add_cart_item))
            .route("/cart", web::delete().to(handlers::clear_cart))
            .route("/cart/migrate", web::post().to(handlers::migrate_cart))
            .route("/cart/{item_id}", web::delete().to(handlers::remove_cart_item))
            // Checkout
            .route("/checkout/apply-discount", web::post().to(handlers::apply_discount))
            .route("/checkout", web::post().to(handlers::start_checkout))
            // Payment processor callback
            .route("/webhooks/payment", web::post().to(handlers::payment_webhook))
            // Creative uploads for purchased slots
            .route(
                "/orders/{order_id}/items/{item_id}/slots/{slot}",
                web::post().to(handlers::upload_creative),
            )
            // Admin
            .route("/update-inventory", web::post().to(admin::update_inventory))
            .route("/admin/discount-codes", web::get().to(admin::list_codes))
            .route("/admin/discount-codes", web::post().to(admin::create_code))
            .route("/admin/discount-codes/{code}", web::put().to(admin::update_code))
            .route("/admin/discount-codes/{code}", web::delete().to(admin::delete_code))
            .route("/admin/bundle-deals", web::get().to(admin::list_deals))
            .route("/admin/bundle-deals", web::post().to(admin::create_deal))
            .route("/admin/bundle-deals/{id}", web::delete().to(admin::delete_deal))
            .route("/admin/sweep-reservations", web::post().to(admin::sweep_reservations))
            .route("/admin/orders/{order_id}", web::get().to(admin::get_order)),
    );
}
