//! Middleware helpers shared by the binary.

use actix_cors::Cors;
use actix_web::middleware::Logger;

// Returns the standard request logger:
// remote-ip "request-line" status-code response-size "referrer" "user-agent"
pub fn standard_middleware() -> Logger {
    Logger::default()
}

// CORS policy for the storefront. The cart and checkout endpoints are
// called from a browser app that may live on a different subdomain.
pub fn cors_policy() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allow_any_header()
        .max_age(3600)
}
