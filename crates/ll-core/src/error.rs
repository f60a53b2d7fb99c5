//! # AppError
//!
//! Centralized error handling for the Leafline ecosystem.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;
use uuid::Uuid;

/// The primary error type for all ll-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Conditional inventory decrement failed its availability check.
    /// User-facing; retryable by reducing quantity.
    #[error("out of stock: {state}/{ad_type} (requested {requested})")]
    OutOfStock {
        state: String,
        ad_type: String,
        requested: i64,
    },

    /// A reservation transition was attempted from a non-matching status.
    /// Indicates a race or a bug; loggable, never retried blindly.
    #[error("reservation {0} is not in the required state")]
    InvalidState(Uuid),

    /// Resource not found (e.g., InventoryUnit, Order, CartItem)
    #[error("{0} not found: {1}")]
    NotFound(String, String),

    /// No discount code exists under the normalized key.
    #[error("discount code not found: {0}")]
    CodeNotFound(String),

    /// The code exists but has been deactivated.
    #[error("discount code is inactive: {0}")]
    CodeInactive(String),

    /// The code's expiry timestamp has passed.
    #[error("discount code has expired: {0}")]
    CodeExpired(String),

    /// Order subtotal does not meet the code's minimum.
    #[error("subtotal {subtotal_cents} is below the code minimum {min_order_cents}")]
    BelowMinimum {
        min_order_cents: i64,
        subtotal_cents: i64,
    },

    /// The code's usage cap has been reached.
    #[error("discount code has no uses left: {0}")]
    UsesExceeded(String),

    /// Validation failure (e.g., bad state code, zero quantity)
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or unresolvable identity, or a bad admin key.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Underlying document/object store request failed.
    /// Surfaced as a generic 500; safe to retry with backoff at the caller.
    #[error("store error: {0}")]
    Store(String),

    /// Payment provider rejected the request.
    #[error("payment provider error: {0}")]
    Payment(String),
}

/// A specialized Result type for Leafline logic.
pub type Result<T> = std::result::Result<T, AppError>;
