//! leafline/crates/ll-commerce/src/lib.rs
//!
//! The commerce services of Leafline, written against the `ll-core` ports:
//! the reservation ledger, the cart service, and the checkout finalizer.
//! All shared mutable state lives behind the store traits; these services
//! only sequence conditional store operations.

pub mod cart;
pub mod checkout;
pub mod reservations;

pub use cart::CartService;
pub use checkout::{CheckoutQuote, CheckoutService};
pub use reservations::ReservationLedger;

#[cfg(test)]
pub(crate) mod memstores;
