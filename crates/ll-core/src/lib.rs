//! leafline/crates/ll-core/src/lib.rs
//!
//! The central domain logic and interface definitions for Leafline.

pub mod discounts;
pub mod error;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::models::*;

    #[test]
    fn state_code_canonicalizes() {
        let code = StateCode::parse(" ca ").unwrap();
        assert_eq!(code.as_str(), "CA");
        assert!(StateCode::parse("CAL").is_err());
        assert!(StateCode::parse("c1").is_err());
    }

    #[test]
    fn ad_type_round_trips_canonical_strings() {
        for raw in ["single", "quarter", "half", "full"] {
            let parsed: AdType = raw.parse().unwrap();
            assert_eq!(parsed.as_str(), raw);
        }
        assert!("banner".parse::<AdType>().is_err());
    }

    #[test]
    fn empty_cart_is_zero_valued() {
        let cart = Cart::empty(uuid::Uuid::new_v4());
        assert_eq!(cart.subtotal_cents, 0);
        assert_eq!(cart.item_count, 0);
        assert!(cart.items.is_empty());
    }
}
