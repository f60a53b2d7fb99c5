//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary. All
//! conditional semantics (oversell prevention, at-most-once reservation
//! transitions) live behind these seams; callers never read-modify-write.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AdType, BundleDeal, CartItem, DiscountCode, InventoryUnit, Order, PaymentIntent, Reservation,
    ReservationStatus, StateCode,
};

/// Slot-counter persistence for ad inventory.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_unit(&self, state: &StateCode, ad_type: AdType) -> Result<Option<InventoryUnit>>;
    async fn get_by_state(&self, state: &StateCode) -> Result<Vec<InventoryUnit>>;

    /// Atomically checks and decrements `remaining_slots`. Fails with
    /// `OutOfStock` when fewer than `amount` slots remain. Must be a single
    /// conditional store operation, never a read followed by a write.
    async fn decrement(
        &self,
        state: &StateCode,
        ad_type: AdType,
        amount: i64,
    ) -> Result<InventoryUnit>;

    /// Credits slots back, capped so `remaining_slots` never exceeds
    /// `total_slots`. Always succeeds for an existing unit.
    async fn increment(&self, state: &StateCode, ad_type: AdType, amount: i64) -> Result<()>;

    /// Admin provisioning; creates or replaces a unit.
    async fn upsert(&self, unit: InventoryUnit) -> Result<()>;
}

/// Reservation row persistence. Status transitions are conditional writes.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn insert_reservation(&self, reservation: Reservation) -> Result<()>;
    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>>;

    /// Moves `id` from `from` to `to` iff it is currently in `from`.
    /// Returns `Ok(true)` when this call performed the transition and
    /// `Ok(false)` when the guard did not match (already transitioned or
    /// missing). Racing callers are resolved by whichever lands first.
    async fn transition(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<bool>;

    /// Active reservations whose `expires_at` is strictly before `now`.
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>>;
}

/// Per-user ordered cart persistence.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn append(&self, item: CartItem) -> Result<()>;
    async fn get_item(&self, user_id: Uuid, item_id: Uuid) -> Result<Option<CartItem>>;
    async fn list(&self, user_id: Uuid) -> Result<Vec<CartItem>>;

    /// Removes one item, returning it if it existed.
    async fn remove(&self, user_id: Uuid, item_id: Uuid) -> Result<Option<CartItem>>;

    /// Empties the cart, returning the items that were in it.
    async fn drain(&self, user_id: Uuid) -> Result<Vec<CartItem>>;
}

/// Discount code and bundle deal persistence.
#[async_trait]
pub trait DiscountStore: Send + Sync {
    /// Lookup by normalized (upper-case) code.
    async fn get_code(&self, code: &str) -> Result<Option<DiscountCode>>;
    async fn list_codes(&self) -> Result<Vec<DiscountCode>>;
    async fn put_code(&self, code: DiscountCode) -> Result<()>;
    async fn delete_code(&self, code: &str) -> Result<bool>;

    /// Conditionally bumps `current_uses`, guarded by `max_uses`. Returns
    /// `Ok(false)` when the cap was already reached.
    async fn record_code_use(&self, code: &str) -> Result<bool>;

    async fn list_deals(&self) -> Result<Vec<BundleDeal>>;
    async fn put_deal(&self, deal: BundleDeal) -> Result<()>;
    async fn delete_deal(&self, id: Uuid) -> Result<bool>;
}

/// Finalized order persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: Order) -> Result<()>;
    async fn get_order(&self, order_id: &str) -> Result<Option<Order>>;

    /// Records one uploaded creative file under the order's upload-status map.
    async fn set_upload_status(
        &self,
        order_id: &str,
        item_id: Uuid,
        slot: u32,
        field: &str,
        url: &str,
    ) -> Result<()>;
}

/// Payment processor boundary. Amounts are integer minor-currency units;
/// metadata values must already be canonical (upper-case state codes, the
/// fixed ad-type strings) since the finalizer reads them back verbatim.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<PaymentIntent>;
}

/// Object-store boundary for uploaded creative files. Implementations key
/// files as `submissions/{order_id}/{item_id}/slot-{n}/{field}_{filename}`
/// and return a permanent URL.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn store(
        &self,
        order_id: &str,
        item_id: Uuid,
        slot: u32,
        field: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<String>;
}

/// Identity-provider boundary. Token issuance lives outside this system;
/// we only verify what the provider hands the client.
pub trait IdentityProvider: Send + Sync {
    /// Resolves a bearer token to an opaque user id, or `None` for "guest".
    fn resolve_user(&self, bearer: &str) -> Option<Uuid>;

    /// Verifies the shared admin key against its stored hash.
    fn verify_admin_key(&self, key: &str) -> bool;
}
