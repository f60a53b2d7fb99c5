//! # Domain Models
//!
//! These structs represent the core entities of Leafline: ad-slot inventory,
//! time-boxed reservations, carts, discounts, and finalized orders.
//! All money amounts are integer minor-currency units (cents).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Two-letter upper-case US state abbreviation, used as a partition key
/// throughout the store. Always canonicalized on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StateCode(String);

impl StateCode {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        if trimmed.len() != 2 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AppError::Validation(format!(
                "invalid state code: {raw:?}"
            )));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StateCode {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StateCode> for String {
    fn from(value: StateCode) -> Self {
        value.0
    }
}

/// Directory listing size. The canonical wire strings are the lowercase
/// variant names; the payment processor metadata uses the same set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdType {
    Single,
    Quarter,
    Half,
    Full,
}

impl AdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdType::Single => "single",
            AdType::Quarter => "quarter",
            AdType::Half => "half",
            AdType::Full => "full",
        }
    }
}

impl fmt::Display for AdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(AdType::Single),
            "quarter" => Ok(AdType::Quarter),
            "half" => Ok(AdType::Half),
            "full" => Ok(AdType::Full),
            other => Err(AppError::Validation(format!("invalid ad type: {other:?}"))),
        }
    }
}

/// Persisted slot counters for one (state, ad type) pair.
///
/// Invariant: `0 <= remaining_slots <= total_slots` at all times. The store
/// enforces this through conditional decrement/increment; nothing else may
/// write these counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryUnit {
    pub state_code: StateCode,
    pub ad_type: AdType,
    pub title: String,
    pub price_cents: i64,
    pub total_slots: i64,
    pub remaining_slots: i64,
    pub active: bool,
    /// JSON description of the creative fields required per purchased slot.
    #[serde(default)]
    pub upload_schema: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Released,
    Consumed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Released => "released",
            ReservationStatus::Consumed => "consumed",
        }
    }
}

impl FromStr for ReservationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ReservationStatus::Active),
            "released" => Ok(ReservationStatus::Released),
            "consumed" => Ok(ReservationStatus::Consumed),
            other => Err(AppError::Validation(format!(
                "invalid reservation status: {other:?}"
            ))),
        }
    }
}

/// A time-boxed claim on ad inventory, owned by exactly one CartItem while
/// active. Inventory was decremented when the reservation was created; a
/// released reservation credits it back exactly once, a consumed one never
/// touches it again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub state_code: StateCode,
    pub ad_type: AdType,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ReservationStatus,
}

/// One line in a user's cart, referencing its backing reservation 1:1.
/// `unit_price_cents` is a snapshot taken when the item was added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub item_id: Uuid,
    pub user_id: Uuid,
    pub reservation_id: Uuid,
    pub state_code: StateCode,
    pub ad_type: AdType,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub added_at: DateTime<Utc>,
}

/// The cart as returned to callers, with totals recomputed from live items.
#[derive(Debug, Clone, Serialize)]
pub struct Cart {
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub subtotal_cents: i64,
    pub item_count: i64,
}

impl Cart {
    /// A zero-valued cart; returned instead of an error when nothing exists.
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            items: Vec::new(),
            subtotal_cents: 0,
            item_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeKind {
    Percent,
    Fixed,
}

/// A user-entered discount code. The `code` field holds the normalized
/// (upper-case) form; lookups must normalize first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountCode {
    pub code: String,
    pub kind: CodeKind,
    /// Whole percent for `Percent`, cents for `Fixed`.
    pub value: i64,
    pub min_order_cents: i64,
    pub max_uses: Option<i64>,
    pub current_uses: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

/// An automatic quantity-threshold discount on one ad type. Needs no code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleDeal {
    pub id: Uuid,
    pub ad_type: AdType,
    pub min_quantity: i64,
    pub discount_percent: i64,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    None,
    Bundle,
    Code,
}

/// Outcome of discount evaluation: which rule won and for how much.
#[derive(Debug, Clone, Serialize)]
pub struct DiscountResult {
    pub kind: DiscountKind,
    pub amount_cents: i64,
    pub code: Option<String>,
    pub deal_id: Option<Uuid>,
}

impl DiscountResult {
    pub fn none() -> Self {
        Self {
            kind: DiscountKind::None,
            amount_cents: 0,
            code: None,
            deal_id: None,
        }
    }
}

/// Item snapshot carried on a finalized order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub item_id: Uuid,
    pub reservation_id: Uuid,
    pub state_code: StateCode,
    pub ad_type: AdType,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// A finalized purchase. `order_id` is the payment intent id. Immutable after
/// creation except for the per-item upload-status map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub user_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub items: Vec<OrderItem>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub discount_kind: DiscountKind,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
    /// Map of item id → creative upload progress, mutated as files land.
    pub upload_status: serde_json::Value,
    /// Set when one or more reservations could not be consumed at finalize
    /// time; such orders are surfaced for manual reconciliation.
    pub needs_reconciliation: bool,
}

/// Customer contact fields captured at checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
}

/// Handle returned by the payment provider when an intent is opened.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
}
