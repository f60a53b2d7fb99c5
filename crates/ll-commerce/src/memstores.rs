//! In-memory store implementations for service tests. Mutex-guarded maps
//! stand in for the document store; the conditional semantics (guarded
//! decrement, status-guarded transitions) match what the SQLite plugin does
//! with single-statement updates.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use ll_core::error::{AppError, Result};
use ll_core::models::{
    AdType, BundleDeal, CartItem, DiscountCode, InventoryUnit, Order, PaymentIntent, Reservation,
    ReservationStatus, StateCode,
};
use ll_core::traits::{
    CartStore, DiscountStore, InventoryStore, OrderStore, PaymentProvider, ReservationStore,
};

#[derive(Default)]
pub struct MemInventory {
    units: Mutex<HashMap<(StateCode, AdType), InventoryUnit>>,
}

impl MemInventory {
    pub fn with_unit(state: StateCode, ad_type: AdType, slots: i64, price_cents: i64) -> Self {
        let store = Self::default();
        store.units.lock().unwrap().insert(
            (state.clone(), ad_type),
            InventoryUnit {
                state_code: state,
                ad_type,
                title: format!("{ad_type} listing"),
                price_cents,
                total_slots: slots,
                remaining_slots: slots,
                active: true,
                upload_schema: serde_json::json!({}),
            },
        );
        store
    }

    pub fn remaining(&self, state: &StateCode, ad_type: AdType) -> i64 {
        self.units.lock().unwrap()[&(state.clone(), ad_type)].remaining_slots
    }
}

#[async_trait]
impl InventoryStore for MemInventory {
    async fn get_unit(&self, state: &StateCode, ad_type: AdType) -> Result<Option<InventoryUnit>> {
        Ok(self
            .units
            .lock()
            .unwrap()
            .get(&(state.clone(), ad_type))
            .cloned())
    }

    async fn get_by_state(&self, state: &StateCode) -> Result<Vec<InventoryUnit>> {
        Ok(self
            .units
            .lock()
            .unwrap()
            .values()
            .filter(|u| &u.state_code == state)
            .cloned()
            .collect())
    }

    async fn decrement(
        &self,
        state: &StateCode,
        ad_type: AdType,
        amount: i64,
    ) -> Result<InventoryUnit> {
        let mut units = self.units.lock().unwrap();
        let unit = units
            .get_mut(&(state.clone(), ad_type))
            .filter(|u| u.active)
            .ok_or_else(|| {
                AppError::NotFound("inventory unit".into(), format!("{state}/{ad_type}"))
            })?;
        if unit.remaining_slots < amount {
            return Err(AppError::OutOfStock {
                state: state.to_string(),
                ad_type: ad_type.to_string(),
                requested: amount,
            });
        }
        unit.remaining_slots -= amount;
        Ok(unit.clone())
    }

    async fn increment(&self, state: &StateCode, ad_type: AdType, amount: i64) -> Result<()> {
        let mut units = self.units.lock().unwrap();
        let unit = units.get_mut(&(state.clone(), ad_type)).ok_or_else(|| {
            AppError::NotFound("inventory unit".into(), format!("{state}/{ad_type}"))
        })?;
        unit.remaining_slots = (unit.remaining_slots + amount).min(unit.total_slots);
        Ok(())
    }

    async fn upsert(&self, unit: InventoryUnit) -> Result<()> {
        self.units
            .lock()
            .unwrap()
            .insert((unit.state_code.clone(), unit.ad_type), unit);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemReservations {
    rows: Mutex<HashMap<Uuid, Reservation>>,
}

impl MemReservations {
    pub fn status(&self, id: Uuid) -> Option<ReservationStatus> {
        self.rows.lock().unwrap().get(&id).map(|r| r.status)
    }

    pub fn backdate(&self, id: Uuid, expires_at: DateTime<Utc>) {
        if let Some(row) = self.rows.lock().unwrap().get_mut(&id) {
            row.expires_at = expires_at;
        }
    }
}

#[async_trait]
impl ReservationStore for MemReservations {
    async fn insert_reservation(&self, reservation: Reservation) -> Result<()> {
        self.rows.lock().unwrap().insert(reservation.id, reservation);
        Ok(())
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(row) if row.status == from => {
                row.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status == ReservationStatus::Active && r.expires_at < now)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemCarts {
    items: Mutex<Vec<CartItem>>,
}

#[async_trait]
impl CartStore for MemCarts {
    async fn append(&self, item: CartItem) -> Result<()> {
        self.items.lock().unwrap().push(item);
        Ok(())
    }

    async fn get_item(&self, user_id: Uuid, item_id: Uuid) -> Result<Option<CartItem>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.user_id == user_id && i.item_id == item_id)
            .cloned())
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<CartItem>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn remove(&self, user_id: Uuid, item_id: Uuid) -> Result<Option<CartItem>> {
        let mut items = self.items.lock().unwrap();
        let pos = items
            .iter()
            .position(|i| i.user_id == user_id && i.item_id == item_id);
        Ok(pos.map(|p| items.remove(p)))
    }

    async fn drain(&self, user_id: Uuid) -> Result<Vec<CartItem>> {
        let mut items = self.items.lock().unwrap();
        let (mine, rest): (Vec<_>, Vec<_>) =
            items.drain(..).partition(|i| i.user_id == user_id);
        *items = rest;
        Ok(mine)
    }
}

#[derive(Default)]
pub struct MemDiscounts {
    codes: Mutex<HashMap<String, DiscountCode>>,
    deals: Mutex<Vec<BundleDeal>>,
}

impl MemDiscounts {
    pub fn add_deal(&self, deal: BundleDeal) {
        self.deals.lock().unwrap().push(deal);
    }

    pub fn uses(&self, code: &str) -> i64 {
        self.codes.lock().unwrap()[code].current_uses
    }
}

#[async_trait]
impl DiscountStore for MemDiscounts {
    async fn get_code(&self, code: &str) -> Result<Option<DiscountCode>> {
        Ok(self.codes.lock().unwrap().get(code).cloned())
    }

    async fn list_codes(&self) -> Result<Vec<DiscountCode>> {
        Ok(self.codes.lock().unwrap().values().cloned().collect())
    }

    async fn put_code(&self, code: DiscountCode) -> Result<()> {
        self.codes.lock().unwrap().insert(code.code.clone(), code);
        Ok(())
    }

    async fn delete_code(&self, code: &str) -> Result<bool> {
        Ok(self.codes.lock().unwrap().remove(code).is_some())
    }

    async fn record_code_use(&self, code: &str) -> Result<bool> {
        let mut codes = self.codes.lock().unwrap();
        let Some(row) = codes.get_mut(code) else {
            return Ok(false);
        };
        if row.max_uses.is_some_and(|max| row.current_uses >= max) {
            return Ok(false);
        }
        row.current_uses += 1;
        Ok(true)
    }

    async fn list_deals(&self) -> Result<Vec<BundleDeal>> {
        Ok(self.deals.lock().unwrap().clone())
    }

    async fn put_deal(&self, deal: BundleDeal) -> Result<()> {
        self.deals.lock().unwrap().push(deal);
        Ok(())
    }

    async fn delete_deal(&self, id: Uuid) -> Result<bool> {
        let mut deals = self.deals.lock().unwrap();
        let before = deals.len();
        deals.retain(|d| d.id != id);
        Ok(deals.len() < before)
    }
}

#[derive(Default)]
pub struct MemOrders {
    rows: Mutex<HashMap<String, Order>>,
}

#[async_trait]
impl OrderStore for MemOrders {
    async fn insert_order(&self, order: Order) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(order.order_id.clone(), order);
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.rows.lock().unwrap().get(order_id).cloned())
    }

    async fn set_upload_status(
        &self,
        order_id: &str,
        item_id: Uuid,
        slot: u32,
        field: &str,
        url: &str,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let order = rows
            .get_mut(order_id)
            .ok_or_else(|| AppError::NotFound("order".into(), order_id.to_string()))?;
        // Item slots start out as the string "pending"; the first upload
        // replaces that marker with a slot map.
        let item_entry = &mut order.upload_status[item_id.to_string()];
        if !item_entry.is_object() {
            *item_entry = serde_json::json!({});
        }
        item_entry[format!("slot-{slot}")][field] = serde_json::Value::String(url.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemPayments;

#[async_trait]
impl PaymentProvider for MemPayments {
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        _metadata: HashMap<String, String>,
    ) -> Result<PaymentIntent> {
        Ok(PaymentIntent {
            id: format!("pi_{}", Uuid::new_v4().simple()),
            client_secret: Some("secret_test".into()),
            amount_cents,
            currency: currency.to_string(),
        })
    }
}
