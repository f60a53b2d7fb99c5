//! # Cart Service
//!
//! Per-user line items, each backed 1:1 by a live reservation. Adding an item
//! claims inventory through the ledger; removal and clearing release claims
//! best-effort, since a failed cleanup must never trap an item in the cart.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future;
use uuid::Uuid;

use ll_core::discounts;
use ll_core::error::{AppError, Result};
use ll_core::models::{AdType, Cart, CartItem, StateCode};
use ll_core::traits::{CartStore, InventoryStore};

use crate::reservations::ReservationLedger;

#[derive(Clone)]
pub struct CartService {
    carts: Arc<dyn CartStore>,
    inventory: Arc<dyn InventoryStore>,
    ledger: ReservationLedger,
}

impl CartService {
    pub fn new(
        carts: Arc<dyn CartStore>,
        inventory: Arc<dyn InventoryStore>,
        ledger: ReservationLedger,
    ) -> Self {
        Self {
            carts,
            inventory,
            ledger,
        }
    }

    /// Reserves inventory and appends a line item with a price snapshot.
    /// `OutOfStock` from the ledger propagates untouched.
    pub async fn add_item(
        &self,
        user_id: Uuid,
        state: &StateCode,
        ad_type: AdType,
        quantity: i64,
    ) -> Result<CartItem> {
        let unit = self
            .inventory
            .get_unit(state, ad_type)
            .await?
            .filter(|u| u.active)
            .ok_or_else(|| {
                AppError::NotFound("inventory unit".into(), format!("{state}/{ad_type}"))
            })?;

        let reservation = self.ledger.create(user_id, state, ad_type, quantity).await?;

        let item = CartItem {
            item_id: Uuid::new_v4(),
            user_id,
            reservation_id: reservation.id,
            state_code: state.clone(),
            ad_type,
            quantity,
            unit_price_cents: unit.price_cents,
            added_at: Utc::now(),
        };

        if let Err(err) = self.carts.append(item.clone()).await {
            // The claim exists but the line item never landed; give it back.
            if let Err(release_err) = self.ledger.release(reservation.id).await {
                log::error!(
                    "cart append failed and releasing reservation {} also failed: {release_err}",
                    reservation.id
                );
            }
            return Err(err);
        }

        Ok(item)
    }

    /// Removes one line item. Its reservation release is at-least-try: a
    /// failure is logged but the item leaves the cart regardless (the expiry
    /// sweep picks up anything left behind).
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<()> {
        let removed = self
            .carts
            .remove(user_id, item_id)
            .await?
            .ok_or_else(|| AppError::NotFound("cart item".into(), item_id.to_string()))?;

        if let Err(err) = self.ledger.release(removed.reservation_id).await {
            log::warn!(
                "failed to release reservation {} while removing cart item {item_id}: {err}",
                removed.reservation_id
            );
        }
        Ok(())
    }

    /// Empties the cart, releasing every reservation in parallel and
    /// collecting failures without aborting. Returns how many items left.
    pub async fn clear(&self, user_id: Uuid) -> Result<usize> {
        let items = self.carts.drain(user_id).await?;

        let releases = items
            .iter()
            .map(|item| self.ledger.release(item.reservation_id));
        for (item, result) in items.iter().zip(future::join_all(releases).await) {
            if let Err(err) = result {
                log::warn!(
                    "failed to release reservation {} while clearing cart of {user_id}: {err}",
                    item.reservation_id
                );
            }
        }

        Ok(items.len())
    }

    /// The cart with totals recomputed from live items. A user with no cart
    /// gets a zero-valued empty cart, not an error.
    pub async fn get_with_totals(&self, user_id: Uuid) -> Result<Cart> {
        let items = self.carts.list(user_id).await?;
        let subtotal_cents = discounts::subtotal(&items);
        let item_count = items.iter().map(|i| i.quantity).sum();
        Ok(Cart {
            user_id,
            items,
            subtotal_cents,
            item_count,
        })
    }

    /// Removes one line item *without* touching its reservation. Used by
    /// the finalizer after it has consumed the item's claim.
    pub async fn take_item(&self, user_id: Uuid, item_id: Uuid) -> Result<Option<CartItem>> {
        self.carts.remove(user_id, item_id).await
    }
}
