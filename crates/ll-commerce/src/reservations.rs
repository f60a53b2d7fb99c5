//! # Reservation Ledger
//!
//! Time-boxed claims on ad inventory. Creating a reservation decrements the
//! inventory counter first, so a successful create *is* the hold; releasing
//! credits it back exactly once through a status-guarded transition, and
//! consuming finalizes ownership without touching inventory again.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use ll_core::error::{AppError, Result};
use ll_core::models::{AdType, Reservation, ReservationStatus, StateCode};
use ll_core::traits::{InventoryStore, ReservationStore};

#[derive(Clone)]
pub struct ReservationLedger {
    inventory: Arc<dyn InventoryStore>,
    reservations: Arc<dyn ReservationStore>,
    ttl: Duration,
}

impl ReservationLedger {
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        reservations: Arc<dyn ReservationStore>,
        ttl_seconds: i64,
    ) -> Self {
        Self {
            inventory,
            reservations,
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Claims `quantity` slots for `user_id`. The inventory decrement runs
    /// first; when it fails with `OutOfStock` no reservation row exists and
    /// the error propagates untouched.
    pub async fn create(
        &self,
        user_id: Uuid,
        state: &StateCode,
        ad_type: AdType,
        quantity: i64,
    ) -> Result<Reservation> {
        if quantity <= 0 {
            return Err(AppError::Validation(format!(
                "reservation quantity must be positive, got {quantity}"
            )));
        }

        self.inventory.decrement(state, ad_type, quantity).await?;

        let now = Utc::now();
        let reservation = Reservation {
            id: Uuid::new_v4(),
            user_id,
            state_code: state.clone(),
            ad_type,
            quantity,
            created_at: now,
            expires_at: now + self.ttl,
            status: ReservationStatus::Active,
        };

        if let Err(err) = self.reservations.insert_reservation(reservation.clone()).await {
            // The hold was taken but the row never landed; credit it back so
            // the slot is not stranded.
            if let Err(credit_err) = self.inventory.increment(state, ad_type, quantity).await {
                log::error!(
                    "reservation insert failed and inventory credit-back for {state}/{ad_type} x{quantity} also failed: {credit_err}"
                );
            }
            return Err(err);
        }

        Ok(reservation)
    }

    /// Releases a reservation, crediting inventory exactly once. Idempotent:
    /// an already-released, consumed, or unknown reservation is a no-op.
    pub async fn release(&self, id: Uuid) -> Result<()> {
        let Some(reservation) = self.reservations.get_reservation(id).await? else {
            return Ok(());
        };

        let landed = self
            .reservations
            .transition(id, ReservationStatus::Active, ReservationStatus::Released)
            .await?;
        if !landed {
            // Someone else released or consumed it first; nothing to credit.
            return Ok(());
        }

        self.inventory
            .increment(
                &reservation.state_code,
                reservation.ad_type,
                reservation.quantity,
            )
            .await
            .map_err(|err| {
                log::error!(
                    "reservation {id} marked released but inventory credit failed: {err}"
                );
                err
            })
    }

    /// Transitions active → consumed at order time. Inventory was already
    /// decremented at creation, so this only finalizes ownership. Fails with
    /// `InvalidState` when the reservation is not currently active.
    pub async fn consume(&self, id: Uuid) -> Result<()> {
        let landed = self
            .reservations
            .transition(id, ReservationStatus::Active, ReservationStatus::Consumed)
            .await?;
        if landed {
            Ok(())
        } else {
            Err(AppError::InvalidState(id))
        }
    }

    /// Releases every active reservation whose expiry is in the past and
    /// returns how many were released. One failure never blocks the rest;
    /// a reservation whose release failed is still active and will be picked
    /// up by the next sweep.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired = self.reservations.list_expired(now).await?;
        let mut released = 0usize;

        for reservation in expired {
            match self.release(reservation.id).await {
                Ok(()) => released += 1,
                Err(err) => {
                    log::warn!(
                        "sweep: failed to release expired reservation {}: {err}",
                        reservation.id
                    );
                }
            }
        }

        Ok(released)
    }
}
