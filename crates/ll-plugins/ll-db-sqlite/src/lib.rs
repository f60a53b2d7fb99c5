//! # ll-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational
//! model and the `ll-core` domain models. Every correctness-critical
//! mutation (inventory counters, reservation status, code usage) is a single
//! conditional UPDATE whose `rows_affected` tells whether the guarded write
//! landed, so concurrent requests can never oversell or double-credit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use ll_core::error::{AppError, Result};
use ll_core::models::{
    AdType, BundleDeal, CartItem, CodeKind, DiscountCode, DiscountKind, InventoryUnit, Order,
    Reservation, ReservationStatus, StateCode,
};
use ll_core::traits::{CartStore, DiscountStore, InventoryStore, OrderStore, ReservationStore};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS inventory (
        state_code TEXT NOT NULL,
        ad_type TEXT NOT NULL,
        title TEXT NOT NULL,
        price_cents INTEGER NOT NULL,
        total_slots INTEGER NOT NULL,
        remaining_slots INTEGER NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        upload_schema TEXT NOT NULL DEFAULT '{}',
        PRIMARY KEY (state_code, ad_type)
    )",
    "CREATE TABLE IF NOT EXISTS reservations (
        id BLOB PRIMARY KEY,
        user_id BLOB NOT NULL,
        state_code TEXT NOT NULL,
        ad_type TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        status TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_reservations_sweep
        ON reservations (status, expires_at)",
    "CREATE TABLE IF NOT EXISTS cart_items (
        item_id BLOB PRIMARY KEY,
        user_id BLOB NOT NULL,
        reservation_id BLOB NOT NULL,
        state_code TEXT NOT NULL,
        ad_type TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        unit_price_cents INTEGER NOT NULL,
        added_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_cart_items_user
        ON cart_items (user_id, added_at)",
    "CREATE TABLE IF NOT EXISTS discount_codes (
        code TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        value INTEGER NOT NULL,
        min_order_cents INTEGER NOT NULL DEFAULT 0,
        max_uses INTEGER,
        current_uses INTEGER NOT NULL DEFAULT 0,
        expires_at TEXT,
        active INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS bundle_deals (
        id BLOB PRIMARY KEY,
        ad_type TEXT NOT NULL,
        min_quantity INTEGER NOT NULL,
        discount_percent INTEGER NOT NULL,
        active INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        order_id TEXT PRIMARY KEY,
        user_id BLOB NOT NULL,
        customer_name TEXT NOT NULL,
        customer_email TEXT NOT NULL,
        items TEXT NOT NULL,
        subtotal_cents INTEGER NOT NULL,
        discount_cents INTEGER NOT NULL,
        discount_kind TEXT NOT NULL,
        tax_cents INTEGER NOT NULL,
        total_cents INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        upload_status TEXT NOT NULL DEFAULT '{}',
        needs_reconciliation INTEGER NOT NULL DEFAULT 0
    )",
];

pub struct SqliteStore {
    pool: SqlitePool,
}

// Helpers for UUID conversion
fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

fn blob_to_uuid(blob: &[u8]) -> Uuid {
    Uuid::from_slice(blob).unwrap_or_default()
}

fn store_err(err: sqlx::Error) -> AppError {
    AppError::Store(err.to_string())
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let options = SqlitePoolOptions::new().max_connections(5);
        // An in-memory database lives inside its connection; pin the pool to
        // a single long-lived one so the schema survives.
        let options = if database_url.contains(":memory:") {
            options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options
        };

        let pool = options.connect(database_url).await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }
}

fn row_to_unit(row: &SqliteRow) -> Result<InventoryUnit> {
    Ok(InventoryUnit {
        state_code: StateCode::parse(&row.get::<String, _>("state_code"))?,
        ad_type: row.get::<String, _>("ad_type").parse()?,
        title: row.get("title"),
        price_cents: row.get("price_cents"),
        total_slots: row.get("total_slots"),
        remaining_slots: row.get("remaining_slots"),
        active: row.get("active"),
        upload_schema: serde_json::from_str(&row.get::<String, _>("upload_schema"))
            .unwrap_or_default(),
    })
}

#[async_trait]
impl InventoryStore for SqliteStore {
    async fn get_unit(&self, state: &StateCode, ad_type: AdType) -> Result<Option<InventoryUnit>> {
        let row = sqlx::query("SELECT * FROM inventory WHERE state_code = ? AND ad_type = ?")
            .bind(state.as_str())
            .bind(ad_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(row_to_unit).transpose()
    }

    async fn get_by_state(&self, state: &StateCode) -> Result<Vec<InventoryUnit>> {
        let rows = sqlx::query("SELECT * FROM inventory WHERE state_code = ? ORDER BY ad_type")
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter().map(row_to_unit).collect()
    }

    /// Check-and-decrement in one statement. The availability guard rides in
    /// the WHERE clause, so two racing checkouts can never take the counter
    /// below zero; the loser sees zero rows affected.
    async fn decrement(
        &self,
        state: &StateCode,
        ad_type: AdType,
        amount: i64,
    ) -> Result<InventoryUnit> {
        let result = sqlx::query(
            "UPDATE inventory SET remaining_slots = remaining_slots - ?1
             WHERE state_code = ?2 AND ad_type = ?3 AND active = 1 AND remaining_slots >= ?1",
        )
        .bind(amount)
        .bind(state.as_str())
        .bind(ad_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return match self.get_unit(state, ad_type).await? {
                Some(unit) if unit.active => Err(AppError::OutOfStock {
                    state: state.to_string(),
                    ad_type: ad_type.to_string(),
                    requested: amount,
                }),
                _ => Err(AppError::NotFound(
                    "inventory unit".into(),
                    format!("{state}/{ad_type}"),
                )),
            };
        }

        self.get_unit(state, ad_type).await?.ok_or_else(|| {
            AppError::NotFound("inventory unit".into(), format!("{state}/{ad_type}"))
        })
    }

    async fn increment(&self, state: &StateCode, ad_type: AdType, amount: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE inventory SET remaining_slots = MIN(total_slots, remaining_slots + ?1)
             WHERE state_code = ?2 AND ad_type = ?3",
        )
        .bind(amount)
        .bind(state.as_str())
        .bind(ad_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(
                "inventory unit".into(),
                format!("{state}/{ad_type}"),
            ));
        }
        Ok(())
    }

    async fn upsert(&self, unit: InventoryUnit) -> Result<()> {
        sqlx::query(
            "INSERT INTO inventory
                (state_code, ad_type, title, price_cents, total_slots, remaining_slots, active, upload_schema)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (state_code, ad_type) DO UPDATE SET
                title = excluded.title,
                price_cents = excluded.price_cents,
                total_slots = excluded.total_slots,
                remaining_slots = excluded.remaining_slots,
                active = excluded.active,
                upload_schema = excluded.upload_schema",
        )
        .bind(unit.state_code.as_str())
        .bind(unit.ad_type.as_str())
        .bind(unit.title)
        .bind(unit.price_cents)
        .bind(unit.total_slots)
        .bind(unit.remaining_slots)
        .bind(unit.active)
        .bind(unit.upload_schema.to_string())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}

fn row_to_reservation(row: &SqliteRow) -> Result<Reservation> {
    Ok(Reservation {
        id: blob_to_uuid(row.get::<Vec<u8>, _>("id").as_slice()),
        user_id: blob_to_uuid(row.get::<Vec<u8>, _>("user_id").as_slice()),
        state_code: StateCode::parse(&row.get::<String, _>("state_code"))?,
        ad_type: row.get::<String, _>("ad_type").parse()?,
        quantity: row.get("quantity"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        status: row.get::<String, _>("status").parse()?,
    })
}

#[async_trait]
impl ReservationStore for SqliteStore {
    async fn insert_reservation(&self, reservation: Reservation) -> Result<()> {
        sqlx::query(
            "INSERT INTO reservations
                (id, user_id, state_code, ad_type, quantity, created_at, expires_at, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(reservation.id))
        .bind(uuid_to_blob(reservation.user_id))
        .bind(reservation.state_code.as_str())
        .bind(reservation.ad_type.as_str())
        .bind(reservation.quantity)
        .bind(reservation.created_at)
        .bind(reservation.expires_at)
        .bind(reservation.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>> {
        let row = sqlx::query("SELECT * FROM reservations WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(row_to_reservation).transpose()
    }

    /// Status transitions are guarded on the current value; whichever racing
    /// caller lands first wins and the loser sees `false`.
    async fn transition(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE reservations SET status = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(uuid_to_blob(id))
            .bind(from.as_str())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        // Bounded batch; anything beyond the cap is caught by the next sweep.
        let rows = sqlx::query(
            "SELECT * FROM reservations
             WHERE status = 'active' AND expires_at < ?
             ORDER BY expires_at ASC LIMIT 500",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.iter().map(row_to_reservation).collect()
    }
}

fn row_to_cart_item(row: &SqliteRow) -> Result<CartItem> {
    Ok(CartItem {
        item_id: blob_to_uuid(row.get::<Vec<u8>, _>("item_id").as_slice()),
        user_id: blob_to_uuid(row.get::<Vec<u8>, _>("user_id").as_slice()),
        reservation_id: blob_to_uuid(row.get::<Vec<u8>, _>("reservation_id").as_slice()),
        state_code: StateCode::parse(&row.get::<String, _>("state_code"))?,
        ad_type: row.get::<String, _>("ad_type").parse()?,
        quantity: row.get("quantity"),
        unit_price_cents: row.get("unit_price_cents"),
        added_at: row.get("added_at"),
    })
}

#[async_trait]
impl CartStore for SqliteStore {
    async fn append(&self, item: CartItem) -> Result<()> {
        sqlx::query(
            "INSERT INTO cart_items
                (item_id, user_id, reservation_id, state_code, ad_type, quantity, unit_price_cents, added_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(item.item_id))
        .bind(uuid_to_blob(item.user_id))
        .bind(uuid_to_blob(item.reservation_id))
        .bind(item.state_code.as_str())
        .bind(item.ad_type.as_str())
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.added_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get_item(&self, user_id: Uuid, item_id: Uuid) -> Result<Option<CartItem>> {
        let row = sqlx::query("SELECT * FROM cart_items WHERE user_id = ? AND item_id = ?")
            .bind(uuid_to_blob(user_id))
            .bind(uuid_to_blob(item_id))
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(row_to_cart_item).transpose()
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<CartItem>> {
        let rows = sqlx::query("SELECT * FROM cart_items WHERE user_id = ? ORDER BY added_at ASC")
            .bind(uuid_to_blob(user_id))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter().map(row_to_cart_item).collect()
    }

    async fn remove(&self, user_id: Uuid, item_id: Uuid) -> Result<Option<CartItem>> {
        let existing = self.get_item(user_id, item_id).await?;
        if existing.is_some() {
            sqlx::query("DELETE FROM cart_items WHERE user_id = ? AND item_id = ?")
                .bind(uuid_to_blob(user_id))
                .bind(uuid_to_blob(item_id))
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
        }
        Ok(existing)
    }

    async fn drain(&self, user_id: Uuid) -> Result<Vec<CartItem>> {
        let items = self.list(user_id).await?;
        sqlx::query("DELETE FROM cart_items WHERE user_id = ?")
            .bind(uuid_to_blob(user_id))
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(items)
    }
}

fn row_to_code(row: &SqliteRow) -> Result<DiscountCode> {
    let kind = match row.get::<String, _>("kind").as_str() {
        "percent" => CodeKind::Percent,
        "fixed" => CodeKind::Fixed,
        other => {
            return Err(AppError::Store(format!(
                "unknown discount code kind in store: {other:?}"
            )))
        }
    };
    Ok(DiscountCode {
        code: row.get("code"),
        kind,
        value: row.get("value"),
        min_order_cents: row.get("min_order_cents"),
        max_uses: row.get("max_uses"),
        current_uses: row.get("current_uses"),
        expires_at: row.get("expires_at"),
        active: row.get("active"),
    })
}

fn code_kind_str(kind: CodeKind) -> &'static str {
    match kind {
        CodeKind::Percent => "percent",
        CodeKind::Fixed => "fixed",
    }
}

#[async_trait]
impl DiscountStore for SqliteStore {
    async fn get_code(&self, code: &str) -> Result<Option<DiscountCode>> {
        let row = sqlx::query("SELECT * FROM discount_codes WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(row_to_code).transpose()
    }

    async fn list_codes(&self) -> Result<Vec<DiscountCode>> {
        let rows = sqlx::query("SELECT * FROM discount_codes ORDER BY code")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter().map(row_to_code).collect()
    }

    async fn put_code(&self, code: DiscountCode) -> Result<()> {
        sqlx::query(
            "INSERT INTO discount_codes
                (code, kind, value, min_order_cents, max_uses, current_uses, expires_at, active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (code) DO UPDATE SET
                kind = excluded.kind,
                value = excluded.value,
                min_order_cents = excluded.min_order_cents,
                max_uses = excluded.max_uses,
                current_uses = excluded.current_uses,
                expires_at = excluded.expires_at,
                active = excluded.active",
        )
        .bind(code.code)
        .bind(code_kind_str(code.kind))
        .bind(code.value)
        .bind(code.min_order_cents)
        .bind(code.max_uses)
        .bind(code.current_uses)
        .bind(code.expires_at)
        .bind(code.active)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn delete_code(&self, code: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM discount_codes WHERE code = ?")
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected() == 1)
    }

    /// Usage cap enforced in the WHERE clause; `current_uses` can never pass
    /// `max_uses` no matter how many callbacks race.
    async fn record_code_use(&self, code: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE discount_codes SET current_uses = current_uses + 1
             WHERE code = ? AND (max_uses IS NULL OR current_uses < max_uses)",
        )
        .bind(code)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_deals(&self) -> Result<Vec<BundleDeal>> {
        let rows = sqlx::query("SELECT * FROM bundle_deals")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter()
            .map(|row| {
                Ok(BundleDeal {
                    id: blob_to_uuid(row.get::<Vec<u8>, _>("id").as_slice()),
                    ad_type: row.get::<String, _>("ad_type").parse()?,
                    min_quantity: row.get("min_quantity"),
                    discount_percent: row.get("discount_percent"),
                    active: row.get("active"),
                })
            })
            .collect()
    }

    async fn put_deal(&self, deal: BundleDeal) -> Result<()> {
        sqlx::query(
            "INSERT INTO bundle_deals (id, ad_type, min_quantity, discount_percent, active)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                ad_type = excluded.ad_type,
                min_quantity = excluded.min_quantity,
                discount_percent = excluded.discount_percent,
                active = excluded.active",
        )
        .bind(uuid_to_blob(deal.id))
        .bind(deal.ad_type.as_str())
        .bind(deal.min_quantity)
        .bind(deal.discount_percent)
        .bind(deal.active)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn delete_deal(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bundle_deals WHERE id = ?")
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected() == 1)
    }
}

fn discount_kind_str(kind: DiscountKind) -> &'static str {
    match kind {
        DiscountKind::None => "none",
        DiscountKind::Bundle => "bundle",
        DiscountKind::Code => "code",
    }
}

fn row_to_order(row: &SqliteRow) -> Result<Order> {
    let discount_kind = match row.get::<String, _>("discount_kind").as_str() {
        "none" => DiscountKind::None,
        "bundle" => DiscountKind::Bundle,
        "code" => DiscountKind::Code,
        other => {
            return Err(AppError::Store(format!(
                "unknown discount kind in store: {other:?}"
            )))
        }
    };
    let items = serde_json::from_str(&row.get::<String, _>("items"))
        .map_err(|e| AppError::Store(format!("corrupt order items: {e}")))?;
    Ok(Order {
        order_id: row.get("order_id"),
        user_id: blob_to_uuid(row.get::<Vec<u8>, _>("user_id").as_slice()),
        customer_name: row.get("customer_name"),
        customer_email: row.get("customer_email"),
        items,
        subtotal_cents: row.get("subtotal_cents"),
        discount_cents: row.get("discount_cents"),
        discount_kind,
        tax_cents: row.get("tax_cents"),
        total_cents: row.get("total_cents"),
        created_at: row.get("created_at"),
        upload_status: serde_json::from_str(&row.get::<String, _>("upload_status"))
            .unwrap_or_default(),
        needs_reconciliation: row.get("needs_reconciliation"),
    })
}

#[async_trait]
impl OrderStore for SqliteStore {
    async fn insert_order(&self, order: Order) -> Result<()> {
        let items = serde_json::to_string(&order.items)
            .map_err(|e| AppError::Store(format!("unserializable order items: {e}")))?;
        sqlx::query(
            "INSERT INTO orders
                (order_id, user_id, customer_name, customer_email, items, subtotal_cents,
                 discount_cents, discount_kind, tax_cents, total_cents, created_at,
                 upload_status, needs_reconciliation)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(order.order_id)
        .bind(uuid_to_blob(order.user_id))
        .bind(order.customer_name)
        .bind(order.customer_email)
        .bind(items)
        .bind(order.subtotal_cents)
        .bind(order.discount_cents)
        .bind(discount_kind_str(order.discount_kind))
        .bind(order.tax_cents)
        .bind(order.total_cents)
        .bind(order.created_at)
        .bind(order.upload_status.to_string())
        .bind(order.needs_reconciliation)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE order_id = ?")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(row_to_order).transpose()
    }

    async fn set_upload_status(
        &self,
        order_id: &str,
        item_id: Uuid,
        slot: u32,
        field: &str,
        url: &str,
    ) -> Result<()> {
        let order = self
            .get_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("order".into(), order_id.to_string()))?;

        // The upload-status bucket has no cross-request invariant, so a plain
        // read-merge-write is fine here.
        let mut status = order.upload_status;
        let item_entry = &mut status[item_id.to_string()];
        if !item_entry.is_object() {
            // Fresh items carry the "pending" marker string; the first upload
            // replaces it with a slot map.
            *item_entry = serde_json::json!({});
        }
        item_entry[format!("slot-{slot}")][field] = serde_json::Value::String(url.to_string());

        sqlx::query("UPDATE orders SET upload_status = ? WHERE order_id = ?")
            .bind(status.to_string())
            .bind(order_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}
