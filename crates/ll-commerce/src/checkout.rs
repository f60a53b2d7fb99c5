//! # Checkout / Order Finalizer
//!
//! `quote` prices the cart (best discount plus tax), `start` opens a payment
//! intent carrying canonical metadata, and `finalize` runs on the processor's
//! payment-confirmed callback: consume every reservation exactly once,
//! persist the order under the intent id, record code usage, empty the cart.
//!
//! A consume failure mid-loop never drops the order; the order lands with
//! `needs_reconciliation` set and the failed items logged, because retrying
//! inventory-affecting operations blindly risks double effect.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use ll_core::discounts;
use ll_core::error::{AppError, Result};
use ll_core::models::{
    AdType, Cart, CartItem, Contact, DiscountKind, DiscountResult, Order, OrderItem,
    PaymentIntent, StateCode,
};
use ll_core::traits::{DiscountStore, OrderStore, PaymentProvider};

use crate::cart::CartService;
use crate::reservations::ReservationLedger;

const META_USER_ID: &str = "user_id";
const META_CUSTOMER_NAME: &str = "customer_name";
const META_CUSTOMER_EMAIL: &str = "customer_email";
const META_DISCOUNT_KIND: &str = "discount_kind";
const META_DISCOUNT_CENTS: &str = "discount_cents";
const META_DISCOUNT_CODE: &str = "discount_code";
const META_TAX_CENTS: &str = "tax_cents";
const META_ITEMS: &str = "items";

/// Priced view of a cart: the winning discount, tax, and the charge amount.
#[derive(Debug, Clone)]
pub struct CheckoutQuote {
    pub cart: Cart,
    pub discount: DiscountResult,
    pub tax_cents: i64,
    pub total_cents: i64,
}

/// One line of the paid-items summary embedded in intent metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidItem {
    pub state_code: StateCode,
    pub ad_type: AdType,
    pub quantity: i64,
}

/// What the payment-confirmed callback needs, recovered from intent metadata.
#[derive(Debug, Clone)]
pub struct FinalizeArgs {
    pub user_id: Uuid,
    pub contact: Contact,
    pub discount: DiscountResult,
    pub tax_cents: i64,
    /// The items the intent was opened for; these, not the live cart, are
    /// what the customer paid for.
    pub items: Vec<PaidItem>,
}

#[derive(Clone)]
pub struct CheckoutService {
    cart: CartService,
    ledger: ReservationLedger,
    discounts: Arc<dyn DiscountStore>,
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentProvider>,
    /// Sales tax in basis points, applied to the discounted subtotal.
    tax_rate_bp: i64,
}

impl CheckoutService {
    pub fn new(
        cart: CartService,
        ledger: ReservationLedger,
        discounts: Arc<dyn DiscountStore>,
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentProvider>,
        tax_rate_bp: i64,
    ) -> Self {
        Self {
            cart,
            ledger,
            discounts,
            orders,
            payments,
            tax_rate_bp,
        }
    }

    /// Prices the current cart. The bundle candidate is always evaluated;
    /// a supplied code must validate or the whole quote fails with the
    /// specific rejection so the customer can correct it.
    pub async fn quote(&self, user_id: Uuid, code: Option<&str>) -> Result<CheckoutQuote> {
        let cart = self.cart.get_with_totals(user_id).await?;

        let code_row = match code {
            Some(raw) => {
                let key = discounts::normalize_code(raw);
                Some(
                    self.discounts
                        .get_code(&key)
                        .await?
                        .ok_or(AppError::CodeNotFound(key))?,
                )
            }
            None => None,
        };

        let deals = self.discounts.list_deals().await?;
        let discount = discounts::best_discount(
            &cart.items,
            cart.subtotal_cents,
            code_row.as_ref(),
            &deals,
            Utc::now(),
        )?;

        let taxable = cart.subtotal_cents - discount.amount_cents;
        let tax_cents = taxable * self.tax_rate_bp / 10_000;
        Ok(CheckoutQuote {
            total_cents: taxable + tax_cents,
            tax_cents,
            discount,
            cart,
        })
    }

    /// Opens a payment intent for the quoted amount. Metadata values are
    /// canonical (upper-case state codes, the fixed ad-type strings) since
    /// the finalizer reads the same values back from the callback.
    pub async fn start(
        &self,
        user_id: Uuid,
        contact: Contact,
        code: Option<&str>,
    ) -> Result<(CheckoutQuote, PaymentIntent)> {
        let quote = self.quote(user_id, code).await?;
        if quote.cart.items.is_empty() {
            return Err(AppError::Validation("cart is empty".into()));
        }

        let metadata = intent_metadata(user_id, &contact, &quote);
        let intent = self
            .payments
            .create_intent(quote.total_cents, "usd", metadata)
            .await?;
        Ok((quote, intent))
    }

    /// Converts the paid cart into a permanent order. Reservation consumption
    /// is exactly-once through the status guard; a duplicate callback finds
    /// the existing order and returns it unchanged.
    ///
    /// Only the items named in the intent metadata are finalized. The live
    /// cart can have drifted since the intent was opened: items added later
    /// were never paid for and stay in the cart; paid items that vanished
    /// flag the order for reconciliation.
    pub async fn finalize(&self, intent_id: &str, args: FinalizeArgs) -> Result<Order> {
        if let Some(existing) = self.orders.get_order(intent_id).await? {
            log::info!("duplicate payment callback for order {intent_id}; returning as-is");
            return Ok(existing);
        }

        let cart = self.cart.get_with_totals(args.user_id).await?;

        let mut unmatched = cart.items;
        let mut paid_items: Vec<CartItem> = Vec::new();
        let mut lost = 0usize;
        for paid in &args.items {
            // First match wins, so a later identical line cannot stand in
            // for the one whose price snapshot backed the charge.
            match unmatched.iter().position(|i| {
                i.state_code == paid.state_code
                    && i.ad_type == paid.ad_type
                    && i.quantity == paid.quantity
            }) {
                Some(pos) => paid_items.push(unmatched.remove(pos)),
                None => {
                    lost += 1;
                    log::error!(
                        "order {intent_id}: paid item {}/{} x{} is no longer in the cart",
                        paid.state_code,
                        paid.ad_type,
                        paid.quantity
                    );
                }
            }
        }
        for extra in &unmatched {
            log::warn!(
                "order {intent_id}: cart item {} was added after payment started; leaving it",
                extra.item_id
            );
        }

        if paid_items.is_empty() {
            return Err(AppError::NotFound(
                "cart for paid intent".into(),
                intent_id.to_string(),
            ));
        }

        let mut failed: Vec<Uuid> = Vec::new();
        for item in &paid_items {
            if let Err(err) = self.ledger.consume(item.reservation_id).await {
                log::error!(
                    "order {intent_id}: failed to consume reservation {} for item {}: {err}",
                    item.reservation_id,
                    item.item_id
                );
                failed.push(item.item_id);
            }
        }
        if !failed.is_empty() {
            log::error!(
                "order {intent_id} needs reconciliation; unconsumed items: {failed:?}"
            );
        }

        let mut upload_status = serde_json::Map::new();
        for item in &paid_items {
            upload_status.insert(item.item_id.to_string(), serde_json::json!("pending"));
        }

        let subtotal_cents = discounts::subtotal(&paid_items);
        let order = Order {
            order_id: intent_id.to_string(),
            user_id: args.user_id,
            customer_name: args.contact.name,
            customer_email: args.contact.email,
            items: paid_items
                .iter()
                .map(|item| OrderItem {
                    item_id: item.item_id,
                    reservation_id: item.reservation_id,
                    state_code: item.state_code.clone(),
                    ad_type: item.ad_type,
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price_cents,
                })
                .collect(),
            subtotal_cents,
            discount_cents: args.discount.amount_cents,
            discount_kind: args.discount.kind,
            tax_cents: args.tax_cents,
            total_cents: subtotal_cents - args.discount.amount_cents + args.tax_cents,
            created_at: Utc::now(),
            upload_status: serde_json::Value::Object(upload_status),
            needs_reconciliation: !failed.is_empty() || lost > 0,
        };
        self.orders.insert_order(order.clone()).await?;

        // Usage accounting is best-effort: the customer already paid the
        // discounted amount, so a lost race only means the cap leaks by one.
        if args.discount.kind == DiscountKind::Code {
            if let Some(code) = &args.discount.code {
                match self.discounts.record_code_use(code).await {
                    Ok(true) => {}
                    Ok(false) => {
                        log::warn!("order {intent_id}: code {code} was already at its usage cap")
                    }
                    Err(err) => {
                        log::warn!("order {intent_id}: recording use of code {code} failed: {err}")
                    }
                }
            }
        }

        // Reservations are consumed (or flagged), so drop the paid line
        // items without releasing anything. Unpaid extras stay in the cart.
        for item in &paid_items {
            self.cart.take_item(args.user_id, item.item_id).await?;
        }

        Ok(order)
    }
}

/// Builds the metadata map embedded in the payment intent.
pub fn intent_metadata(
    user_id: Uuid,
    contact: &Contact,
    quote: &CheckoutQuote,
) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert(META_USER_ID.into(), user_id.to_string());
    metadata.insert(META_CUSTOMER_NAME.into(), contact.name.clone());
    metadata.insert(META_CUSTOMER_EMAIL.into(), contact.email.clone());
    metadata.insert(
        META_DISCOUNT_KIND.into(),
        match quote.discount.kind {
            DiscountKind::None => "none",
            DiscountKind::Bundle => "bundle",
            DiscountKind::Code => "code",
        }
        .into(),
    );
    metadata.insert(
        META_DISCOUNT_CENTS.into(),
        quote.discount.amount_cents.to_string(),
    );
    if let Some(code) = &quote.discount.code {
        metadata.insert(META_DISCOUNT_CODE.into(), code.clone());
    }
    metadata.insert(META_TAX_CENTS.into(), quote.tax_cents.to_string());
    metadata.insert(
        META_ITEMS.into(),
        quote
            .cart
            .items
            .iter()
            .map(|i| format!("{}:{}:{}", i.state_code, i.ad_type, i.quantity))
            .collect::<Vec<_>>()
            .join(";"),
    );
    metadata
}

/// Recovers the finalizer's inputs from callback metadata.
pub fn parse_intent_metadata(metadata: &HashMap<String, String>) -> Result<FinalizeArgs> {
    let field = |key: &str| {
        metadata
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::Validation(format!("payment metadata missing {key:?}")))
    };

    let user_id = Uuid::parse_str(&field(META_USER_ID)?)
        .map_err(|e| AppError::Validation(format!("bad user_id in payment metadata: {e}")))?;
    let parse_cents = |key: &str| -> Result<i64> {
        field(key)?
            .parse::<i64>()
            .map_err(|e| AppError::Validation(format!("bad {key} in payment metadata: {e}")))
    };

    let kind = match field(META_DISCOUNT_KIND)?.as_str() {
        "none" => DiscountKind::None,
        "bundle" => DiscountKind::Bundle,
        "code" => DiscountKind::Code,
        other => {
            return Err(AppError::Validation(format!(
                "bad discount_kind in payment metadata: {other:?}"
            )))
        }
    };

    let items = field(META_ITEMS)?
        .split(';')
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(state), Some(ad_type), Some(quantity)) => Ok(PaidItem {
                    state_code: StateCode::parse(state)?,
                    ad_type: ad_type.parse()?,
                    quantity: quantity.parse::<i64>().map_err(|e| {
                        AppError::Validation(format!("bad items entry in payment metadata: {e}"))
                    })?,
                }),
                _ => Err(AppError::Validation(format!(
                    "bad items entry in payment metadata: {entry:?}"
                ))),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FinalizeArgs {
        user_id,
        contact: Contact {
            name: field(META_CUSTOMER_NAME)?,
            email: field(META_CUSTOMER_EMAIL)?,
        },
        discount: DiscountResult {
            kind,
            amount_cents: parse_cents(META_DISCOUNT_CENTS)?,
            code: metadata.get(META_DISCOUNT_CODE).cloned(),
            deal_id: None,
        },
        tax_cents: parse_cents(META_TAX_CENTS)?,
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memstores::{
        MemCarts, MemDiscounts, MemInventory, MemOrders, MemPayments, MemReservations,
    };
    use ll_core::models::{AdType, BundleDeal, CodeKind, DiscountCode, StateCode};

    fn ca() -> StateCode {
        StateCode::parse("CA").unwrap()
    }

    struct Harness {
        checkout: CheckoutService,
        cart: CartService,
        inventory: Arc<MemInventory>,
        discounts: Arc<MemDiscounts>,
        orders: Arc<MemOrders>,
    }

    fn harness(slots: i64, price_cents: i64, tax_rate_bp: i64) -> Harness {
        let inventory = Arc::new(MemInventory::with_unit(ca(), AdType::Half, slots, price_cents));
        let reservations = Arc::new(MemReservations::default());
        let ledger = ReservationLedger::new(inventory.clone(), reservations, 900);
        let cart = CartService::new(Arc::new(MemCarts::default()), inventory.clone(), ledger.clone());
        let discounts = Arc::new(MemDiscounts::default());
        let orders = Arc::new(MemOrders::default());
        let checkout = CheckoutService::new(
            cart.clone(),
            ledger,
            discounts.clone(),
            orders.clone(),
            Arc::new(MemPayments),
            tax_rate_bp,
        );
        Harness {
            checkout,
            cart,
            inventory,
            discounts,
            orders,
        }
    }

    fn fixed_code(code: &str, value: i64) -> DiscountCode {
        DiscountCode {
            code: code.into(),
            kind: CodeKind::Fixed,
            value,
            min_order_cents: 0,
            max_uses: Some(10),
            current_uses: 0,
            expires_at: None,
            active: true,
        }
    }

    #[tokio::test]
    async fn quote_picks_the_bundle_over_a_small_code() {
        let h = harness(10, 900, 0);
        let user = Uuid::new_v4();
        h.cart.add_item(user, &ca(), AdType::Half, 4).await.unwrap();
        h.discounts.add_deal(BundleDeal {
            id: Uuid::new_v4(),
            ad_type: AdType::Half,
            min_quantity: 4,
            discount_percent: 15,
            active: true,
        });
        h.discounts
            .put_code(fixed_code("WELCOME5", 500))
            .await
            .unwrap();

        let quote = h.checkout.quote(user, Some("welcome5")).await.unwrap();
        assert_eq!(quote.discount.kind, DiscountKind::Bundle);
        assert_eq!(quote.discount.amount_cents, 540);
        assert_eq!(quote.total_cents, 3600 - 540);
    }

    #[tokio::test]
    async fn quote_applies_tax_to_the_discounted_subtotal() {
        let h = harness(10, 1000, 800); // 8% tax
        let user = Uuid::new_v4();
        h.cart.add_item(user, &ca(), AdType::Half, 1).await.unwrap();
        h.discounts
            .put_code(fixed_code("TAKE200", 200))
            .await
            .unwrap();

        let quote = h.checkout.quote(user, Some("TAKE200")).await.unwrap();
        assert_eq!(quote.tax_cents, 64); // 8% of 800
        assert_eq!(quote.total_cents, 864);
    }

    #[tokio::test]
    async fn unknown_code_fails_the_quote() {
        let h = harness(10, 1000, 0);
        let err = h
            .checkout
            .quote(Uuid::new_v4(), Some("NOPE"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CodeNotFound(_)));
    }

    #[tokio::test]
    async fn start_rejects_an_empty_cart() {
        let h = harness(10, 1000, 0);
        let contact = Contact {
            name: "A. Customer".into(),
            email: "a@example.com".into(),
        };
        let err = h
            .checkout
            .start(Uuid::new_v4(), contact, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn finalize_consumes_persists_and_empties() {
        let h = harness(5, 1000, 0);
        let user = Uuid::new_v4();
        h.cart.add_item(user, &ca(), AdType::Half, 2).await.unwrap();
        h.discounts
            .put_code(fixed_code("TAKE200", 200))
            .await
            .unwrap();

        let contact = Contact {
            name: "A. Customer".into(),
            email: "a@example.com".into(),
        };
        let (quote, intent) = h
            .checkout
            .start(user, contact.clone(), Some("TAKE200"))
            .await
            .unwrap();
        assert_eq!(intent.amount_cents, 1800);

        let metadata = intent_metadata(user, &contact, &quote);
        let args = parse_intent_metadata(&metadata).unwrap();
        let order = h.checkout.finalize(&intent.id, args).await.unwrap();

        assert_eq!(order.order_id, intent.id);
        assert_eq!(order.subtotal_cents, 2000);
        assert_eq!(order.discount_cents, 200);
        assert_eq!(order.total_cents, 1800);
        assert!(!order.needs_reconciliation);
        assert_eq!(order.items.len(), 1);

        // Consumed reservations keep the slots; the cart is gone.
        assert_eq!(h.inventory.remaining(&ca(), AdType::Half), 3);
        assert!(h.cart.get_with_totals(user).await.unwrap().items.is_empty());

        // Code usage was recorded and the order is readable back.
        assert_eq!(h.discounts.uses("TAKE200"), 1);
        assert!(h.orders.get_order(&intent.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_callback_returns_the_existing_order() {
        let h = harness(5, 1000, 0);
        let user = Uuid::new_v4();
        h.cart.add_item(user, &ca(), AdType::Half, 1).await.unwrap();

        let contact = Contact {
            name: "B".into(),
            email: "b@example.com".into(),
        };
        let (quote, intent) = h.checkout.start(user, contact.clone(), None).await.unwrap();
        let args = parse_intent_metadata(&intent_metadata(user, &contact, &quote)).unwrap();

        let first = h.checkout.finalize(&intent.id, args.clone()).await.unwrap();
        let second = h.checkout.finalize(&intent.id, args).await.unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(h.inventory.remaining(&ca(), AdType::Half), 4);
    }

    #[tokio::test]
    async fn finalize_skips_items_added_after_payment_started() {
        let h = harness(5, 1000, 0);
        let user = Uuid::new_v4();
        h.cart.add_item(user, &ca(), AdType::Half, 1).await.unwrap();

        let contact = Contact {
            name: "E".into(),
            email: "e@example.com".into(),
        };
        let (quote, intent) = h.checkout.start(user, contact.clone(), None).await.unwrap();
        assert_eq!(intent.amount_cents, 1000);

        // A second item lands between payment start and the callback.
        let late = h.cart.add_item(user, &ca(), AdType::Half, 2).await.unwrap();

        let args = parse_intent_metadata(&intent_metadata(user, &contact, &quote)).unwrap();
        let order = h.checkout.finalize(&intent.id, args).await.unwrap();

        // Only the paid item is on the order, at the charged amount.
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.total_cents, 1000);
        assert!(!order.needs_reconciliation);

        // The late item was neither consumed nor dropped: it is still in
        // the cart with its reservation holding inventory.
        let cart = h.cart.get_with_totals(user).await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].item_id, late.item_id);
        assert_eq!(h.inventory.remaining(&ca(), AdType::Half), 2);
    }

    #[tokio::test]
    async fn missing_paid_item_flags_the_order_for_reconciliation() {
        let h = harness(5, 1000, 0);
        let user = Uuid::new_v4();
        let a = h.cart.add_item(user, &ca(), AdType::Half, 1).await.unwrap();
        h.cart.add_item(user, &ca(), AdType::Half, 2).await.unwrap();

        let contact = Contact {
            name: "F".into(),
            email: "f@example.com".into(),
        };
        let (quote, intent) = h.checkout.start(user, contact.clone(), None).await.unwrap();
        assert_eq!(intent.amount_cents, 3000);

        // One paid item vanishes before the callback lands.
        h.cart.remove_item(user, a.item_id).await.unwrap();

        let args = parse_intent_metadata(&intent_metadata(user, &contact, &quote)).unwrap();
        let order = h.checkout.finalize(&intent.id, args).await.unwrap();

        assert!(order.needs_reconciliation);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.subtotal_cents, 2000);
    }

    #[tokio::test]
    async fn consume_failure_flags_the_order_for_reconciliation() {
        let h = harness(5, 1000, 0);
        let user = Uuid::new_v4();
        let item = h.cart.add_item(user, &ca(), AdType::Half, 1).await.unwrap();

        let contact = Contact {
            name: "C".into(),
            email: "c@example.com".into(),
        };
        let (quote, intent) = h.checkout.start(user, contact.clone(), None).await.unwrap();

        // Simulate the expiry sweep winning the race before the callback.
        h.checkout.ledger.release(item.reservation_id).await.unwrap();

        let args = parse_intent_metadata(&intent_metadata(user, &contact, &quote)).unwrap();
        let order = h.checkout.finalize(&intent.id, args).await.unwrap();
        assert!(order.needs_reconciliation);
        assert!(h.orders.get_order(&intent.id).await.unwrap().is_some());
    }

    #[test]
    fn metadata_round_trips() {
        let user = Uuid::new_v4();
        let contact = Contact {
            name: "D".into(),
            email: "d@example.com".into(),
        };
        let mut cart = Cart::empty(user);
        cart.items.push(CartItem {
            item_id: Uuid::new_v4(),
            user_id: user,
            reservation_id: Uuid::new_v4(),
            state_code: ca(),
            ad_type: AdType::Half,
            quantity: 2,
            unit_price_cents: 500,
            added_at: Utc::now(),
        });
        let quote = CheckoutQuote {
            cart,
            discount: DiscountResult {
                kind: DiscountKind::Code,
                amount_cents: 250,
                code: Some("SAVE25".into()),
                deal_id: None,
            },
            tax_cents: 80,
            total_cents: 830,
        };
        let args = parse_intent_metadata(&intent_metadata(user, &contact, &quote)).unwrap();
        assert_eq!(args.user_id, user);
        assert_eq!(args.contact.email, "d@example.com");
        assert_eq!(args.discount.kind, DiscountKind::Code);
        assert_eq!(args.discount.amount_cents, 250);
        assert_eq!(args.discount.code.as_deref(), Some("SAVE25"));
        assert_eq!(args.tax_cents, 80);
        assert_eq!(
            args.items,
            vec![PaidItem {
                state_code: ca(),
                ad_type: AdType::Half,
                quantity: 2,
            }]
        );
    }
}
