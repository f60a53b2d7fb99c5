//! # Public Handlers
//!
//! Coordinates the flow between HTTP requests and the commerce services.
//! Identity comes from a `Authorization: Bearer` token resolved by the
//! identity plugin; storefront browsing and the payment webhook are the
//! only anonymous endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::{StreamExt, TryStreamExt};
use ll_commerce::{CartService, CheckoutQuote, CheckoutService, ReservationLedger};
use ll_core::error::AppError;
use ll_core::models::{AdType, Cart, CartItem, Contact, DiscountResult, StateCode};
use ll_core::traits::{
    DiscountStore, IdentityProvider, InventoryStore, OrderStore, SubmissionStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// State shared across all Actix-web workers.
pub struct AppState {
    pub inventory: Arc<dyn InventoryStore>,
    pub discounts: Arc<dyn DiscountStore>,
    pub orders: Arc<dyn OrderStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub cart: CartService,
    pub checkout: CheckoutService,
    pub ledger: ReservationLedger,
}

/// Resolves the calling user from the bearer token, or 401.
pub(crate) fn current_user(data: &AppState, req: &HttpRequest) -> ApiResult<Uuid> {
    let raw = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw);
    data.identity
        .resolve_user(token)
        .ok_or_else(|| ApiError(AppError::Unauthorized("invalid bearer token".into())))
}

// ---------------------------------------------------------------------------
// Cart
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub state: String,
    pub ad_type: AdType,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

pub async fn get_cart(data: web::Data<AppState>, req: HttpRequest) -> ApiResult<HttpResponse> {
    let user = current_user(&data, &req)?;
    let cart = data.cart.get_with_totals(user).await?;
    Ok(HttpResponse::Ok().json(cart))
}

pub async fn add_cart_item(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<AddItemRequest>,
) -> ApiResult<HttpResponse> {
    let user = current_user(&data, &req)?;
    let state = StateCode::parse(&body.state)?;
    if body.quantity < 1 {
        return Err(AppError::Validation("quantity must be at least 1".into()).into());
    }
    let item = data
        .cart
        .add_item(user, &state, body.ad_type, body.quantity)
        .await?;
    Ok(HttpResponse::Created().json(item))
}

pub async fn remove_cart_item(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let user = current_user(&data, &req)?;
    data.cart.remove_item(user, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn clear_cart(data: web::Data<AppState>, req: HttpRequest) -> ApiResult<HttpResponse> {
    let user = current_user(&data, &req)?;
    let released = data.cart.clear(user).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "released": released })))
}

#[derive(Debug, Deserialize)]
pub struct MigrateRequest {
    pub items: Vec<AddItemRequest>,
}

#[derive(Debug, Serialize)]
struct MigrateFailure {
    state: String,
    ad_type: AdType,
    quantity: i64,
    error: String,
}

#[derive(Debug, Serialize)]
struct MigrateResponse {
    migrated: Vec<CartItem>,
    failed: Vec<MigrateFailure>,
}

/// Replays a client-side guest cart through `add_item`, one entry at a
/// time. Entries that fail (out of stock, unknown unit) are reported and
/// skipped; the rest land.
pub async fn migrate_cart(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<MigrateRequest>,
) -> ApiResult<HttpResponse> {
    let user = current_user(&data, &req)?;
    let mut migrated = Vec::new();
    let mut failed = Vec::new();
    for entry in &body.items {
        let state = match StateCode::parse(&entry.state) {
            Ok(s) => s,
            Err(err) => {
                failed.push(MigrateFailure {
                    state: entry.state.clone(),
                    ad_type: entry.ad_type,
                    quantity: entry.quantity,
                    error: err.to_string(),
                });
                continue;
            }
        };
        match data
            .cart
            .add_item(user, &state, entry.ad_type, entry.quantity)
            .await
        {
            Ok(item) => migrated.push(item),
            Err(err) => failed.push(MigrateFailure {
                state: entry.state.clone(),
                ad_type: entry.ad_type,
                quantity: entry.quantity,
                error: err.to_string(),
            }),
        }
    }
    Ok(HttpResponse::Ok().json(MigrateResponse { migrated, failed }))
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

pub async fn list_inventory(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let state = StateCode::parse(&path.into_inner())?;
    let units = data.inventory.get_by_state(&state).await?;
    Ok(HttpResponse::Ok().json(units))
}

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ApplyDiscountRequest {
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
struct QuoteResponse {
    cart: Cart,
    discount: DiscountResult,
    tax_cents: i64,
    total_cents: i64,
}

impl From<CheckoutQuote> for QuoteResponse {
    fn from(q: CheckoutQuote) -> Self {
        Self {
            cart: q.cart,
            discount: q.discount,
            tax_cents: q.tax_cents,
            total_cents: q.total_cents,
        }
    }
}

pub async fn apply_discount(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<ApplyDiscountRequest>,
) -> ApiResult<HttpResponse> {
    let user = current_user(&data, &req)?;
    let quote = data.checkout.quote(user, body.code.as_deref()).await?;
    Ok(HttpResponse::Ok().json(QuoteResponse::from(quote)))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub contact: Contact,
    pub code: Option<String>,
}

pub async fn start_checkout(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CheckoutRequest>,
) -> ApiResult<HttpResponse> {
    let user = current_user(&data, &req)?;
    let body = body.into_inner();
    if body.contact.name.trim().is_empty() || body.contact.email.trim().is_empty() {
        return Err(AppError::Validation("contact name and email are required".into()).into());
    }
    let (quote, intent) = data
        .checkout
        .start(user, body.contact, body.code.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "quote": QuoteResponse::from(quote),
        "intent": intent,
    })))
}

// ---------------------------------------------------------------------------
// Payment webhook
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PaymentEvent {
    pub intent_id: String,
    pub status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Payment-processor callback. Only `succeeded` events finalize; everything
/// else is acknowledged so the processor stops retrying.
pub async fn payment_webhook(
    data: web::Data<AppState>,
    body: web::Json<PaymentEvent>,
) -> ApiResult<HttpResponse> {
    let event = body.into_inner();
    if event.status != "succeeded" {
        log::info!(
            "ignoring payment event {} with status {}",
            event.intent_id,
            event.status
        );
        return Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "ignored" })));
    }

    let args = ll_commerce::checkout::parse_intent_metadata(&event.metadata)?;
    let order = data.checkout.finalize(&event.intent_id, args).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "order_id": order.order_id,
        "needs_reconciliation": order.needs_reconciliation,
    })))
}

// ---------------------------------------------------------------------------
// Creative uploads
// ---------------------------------------------------------------------------

/// Hard cap on a single creative file; the stream is refused as soon as it
/// would cross it, so an oversized upload never finishes buffering.
const MAX_CREATIVE_BYTES: usize = 20 * 1024 * 1024;

fn append_chunk(buf: &mut Vec<u8>, chunk: &[u8], field: &str) -> ApiResult<()> {
    if buf.len() + chunk.len() > MAX_CREATIVE_BYTES {
        return Err(AppError::Validation(format!(
            "upload field {field:?} exceeds the {MAX_CREATIVE_BYTES}-byte limit"
        ))
        .into());
    }
    buf.extend_from_slice(chunk);
    Ok(())
}

/// Multipart creative upload for one slot of a purchased item. Every file
/// field is stored under the canonical object key and recorded on the
/// order's upload-status map.
pub async fn upload_creative(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<(String, Uuid, u32)>,
    mut payload: Multipart,
) -> ApiResult<HttpResponse> {
    let user = current_user(&data, &req)?;
    let (order_id, item_id, slot) = path.into_inner();

    let order = data
        .orders
        .get_order(&order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("order".into(), order_id.clone()))?;
    if order.user_id != user {
        // Someone else's order looks like no order at all.
        return Err(AppError::NotFound("order".into(), order_id).into());
    }
    if !order.items.iter().any(|i| i.item_id == item_id) {
        return Err(AppError::NotFound("order item".into(), item_id.to_string()).into());
    }

    let mut uploaded: HashMap<String, String> = HashMap::new();
    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
    {
        let field_name = field.name().to_string();
        let filename = field
            .content_disposition()
            .get_filename()
            .map(str::to_string)
            .unwrap_or_else(|| field_name.clone());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk =
                chunk.map_err(|e| AppError::Validation(format!("upload stream error: {e}")))?;
            append_chunk(&mut bytes, &chunk, &field_name)?;
        }

        let url = data
            .submissions
            .store(&order_id, item_id, slot, &field_name, &filename, bytes)
            .await?;
        data.orders
            .set_upload_status(&order_id, item_id, slot, &field_name, &url)
            .await?;
        uploaded.insert(field_name, url);
    }

    if uploaded.is_empty() {
        return Err(AppError::Validation("no files in upload".into()).into());
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "uploaded": uploaded })))
}
