//! # Admin Handlers
//!
//! Operator endpoints guarded by the `X-Admin-Key` header. The key is
//! verified against an Argon2 hash by the identity plugin, so a stolen
//! config file does not leak the key itself.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use ll_core::discounts::normalize_code;
use ll_core::error::AppError;
use ll_core::models::{AdType, BundleDeal, CodeKind, DiscountCode, InventoryUnit};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::handlers::AppState;

const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

fn require_admin(data: &AppState, req: &HttpRequest) -> ApiResult<()> {
    let key = req
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing admin key".into()))?;
    if data.identity.verify_admin_key(key) {
        Ok(())
    } else {
        Err(AppError::Unauthorized("bad admin key".into()).into())
    }
}

// ---------------------------------------------------------------------------
// Inventory provisioning
// ---------------------------------------------------------------------------

pub async fn update_inventory(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<InventoryUnit>,
) -> ApiResult<HttpResponse> {
    require_admin(&data, &req)?;
    let unit = body.into_inner();
    if unit.total_slots < 0 || unit.remaining_slots < 0 || unit.remaining_slots > unit.total_slots {
        return Err(AppError::Validation(
            "remaining_slots must be within 0..=total_slots".into(),
        )
        .into());
    }
    if unit.price_cents < 0 {
        return Err(AppError::Validation("price_cents must not be negative".into()).into());
    }
    data.inventory.upsert(unit.clone()).await?;
    log::info!(
        "inventory upsert: {}/{} {} slots at {} cents",
        unit.state_code,
        unit.ad_type,
        unit.total_slots,
        unit.price_cents
    );
    Ok(HttpResponse::Ok().json(unit))
}

// ---------------------------------------------------------------------------
// Discount codes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
    pub kind: CodeKind,
    pub value: i64,
    #[serde(default)]
    pub min_order_cents: i64,
    pub max_uses: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

fn code_from_request(req: CodeRequest) -> Result<DiscountCode, AppError> {
    let code = normalize_code(&req.code);
    if code.is_empty() {
        return Err(AppError::Validation("code must not be empty".into()));
    }
    if req.value < 0 || (req.kind == CodeKind::Percent && req.value > 100) {
        return Err(AppError::Validation("code value out of range".into()));
    }
    Ok(DiscountCode {
        code,
        kind: req.kind,
        value: req.value,
        min_order_cents: req.min_order_cents,
        max_uses: req.max_uses,
        current_uses: 0,
        expires_at: req.expires_at,
        active: req.active,
    })
}

pub async fn list_codes(data: web::Data<AppState>, req: HttpRequest) -> ApiResult<HttpResponse> {
    require_admin(&data, &req)?;
    let codes = data.discounts.list_codes().await?;
    Ok(HttpResponse::Ok().json(codes))
}

pub async fn create_code(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CodeRequest>,
) -> ApiResult<HttpResponse> {
    require_admin(&data, &req)?;
    let code = code_from_request(body.into_inner())?;
    data.discounts.put_code(code.clone()).await?;
    Ok(HttpResponse::Created().json(code))
}

pub async fn update_code(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<CodeRequest>,
) -> ApiResult<HttpResponse> {
    require_admin(&data, &req)?;
    let key = normalize_code(&path.into_inner());
    let existing = data
        .discounts
        .get_code(&key)
        .await?
        .ok_or_else(|| AppError::NotFound("discount code".into(), key.clone()))?;

    let mut code = code_from_request(body.into_inner())?;
    // The path names the code being updated; the body cannot rename it,
    // and accumulated usage carries over.
    code.code = key;
    code.current_uses = existing.current_uses;
    data.discounts.put_code(code.clone()).await?;
    Ok(HttpResponse::Ok().json(code))
}

pub async fn delete_code(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    require_admin(&data, &req)?;
    let key = normalize_code(&path.into_inner());
    if data.discounts.delete_code(&key).await? {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(AppError::NotFound("discount code".into(), key).into())
    }
}

// ---------------------------------------------------------------------------
// Bundle deals
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DealRequest {
    pub ad_type: AdType,
    pub min_quantity: i64,
    pub discount_percent: i64,
    #[serde(default = "default_true")]
    pub active: bool,
}

pub async fn list_deals(data: web::Data<AppState>, req: HttpRequest) -> ApiResult<HttpResponse> {
    require_admin(&data, &req)?;
    let deals = data.discounts.list_deals().await?;
    Ok(HttpResponse::Ok().json(deals))
}

pub async fn create_deal(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<DealRequest>,
) -> ApiResult<HttpResponse> {
    require_admin(&data, &req)?;
    let body = body.into_inner();
    if body.min_quantity < 1 {
        return Err(AppError::Validation("min_quantity must be at least 1".into()).into());
    }
    if !(0..=100).contains(&body.discount_percent) {
        return Err(AppError::Validation("discount_percent must be 0..=100".into()).into());
    }
    let deal = BundleDeal {
        id: Uuid::new_v4(),
        ad_type: body.ad_type,
        min_quantity: body.min_quantity,
        discount_percent: body.discount_percent,
        active: body.active,
    };
    data.discounts.put_deal(deal.clone()).await?;
    Ok(HttpResponse::Created().json(deal))
}

pub async fn delete_deal(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    require_admin(&data, &req)?;
    let id = path.into_inner();
    if data.discounts.delete_deal(id).await? {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(AppError::NotFound("bundle deal".into(), id.to_string()).into())
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Cron-style entry point: releases every reservation past its expiry.
pub async fn sweep_reservations(
    data: web::Data<AppState>,
    req: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_admin(&data, &req)?;
    let released = data.ledger.sweep_expired(Utc::now()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "released": released })))
}

pub async fn get_order(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    require_admin(&data, &req)?;
    let order_id = path.into_inner();
    let order = data
        .orders
        .get_order(&order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("order".into(), order_id))?;
    Ok(HttpResponse::Ok().json(order))
}
