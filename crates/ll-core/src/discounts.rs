//! # Discount Engine
//!
//! Pure computation over cart contents plus an optional code. No I/O: the
//! caller fetches the code row and the active bundle deals, this module only
//! decides amounts and picks the winner.
//!
//! Pinned rules (the call sites left these open):
//! - a bundle discount applies to the subtotal of its own ad type only;
//! - when several bundles qualify, the largest amount wins, exact ties broken
//!   by smallest deal id so the result is deterministic;
//! - bundle vs. code ties go to the code, since the customer typed it.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    AdType, BundleDeal, CartItem, CodeKind, DiscountCode, DiscountKind, DiscountResult,
};

/// Normalizes a user-entered code to its case-insensitive lookup key.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Sum of `quantity * unit_price_cents` over all items.
pub fn subtotal(items: &[CartItem]) -> i64 {
    items
        .iter()
        .map(|item| item.quantity * item.unit_price_cents)
        .sum()
}

/// Subtotal restricted to one ad type.
pub fn subtotal_for_type(items: &[CartItem], ad_type: AdType) -> i64 {
    items
        .iter()
        .filter(|item| item.ad_type == ad_type)
        .map(|item| item.quantity * item.unit_price_cents)
        .sum()
}

fn quantity_for_type(items: &[CartItem], ad_type: AdType) -> i64 {
    items
        .iter()
        .filter(|item| item.ad_type == ad_type)
        .map(|item| item.quantity)
        .sum()
}

/// The winning automatic bundle, if any deal's quantity threshold is met.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleResult {
    pub deal_id: Uuid,
    pub ad_type: AdType,
    pub amount_cents: i64,
}

/// Evaluates every active bundle deal against the cart and returns the single
/// deterministic winner: largest discount amount, ties broken by smallest id.
pub fn evaluate_bundle(items: &[CartItem], deals: &[BundleDeal]) -> Option<BundleResult> {
    deals
        .iter()
        .filter(|deal| deal.active)
        .filter(|deal| quantity_for_type(items, deal.ad_type) >= deal.min_quantity)
        .map(|deal| BundleResult {
            deal_id: deal.id,
            ad_type: deal.ad_type,
            amount_cents: subtotal_for_type(items, deal.ad_type) * deal.discount_percent / 100,
        })
        .filter(|result| result.amount_cents > 0)
        .max_by(|a, b| {
            a.amount_cents
                .cmp(&b.amount_cents)
                // Reversed id comparison: max_by keeps the "greater" element,
                // and on equal amounts we want the smaller id to win.
                .then_with(|| b.deal_id.cmp(&a.deal_id))
        })
}

/// Checks a code row against the cart subtotal and the clock.
pub fn validate_code(code: &DiscountCode, subtotal_cents: i64, now: DateTime<Utc>) -> Result<()> {
    if !code.active {
        return Err(AppError::CodeInactive(code.code.clone()));
    }
    if let Some(expires_at) = code.expires_at {
        if expires_at < now {
            return Err(AppError::CodeExpired(code.code.clone()));
        }
    }
    if subtotal_cents < code.min_order_cents {
        return Err(AppError::BelowMinimum {
            min_order_cents: code.min_order_cents,
            subtotal_cents,
        });
    }
    if let Some(max_uses) = code.max_uses {
        if code.current_uses >= max_uses {
            return Err(AppError::UsesExceeded(code.code.clone()));
        }
    }
    Ok(())
}

/// Discount amount for a validated code. Fixed codes are capped at the
/// subtotal so the order total can never go negative.
pub fn code_discount(code: &DiscountCode, subtotal_cents: i64) -> i64 {
    match code.kind {
        CodeKind::Percent => subtotal_cents * code.value / 100,
        CodeKind::Fixed => code.value.min(subtotal_cents),
    }
}

/// Computes both discount candidates and returns the better one.
///
/// The bundle is always evaluated; the code only participates when supplied,
/// and an invalid code is an error rather than a silent fallback so the
/// customer learns why their code did not apply. Exact ties favor the code.
pub fn best_discount(
    items: &[CartItem],
    subtotal_cents: i64,
    code: Option<&DiscountCode>,
    deals: &[BundleDeal],
    now: DateTime<Utc>,
) -> Result<DiscountResult> {
    let bundle = evaluate_bundle(items, deals);

    let code_amount = match code {
        Some(code) => {
            validate_code(code, subtotal_cents, now)?;
            Some(code_discount(code, subtotal_cents))
        }
        None => None,
    };

    Ok(match (bundle, code_amount) {
        (Some(bundle), Some(amount)) if bundle.amount_cents > amount => bundle_result(bundle),
        (Some(bundle), None) => bundle_result(bundle),
        (_, Some(amount)) => DiscountResult {
            kind: DiscountKind::Code,
            amount_cents: amount,
            code: code.map(|c| c.code.clone()),
            deal_id: None,
        },
        (None, None) => DiscountResult::none(),
    })
}

fn bundle_result(bundle: BundleResult) -> DiscountResult {
    DiscountResult {
        kind: DiscountKind::Bundle,
        amount_cents: bundle.amount_cents,
        code: None,
        deal_id: Some(bundle.deal_id),
    }
}
