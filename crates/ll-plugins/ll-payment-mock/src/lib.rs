//! # ll-payment-mock
//!
//! Mock implementation of `PaymentProvider`. Produces intent ids and client
//! secrets shaped like the real processor's so the checkout flow, webhook
//! handler, and frontend wiring can be exercised without network access.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use ll_core::error::{AppError, Result};
use ll_core::models::PaymentIntent;
use ll_core::traits::PaymentProvider;

pub struct MockPaymentProvider {
    /// Simulated merchant account id, echoed into logs only.
    account_id: String,
}

impl MockPaymentProvider {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
        }
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<PaymentIntent> {
        if amount_cents <= 0 {
            return Err(AppError::Payment(format!(
                "intent amount must be positive, got {amount_cents}"
            )));
        }

        let id = format!("mock_pi_{}", Uuid::new_v4().simple());
        log::info!(
            "mock payment: opened intent {id} for {amount_cents} {currency} on account {} ({} metadata keys)",
            self.account_id,
            metadata.len()
        );

        Ok(PaymentIntent {
            client_secret: Some(format!("{id}_secret_{}", Uuid::new_v4().simple())),
            id,
            amount_cents,
            currency: currency.to_string(),
        })
    }
}
