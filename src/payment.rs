//! Payment collection for paid enrollments.
//!
//! No real provider is integrated; [`SimulatedGateway`] stands in for one, waiting a configured
//! delay before approving the charge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing_futures::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::PaymentError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Card
    }
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub course_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub amount: f64,
    pub currency: String,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaymentReceipt {
    pub reference: String,
    pub amount: f64,
    pub currency: String,
    pub method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
}

#[rocket::async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentReceipt, PaymentError>;

    async fn refund(&self, receipt: &PaymentReceipt) -> Result<(), PaymentError>;
}

pub struct SimulatedGateway {
    delay: Duration,
}

impl SimulatedGateway {
    pub fn new(delay: Duration) -> SimulatedGateway {
        SimulatedGateway { delay }
    }
}

#[rocket::async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentReceipt, PaymentError> {
        let span = tracing::info_span!(
            "simulated_payment",
            course = %request.course_id,
            user = %request.user_id
        );

        async {
            if !request.amount.is_finite() || request.amount < 0.0 {
                return Err(PaymentError::Declined {
                    amount: request.amount,
                    currency: request.currency.clone(),
                    reason: "invalid amount".to_string(),
                });
            }

            tracing::debug!("processing payment for {}", request.email);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let receipt = PaymentReceipt {
                reference: format!("SIM-{}", Uuid::new_v4().simple()),
                amount: request.amount,
                currency: request.currency.clone(),
                method: request.method,
                paid_at: Utc::now(),
            };
            tracing::info!("payment {} approved", receipt.reference);
            Ok(receipt)
        }
        .instrument(span)
        .await
    }

    async fn refund(&self, receipt: &PaymentReceipt) -> Result<(), PaymentError> {
        tracing::info!(
            "refunded payment {} ({} {})",
            receipt.reference,
            receipt.amount,
            receipt.currency
        );
        Ok(())
    }
}
