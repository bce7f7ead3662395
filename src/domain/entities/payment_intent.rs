use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{payment_provider::PaymentProvider, payment_status::PaymentStatus};

/// A tracked attempt to pay for a plan, whether or not it ends up succeeding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub provider: PaymentProvider,
    /// Assigned by the provider once the intent is created on its side.
    pub external_reference: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Append-only record of a completed payment; exactly one per completed intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentLedgerEntry {
    pub id: Uuid,
    pub intent_id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub provider: PaymentProvider,
    pub amount_cents: i64,
    pub currency: String,
    pub external_reference: String,
    pub completed_at: DateTime<Utc>,
}

impl PaymentLedgerEntry {
    /// Ledger entry for `intent` completing at `completed_at`.
    pub fn for_intent(
        intent: &PaymentIntent,
        external_reference: String,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            intent_id: intent.id,
            user_id: intent.user_id,
            plan_id: intent.plan_id,
            provider: intent.provider,
            amount_cents: intent.amount_cents,
            currency: intent.currency.clone(),
            external_reference,
            completed_at,
        }
    }
}
