//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::domain::entities::{
    payment_intent::PaymentIntent, payment_provider::PaymentProvider,
    payment_status::PaymentStatus, subscription_plan::SubscriptionPlan,
};

/// Create a test subscription plan with sensible defaults.
pub fn create_test_plan(overrides: impl FnOnce(&mut SubscriptionPlan)) -> SubscriptionPlan {
    let mut plan = SubscriptionPlan {
        id: Uuid::new_v4(),
        code: "pro".to_string(),
        name: "Pro".to_string(),
        price_cents: 2999,
        currency: "USD".to_string(),
        duration_days: 30,
        max_campaigns: 25,
        features: vec!["Unlimited donors".to_string(), "Custom branding".to_string()],
        is_active: true,
    };
    overrides(&mut plan);
    plan
}

/// Create a pending payment intent with a provider reference attached.
pub fn create_test_intent(overrides: impl FnOnce(&mut PaymentIntent)) -> PaymentIntent {
    let id = Uuid::new_v4();
    let mut intent = PaymentIntent {
        id,
        user_id: Uuid::new_v4(),
        plan_id: Uuid::new_v4(),
        provider: PaymentProvider::Card,
        external_reference: Some(format!("ref_{}", id.simple())),
        amount_cents: 2999,
        currency: "USD".to_string(),
        status: PaymentStatus::Pending,
        failure_reason: None,
        created_at: test_datetime(),
        completed_at: None,
    };
    overrides(&mut intent);
    intent
}

/// A fixed timestamp for deterministic tests.
pub fn test_datetime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
        .single()
        .expect("valid test datetime")
}
