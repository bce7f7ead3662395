use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::SubscriptionPlanRepo,
    domain::entities::{
        payment_intent::PaymentLedgerEntry,
        subscription_plan::SubscriptionPlan,
        subscription_state::{SubscriptionState, SubscriptionStatus},
    },
};

// ============================================================================
// Types
// ============================================================================

/// Read-only quota view used by campaign checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entitlement {
    pub status: SubscriptionStatus,
    pub plan_id: Option<Uuid>,
    pub has_access: bool,
    pub max_campaigns: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait SubscriptionStateRepo: Send + Sync {
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<SubscriptionState>>;
    /// `active -> canceled`, keeping `expires_at`. Returns `None` when the user
    /// has no active subscription.
    async fn cancel_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SubscriptionState>>;
}

#[async_trait]
pub trait PaymentLedgerRepo: Send + Sync {
    /// Newest first.
    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<PaymentLedgerEntry>>;
}

// ============================================================================
// Use Cases
// ============================================================================

pub struct SubscriptionUseCases {
    state_repo: Arc<dyn SubscriptionStateRepo>,
    ledger_repo: Arc<dyn PaymentLedgerRepo>,
    plan_repo: Arc<dyn SubscriptionPlanRepo>,
    free_campaign_limit: i32,
}

impl SubscriptionUseCases {
    pub fn new(
        state_repo: Arc<dyn SubscriptionStateRepo>,
        ledger_repo: Arc<dyn PaymentLedgerRepo>,
        plan_repo: Arc<dyn SubscriptionPlanRepo>,
        free_campaign_limit: i32,
    ) -> Self {
        Self {
            state_repo,
            ledger_repo,
            plan_repo,
            free_campaign_limit,
        }
    }

    pub async fn get_status(&self, user_id: Uuid) -> AppResult<SubscriptionState> {
        Ok(self
            .state_repo
            .get_by_user(user_id)
            .await?
            .unwrap_or_else(|| SubscriptionState::free(user_id)))
    }

    /// Stop renewal intent; paid time stays usable until `expires_at`.
    pub async fn cancel(&self, user_id: Uuid) -> AppResult<SubscriptionState> {
        let state = self
            .state_repo
            .cancel_active(user_id, Utc::now())
            .await?
            .ok_or(AppError::NoActiveSubscription)?;

        tracing::info!(
            user_id = %user_id,
            expires_at = ?state.expires_at,
            "Subscription canceled"
        );
        Ok(state)
    }

    pub async fn list_plans(&self) -> AppResult<Vec<SubscriptionPlan>> {
        self.plan_repo.list_active().await
    }

    pub async fn list_payments(&self, user_id: Uuid) -> AppResult<Vec<PaymentLedgerEntry>> {
        self.ledger_repo.list_by_user(user_id).await
    }

    pub async fn entitlement(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<Entitlement> {
        let state = self.get_status(user_id).await?;
        let has_access = state.grants_access(now);

        let plan_limit = match (has_access, state.current_plan_id) {
            (true, Some(plan_id)) => self
                .plan_repo
                .get_by_id(plan_id)
                .await?
                .map(|plan| plan.max_campaigns),
            _ => None,
        };

        Ok(Entitlement {
            status: state.status,
            plan_id: state.current_plan_id,
            has_access,
            max_campaigns: plan_limit.unwrap_or(self.free_campaign_limit),
            expires_at: state.expires_at,
        })
    }
}
