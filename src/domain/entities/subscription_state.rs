use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
    EnumString, Default,
)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Free,
    Active,
    /// Canceled by the user; paid time runs out at `expires_at`.
    Canceled,
    /// Set by the external expiry sweep, never by this crate.
    Expired,
}

/// Per-user subscription snapshot. Users without a stored row are `free`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionState {
    pub user_id: Uuid,
    pub status: SubscriptionStatus,
    pub current_plan_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SubscriptionState {
    pub fn free(user_id: Uuid) -> Self {
        Self {
            user_id,
            status: SubscriptionStatus::Free,
            current_plan_id: None,
            expires_at: None,
            updated_at: None,
        }
    }

    /// New expiry after a payment of `duration_days` completes at `now`.
    ///
    /// Unexpired time is never lost: the period is added to whichever is later,
    /// `now` or the current expiry.
    pub fn extended_expiry(
        current_expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        duration_days: i32,
    ) -> DateTime<Utc> {
        let base = match current_expires_at {
            Some(expires_at) if expires_at > now => expires_at,
            _ => now,
        };
        base + Duration::days(i64::from(duration_days))
    }

    /// Whether paid features are available at `now`. Canceled subscriptions keep
    /// access until they run out.
    pub fn grants_access(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Active | SubscriptionStatus::Canceled
        ) && self.expires_at.is_some_and(|expires_at| expires_at > now)
    }
}
