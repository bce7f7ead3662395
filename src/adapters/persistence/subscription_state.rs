use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::subscription::SubscriptionStateRepo,
    domain::entities::subscription_state::SubscriptionState,
};

pub(super) fn row_to_state(row: sqlx::postgres::PgRow) -> SubscriptionState {
    SubscriptionState {
        user_id: row.get("user_id"),
        status: row.get("status"),
        current_plan_id: row.get("current_plan_id"),
        expires_at: row.get("expires_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = "user_id, status, current_plan_id, expires_at, updated_at";

#[async_trait]
impl SubscriptionStateRepo for PostgresPersistence {
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<SubscriptionState>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscription_state WHERE user_id = $1",
            SELECT_COLS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_state))
    }

    async fn cancel_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SubscriptionState>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE subscription_state SET status = 'canceled', updated_at = $2
            WHERE user_id = $1 AND status = 'active'
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_state))
    }
}
