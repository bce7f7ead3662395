use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_json_with_fallback},
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::SubscriptionPlanRepo,
    domain::entities::subscription_plan::SubscriptionPlan,
};

fn row_to_plan(row: sqlx::postgres::PgRow) -> SubscriptionPlan {
    let id: Uuid = row.get("id");
    let features_json: serde_json::Value = row.get("features");
    let features: Vec<String> =
        parse_json_with_fallback(&features_json, "features", "subscription_plan", &id.to_string());

    SubscriptionPlan {
        id,
        code: row.get("code"),
        name: row.get("name"),
        price_cents: row.get("price_cents"),
        currency: row.get("currency"),
        duration_days: row.get("duration_days"),
        max_campaigns: row.get("max_campaigns"),
        features,
        is_active: row.get("is_active"),
    }
}

const SELECT_COLS: &str = r#"
    id, code, name, price_cents, currency, duration_days, max_campaigns, features, is_active
"#;

#[async_trait]
impl SubscriptionPlanRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<SubscriptionPlan>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscription_plans WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_plan))
    }

    async fn list_active(&self) -> AppResult<Vec<SubscriptionPlan>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscription_plans WHERE is_active = TRUE ORDER BY price_cents ASC, code ASC",
            SELECT_COLS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_plan).collect())
    }
}
