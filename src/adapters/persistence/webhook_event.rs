use async_trait::async_trait;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::{WebhookEventRecord, WebhookEventRepo},
};

#[async_trait]
impl WebhookEventRepo for PostgresPersistence {
    async fn record(&self, event: &WebhookEventRecord) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (
                id, provider, event_id, external_reference, outcome, payload, received_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (provider, event_id) WHERE event_id IS NOT NULL DO NOTHING
            "#,
        )
        .bind(event.id)
        .bind(event.provider)
        .bind(&event.event_id)
        .bind(&event.external_reference)
        .bind(event.outcome.as_ref())
        .bind(&event.payload)
        .bind(event.received_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                provider = %event.provider,
                event_id = ?event.event_id,
                "Webhook event already recorded"
            );
        }
        Ok(())
    }
}
