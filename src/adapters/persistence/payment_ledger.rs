use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::subscription::PaymentLedgerRepo,
    domain::entities::payment_intent::PaymentLedgerEntry,
};

pub(super) fn row_to_ledger_entry(row: sqlx::postgres::PgRow) -> PaymentLedgerEntry {
    PaymentLedgerEntry {
        id: row.get("id"),
        intent_id: row.get("intent_id"),
        user_id: row.get("user_id"),
        plan_id: row.get("plan_id"),
        provider: row.get("provider"),
        amount_cents: row.get("amount_cents"),
        currency: row.get("currency"),
        external_reference: row.get("external_reference"),
        completed_at: row.get("completed_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, intent_id, user_id, plan_id, provider, amount_cents, currency,
    external_reference, completed_at
"#;

#[async_trait]
impl PaymentLedgerRepo for PostgresPersistence {
    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<PaymentLedgerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM payment_ledger WHERE user_id = $1 ORDER BY completed_at DESC",
            SELECT_COLS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_ledger_entry).collect())
    }
}
