use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::{
        PostgresPersistence, payment_ledger::row_to_ledger_entry,
        subscription_state::row_to_state,
    },
    app_error::{AppError, AppResult},
    application::use_cases::reconciliation::{
        CompletePaymentInput, CompletionResult, CreateIntentInput, FailureResult,
        PaymentIntentRepo,
    },
    domain::entities::{
        payment_intent::{PaymentIntent, PaymentLedgerEntry},
        payment_provider::PaymentProvider,
        subscription_state::SubscriptionState,
    },
};

pub(super) fn row_to_intent(row: sqlx::postgres::PgRow) -> PaymentIntent {
    PaymentIntent {
        id: row.get("id"),
        user_id: row.get("user_id"),
        plan_id: row.get("plan_id"),
        provider: row.get("provider"),
        external_reference: row.get("external_reference"),
        amount_cents: row.get("amount_cents"),
        currency: row.get("currency"),
        status: row.get("status"),
        failure_reason: row.get("failure_reason"),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, user_id, plan_id, provider, external_reference, amount_cents, currency,
    status, failure_reason, created_at, completed_at
"#;

#[async_trait]
impl PaymentIntentRepo for PostgresPersistence {
    async fn create(&self, input: &CreateIntentInput) -> AppResult<PaymentIntent> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payment_intents (id, user_id, plan_id, provider, amount_cents, currency, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(input.plan_id)
        .bind(input.provider)
        .bind(input.amount_cents)
        .bind(&input.currency)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_intent(row))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<PaymentIntent>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_intents WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_intent))
    }

    async fn get_by_reference(
        &self,
        provider: PaymentProvider,
        external_reference: &str,
    ) -> AppResult<Option<PaymentIntent>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_intents WHERE provider = $1 AND external_reference = $2",
            SELECT_COLS
        ))
        .bind(provider)
        .bind(external_reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_intent))
    }

    async fn attach_external_reference(
        &self,
        id: Uuid,
        external_reference: &str,
    ) -> AppResult<PaymentIntent> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE payment_intents SET external_reference = $2
            WHERE id = $1 AND external_reference IS NULL
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(external_reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        row.map(row_to_intent).ok_or_else(|| {
            AppError::Internal(format!(
                "payment intent {id} missing or already has an external reference"
            ))
        })
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> AppResult<FailureResult> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE payment_intents SET status = 'failed', failure_reason = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;

        if let Some(row) = row {
            return Ok(FailureResult::Failed(row_to_intent(row)));
        }
        let current = self.get_by_id(id).await?.ok_or(AppError::UnknownIntent)?;
        Ok(FailureResult::AlreadyFinal(current))
    }

    async fn complete_and_activate(
        &self,
        input: &CompletePaymentInput,
    ) -> AppResult<CompletionResult> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        // Row lock: a concurrent completion blocks here and then sees the final status.
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_intents WHERE id = $1 FOR UPDATE",
            SELECT_COLS
        ))
        .bind(input.intent_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?;
        let intent = row.map(row_to_intent).ok_or(AppError::UnknownIntent)?;

        if intent.status.is_terminal() {
            tx.rollback().await.map_err(AppError::from)?;
            return Ok(CompletionResult::AlreadyFinal(intent));
        }
        let external_reference = intent.external_reference.clone().ok_or_else(|| {
            AppError::Internal(format!("payment intent {} has no external reference", intent.id))
        })?;

        let updated = sqlx::query(&format!(
            r#"
            UPDATE payment_intents SET status = 'completed', completed_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(intent.id)
        .bind(input.completed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from)?;
        let intent = row_to_intent(updated);

        let entry = PaymentLedgerEntry::for_intent(&intent, external_reference, input.completed_at);
        let ledger_row = sqlx::query(
            r#"
            INSERT INTO payment_ledger (
                id, intent_id, user_id, plan_id, provider, amount_cents, currency,
                external_reference, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, intent_id, user_id, plan_id, provider, amount_cents, currency,
                      external_reference, completed_at
            "#,
        )
        .bind(entry.id)
        .bind(entry.intent_id)
        .bind(entry.user_id)
        .bind(entry.plan_id)
        .bind(entry.provider)
        .bind(entry.amount_cents)
        .bind(&entry.currency)
        .bind(&entry.external_reference)
        .bind(entry.completed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from)?;
        let ledger_entry = row_to_ledger_entry(ledger_row);

        // Make sure the state row exists so it can be locked; two first payments
        // for the same user must not both extend from "now".
        sqlx::query(
            r#"
            INSERT INTO subscription_state (user_id, status, updated_at)
            VALUES ($1, 'free', $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(intent.user_id)
        .bind(input.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        let current_expires_at: Option<chrono::DateTime<chrono::Utc>> = sqlx::query(
            "SELECT expires_at FROM subscription_state WHERE user_id = $1 FOR UPDATE",
        )
        .bind(intent.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from)?
        .get("expires_at");

        let expires_at = SubscriptionState::extended_expiry(
            current_expires_at,
            input.completed_at,
            input.duration_days,
        );

        let state_row = sqlx::query(
            r#"
            UPDATE subscription_state
            SET status = 'active', current_plan_id = $2, expires_at = $3, updated_at = $4
            WHERE user_id = $1
            RETURNING user_id, status, current_plan_id, expires_at, updated_at
            "#,
        )
        .bind(intent.user_id)
        .bind(intent.plan_id)
        .bind(expires_at)
        .bind(input.completed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from)?;
        let subscription = row_to_state(state_row);

        tx.commit().await.map_err(AppError::from)?;

        Ok(CompletionResult::Completed {
            intent,
            ledger_entry,
            subscription,
        })
    }
}
