use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::payment_provider::{
            ClientPayload, ExternalReference, IntentRequest, ProviderOutcome, ProviderSelection,
        },
        reference_locks::ReferenceLocks,
        use_cases::provider_registry::ProviderRegistry,
    },
    domain::entities::{
        payment_intent::{PaymentIntent, PaymentLedgerEntry},
        payment_provider::PaymentProvider,
        payment_status::{ClaimedOutcome, PaymentStatus},
        subscription_plan::SubscriptionPlan,
        subscription_state::SubscriptionState,
    },
    infra::webhook_verifier::{VerifiedEvent, WebhookVerifier},
};

// ============================================================================
// Input / Result Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct CreateIntentInput {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub provider: PaymentProvider,
    pub amount_cents: i64,
    pub currency: String,
}

/// Everything the store needs to complete an intent in one atomic unit.
#[derive(Debug, Clone)]
pub struct CompletePaymentInput {
    pub intent_id: Uuid,
    pub duration_days: i32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum CompletionResult {
    /// This call moved the intent to `completed`.
    Completed {
        intent: PaymentIntent,
        ledger_entry: PaymentLedgerEntry,
        subscription: SubscriptionState,
    },
    /// Someone else already finalised the intent; nothing was written.
    AlreadyFinal(PaymentIntent),
}

#[derive(Debug, Clone)]
pub enum FailureResult {
    Failed(PaymentIntent),
    AlreadyFinal(PaymentIntent),
}

/// Audit row for an authenticated webhook.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEventRecord {
    pub id: Uuid,
    pub provider: PaymentProvider,
    pub event_id: Option<String>,
    pub external_reference: String,
    pub outcome: ClaimedOutcome,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl WebhookEventRecord {
    pub fn from_event(event: &VerifiedEvent, received_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: event.provider,
            event_id: event.event_id.clone(),
            external_reference: event.external_reference.to_string(),
            outcome: event.outcome,
            payload: event.raw_payload.clone(),
            received_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiateResult {
    pub intent: PaymentIntent,
    pub client_payload: ClientPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmResult {
    pub intent: PaymentIntent,
    /// Present when this call activated the subscription.
    pub subscription: Option<SubscriptionState>,
    /// The intent was already terminal; the stored result was returned untouched.
    pub already_processed: bool,
    /// The provider could not be reached. The intent is untouched and the
    /// caller should deliver the confirmation again later.
    pub retry_later: bool,
}

impl ConfirmResult {
    fn replayed(intent: PaymentIntent) -> Self {
        Self {
            intent,
            subscription: None,
            already_processed: true,
            retry_later: false,
        }
    }

    fn unchanged(intent: PaymentIntent) -> Self {
        Self {
            intent,
            subscription: None,
            already_processed: false,
            retry_later: false,
        }
    }

    fn deferred(intent: PaymentIntent) -> Self {
        Self {
            retry_later: true,
            ..Self::unchanged(intent)
        }
    }

    pub fn status(&self) -> PaymentStatus {
        self.intent.status
    }
}

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait SubscriptionPlanRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<SubscriptionPlan>>;
    /// Active plans, cheapest first.
    async fn list_active(&self) -> AppResult<Vec<SubscriptionPlan>>;
}

#[async_trait]
pub trait PaymentIntentRepo: Send + Sync {
    async fn create(&self, input: &CreateIntentInput) -> AppResult<PaymentIntent>;
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<PaymentIntent>>;
    async fn get_by_reference(
        &self,
        provider: PaymentProvider,
        external_reference: &str,
    ) -> AppResult<Option<PaymentIntent>>;
    /// Set the provider's reference on an intent that has none yet.
    async fn attach_external_reference(
        &self,
        id: Uuid,
        external_reference: &str,
    ) -> AppResult<PaymentIntent>;
    /// `pending -> failed`. Terminal intents are returned as they are.
    async fn mark_failed(&self, id: Uuid, reason: &str) -> AppResult<FailureResult>;
    /// `pending -> completed`, append the ledger entry and extend the user's
    /// subscription, all or nothing. Terminal intents are returned as they are.
    async fn complete_and_activate(
        &self,
        input: &CompletePaymentInput,
    ) -> AppResult<CompletionResult>;
}

#[async_trait]
pub trait WebhookEventRepo: Send + Sync {
    /// Store the event. Redeliveries of a provider event id are ignored.
    async fn record(&self, event: &WebhookEventRecord) -> AppResult<()>;
}

// ============================================================================
// Use Cases
// ============================================================================

type ReferenceKey = (PaymentProvider, String);

enum Verification {
    Answered(ProviderOutcome),
    Unreachable,
}

pub struct ReconciliationUseCases {
    plan_repo: Arc<dyn SubscriptionPlanRepo>,
    intent_repo: Arc<dyn PaymentIntentRepo>,
    webhook_event_repo: Arc<dyn WebhookEventRepo>,
    providers: Arc<ProviderRegistry>,
    verifier: Arc<WebhookVerifier>,
    locks: ReferenceLocks<ReferenceKey>,
    verify_timeout: Duration,
}

impl ReconciliationUseCases {
    pub fn new(
        plan_repo: Arc<dyn SubscriptionPlanRepo>,
        intent_repo: Arc<dyn PaymentIntentRepo>,
        webhook_event_repo: Arc<dyn WebhookEventRepo>,
        providers: Arc<ProviderRegistry>,
        verifier: Arc<WebhookVerifier>,
        verify_timeout: Duration,
    ) -> Self {
        Self {
            plan_repo,
            intent_repo,
            webhook_event_repo,
            providers,
            verifier,
            locks: ReferenceLocks::new(),
            verify_timeout,
        }
    }

    /// Start a payment for `plan_id` with the selected provider.
    ///
    /// The intent is persisted before the provider is contacted, so every
    /// provider-side attempt has a local record.
    pub async fn initiate(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        selection: ProviderSelection,
    ) -> AppResult<InitiateResult> {
        let plan = self
            .plan_repo
            .get_by_id(plan_id)
            .await?
            .ok_or(AppError::PlanNotFound)?;
        if !plan.is_active {
            return Err(AppError::PlanInactive);
        }

        let provider = selection.provider();
        let adapter = self.providers.get(provider);

        let intent = self
            .intent_repo
            .create(&CreateIntentInput {
                user_id,
                plan_id,
                provider,
                amount_cents: plan.price_cents,
                currency: plan.currency.to_uppercase(),
            })
            .await?;

        let request = IntentRequest {
            intent_id: intent.id,
            user_id,
            plan_id,
            amount_cents: intent.amount_cents,
            currency: intent.currency.clone(),
            description: format!("{} subscription", plan.name),
            selection,
        };

        let created = match adapter.create_intent(&request).await {
            Ok(created) => created,
            Err(err) => {
                tracing::warn!(
                    intent_id = %intent.id,
                    user_id = %user_id,
                    provider = %provider,
                    error = %err,
                    "Provider failed to create payment intent"
                );
                if let Err(mark_err) = self
                    .intent_repo
                    .mark_failed(intent.id, &err.to_string())
                    .await
                {
                    tracing::error!(
                        intent_id = %intent.id,
                        error = %mark_err,
                        "Failed to mark payment intent as failed"
                    );
                }
                return Err(err);
            }
        };

        let intent = self
            .intent_repo
            .attach_external_reference(intent.id, created.external_reference.as_str())
            .await?;

        tracing::info!(
            intent_id = %intent.id,
            user_id = %user_id,
            plan_id = %plan_id,
            provider = %provider,
            external_reference = %created.external_reference,
            "Payment intent created"
        );

        Ok(InitiateResult {
            intent,
            client_payload: created.client_payload,
        })
    }

    /// Reconcile a payment against the provider's own record.
    ///
    /// `claimed` is whatever the calling channel believes happened and is only
    /// used for logging. Concurrent calls for the same reference are serialized;
    /// whoever commits first wins and everyone else gets the stored result.
    pub async fn confirm(
        &self,
        provider: PaymentProvider,
        external_reference: &ExternalReference,
        claimed: ClaimedOutcome,
    ) -> AppResult<ConfirmResult> {
        let _guard = self
            .locks
            .acquire(&(provider, external_reference.as_str().to_string()))
            .await;

        let intent = self
            .intent_repo
            .get_by_reference(provider, external_reference.as_str())
            .await?
            .ok_or_else(|| {
                tracing::warn!(
                    provider = %provider,
                    external_reference = %external_reference,
                    "Confirmation for unknown payment intent, possible forged callback"
                );
                AppError::UnknownIntent
            })?;

        if intent.status.is_terminal() {
            tracing::debug!(
                intent_id = %intent.id,
                status = %intent.status,
                "Payment intent already final, returning stored result"
            );
            return Ok(ConfirmResult::replayed(intent));
        }

        let outcome = match self.verify_with_provider(provider, external_reference).await? {
            Verification::Answered(outcome) => outcome,
            Verification::Unreachable => return Ok(ConfirmResult::deferred(intent)),
        };

        let disagrees = matches!(
            (claimed, outcome),
            (ClaimedOutcome::Succeeded, ProviderOutcome::Failed | ProviderOutcome::Pending)
                | (ClaimedOutcome::Failed, ProviderOutcome::Succeeded)
        );
        if disagrees {
            tracing::warn!(
                intent_id = %intent.id,
                provider = %provider,
                claimed = %claimed,
                outcome = ?outcome,
                "Claimed outcome disagrees with provider"
            );
        }

        match outcome {
            ProviderOutcome::Succeeded => self.complete(intent).await,
            ProviderOutcome::Failed => self.fail(intent, "declined by provider").await,
            ProviderOutcome::Pending => {
                tracing::debug!(intent_id = %intent.id, "Payment still pending at provider");
                Ok(ConfirmResult::unchanged(intent))
            }
        }
    }

    /// Client-side confirmation. Only the user who started the payment may
    /// trigger reconciliation for it.
    pub async fn confirm_for_user(
        &self,
        user_id: Uuid,
        provider: PaymentProvider,
        external_reference: &ExternalReference,
        claimed: ClaimedOutcome,
    ) -> AppResult<ConfirmResult> {
        if let Some(intent) = self
            .intent_repo
            .get_by_reference(provider, external_reference.as_str())
            .await?
            && intent.user_id != user_id
        {
            tracing::warn!(
                intent_id = %intent.id,
                user_id = %user_id,
                "Confirmation for another user's payment intent"
            );
            return Err(AppError::UnknownIntent);
        }

        self.confirm(provider, external_reference, claimed).await
    }

    /// Redirect-callback path: capture the approved payment, then confirm it.
    pub async fn settle_and_confirm(
        &self,
        provider: PaymentProvider,
        external_reference: &ExternalReference,
    ) -> AppResult<ConfirmResult> {
        let intent = self
            .intent_repo
            .get_by_reference(provider, external_reference.as_str())
            .await?
            .ok_or(AppError::UnknownIntent)?;

        if !intent.status.is_terminal() {
            let adapter = self.providers.get(provider);
            if let Err(err) = adapter.settle(external_reference).await {
                // The provider stays the source of truth; confirm reads what actually happened.
                tracing::warn!(
                    intent_id = %intent.id,
                    provider = %provider,
                    error = %err,
                    "Settling payment failed"
                );
            }
        }

        self.confirm(provider, external_reference, ClaimedOutcome::Succeeded)
            .await
    }

    /// Authenticate a provider webhook, keep it for audit, then reconcile.
    pub async fn handle_webhook(
        &self,
        provider: PaymentProvider,
        raw_body: &[u8],
        headers: &HeaderMap,
    ) -> AppResult<ConfirmResult> {
        let event = self
            .verifier
            .verify(provider, raw_body, headers)
            .inspect_err(|err| {
                tracing::warn!(provider = %provider, error = %err, "Rejected webhook");
            })?;

        tracing::info!(
            provider = %provider,
            external_reference = %event.external_reference,
            outcome = %event.outcome,
            event_id = ?event.event_id,
            "Webhook authenticated"
        );

        let known = self
            .intent_repo
            .get_by_reference(event.provider, event.external_reference.as_str())
            .await?;
        if known.is_none() {
            tracing::warn!(
                provider = %provider,
                external_reference = %event.external_reference,
                "Authenticated webhook for unknown payment intent"
            );
            return Err(AppError::UnknownIntent);
        }

        self.webhook_event_repo
            .record(&WebhookEventRecord::from_event(&event, Utc::now()))
            .await?;

        self.confirm(event.provider, &event.external_reference, event.outcome)
            .await
    }

    /// Ask the provider. Outages and timeouts come back as `Unreachable`.
    async fn verify_with_provider(
        &self,
        provider: PaymentProvider,
        external_reference: &ExternalReference,
    ) -> AppResult<Verification> {
        let adapter = self.providers.get(provider);
        match tokio::time::timeout(self.verify_timeout, adapter.verify_intent(external_reference))
            .await
        {
            Ok(Err(AppError::ProviderUnavailable(msg))) => {
                tracing::warn!(
                    provider = %provider,
                    external_reference = %external_reference,
                    error = %msg,
                    "Provider unavailable during verification, leaving intent pending"
                );
                Ok(Verification::Unreachable)
            }
            Ok(result) => result.map(Verification::Answered),
            Err(_) => {
                tracing::warn!(
                    provider = %provider,
                    external_reference = %external_reference,
                    timeout_ms = self.verify_timeout.as_millis() as u64,
                    "Provider verification timed out, leaving intent pending"
                );
                Ok(Verification::Unreachable)
            }
        }
    }

    async fn complete(&self, intent: PaymentIntent) -> AppResult<ConfirmResult> {
        let plan = self
            .plan_repo
            .get_by_id(intent.plan_id)
            .await?
            .ok_or(AppError::PlanNotFound)?;

        let result = self
            .intent_repo
            .complete_and_activate(&CompletePaymentInput {
                intent_id: intent.id,
                duration_days: plan.duration_days,
                completed_at: Utc::now(),
            })
            .await?;

        match result {
            CompletionResult::Completed {
                intent,
                ledger_entry,
                subscription,
            } => {
                tracing::info!(
                    intent_id = %intent.id,
                    user_id = %intent.user_id,
                    provider = %intent.provider,
                    ledger_entry_id = %ledger_entry.id,
                    expires_at = ?subscription.expires_at,
                    "Payment completed, subscription activated"
                );
                Ok(ConfirmResult {
                    intent,
                    subscription: Some(subscription),
                    already_processed: false,
                    retry_later: false,
                })
            }
            CompletionResult::AlreadyFinal(intent) => Ok(ConfirmResult::replayed(intent)),
        }
    }

    async fn fail(&self, intent: PaymentIntent, reason: &str) -> AppResult<ConfirmResult> {
        match self.intent_repo.mark_failed(intent.id, reason).await? {
            FailureResult::Failed(intent) => {
                tracing::info!(
                    intent_id = %intent.id,
                    user_id = %intent.user_id,
                    provider = %intent.provider,
                    "Payment failed"
                );
                Ok(ConfirmResult::unchanged(intent))
            }
            FailureResult::AlreadyFinal(intent) => Ok(ConfirmResult::replayed(intent)),
        }
    }
}
