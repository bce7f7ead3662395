//! In-memory billing store and a scripted payment provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::payment_provider::{
            ClientPayload, ExternalReference, IntentRequest, PaymentProviderPort,
            ProviderIntentRef, ProviderOutcome,
        },
        use_cases::{
            reconciliation::{
                CompletePaymentInput, CompletionResult, CreateIntentInput, FailureResult,
                PaymentIntentRepo, SubscriptionPlanRepo, WebhookEventRecord, WebhookEventRepo,
            },
            subscription::{PaymentLedgerRepo, SubscriptionStateRepo},
        },
    },
    domain::entities::{
        payment_intent::{PaymentIntent, PaymentLedgerEntry},
        payment_provider::PaymentProvider,
        payment_status::PaymentStatus,
        subscription_plan::SubscriptionPlan,
        subscription_state::{SubscriptionState, SubscriptionStatus},
    },
};

// ============================================================================
// InMemoryBillingStore
// ============================================================================

#[derive(Default)]
struct StoreState {
    plans: HashMap<Uuid, SubscriptionPlan>,
    intents: Vec<PaymentIntent>,
    ledger: Vec<PaymentLedgerEntry>,
    subscriptions: HashMap<Uuid, SubscriptionState>,
    webhook_events: Vec<WebhookEventRecord>,
}

/// Every billing table behind one lock, so `complete_and_activate` is atomic
/// the same way the Postgres transaction is.
#[derive(Default)]
pub struct InMemoryBillingStore {
    state: Mutex<StoreState>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_plan(&self, plan: SubscriptionPlan) {
        self.state.lock().unwrap().plans.insert(plan.id, plan);
    }

    pub fn insert_intent(&self, intent: PaymentIntent) {
        self.state.lock().unwrap().intents.push(intent);
    }

    pub fn set_subscription(&self, subscription: SubscriptionState) {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .insert(subscription.user_id, subscription);
    }

    pub fn plan(&self, id: Uuid) -> Option<SubscriptionPlan> {
        self.state.lock().unwrap().plans.get(&id).cloned()
    }

    pub fn intent(&self, id: Uuid) -> Option<PaymentIntent> {
        self.state
            .lock()
            .unwrap()
            .intents
            .iter()
            .find(|i| i.id == id)
            .cloned()
    }

    /// All intents in creation order.
    pub fn intents(&self) -> Vec<PaymentIntent> {
        self.state.lock().unwrap().intents.clone()
    }

    pub fn ledger_entries(&self) -> Vec<PaymentLedgerEntry> {
        self.state.lock().unwrap().ledger.clone()
    }

    pub fn subscription(&self, user_id: Uuid) -> Option<SubscriptionState> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .get(&user_id)
            .cloned()
    }

    pub fn webhook_events(&self) -> Vec<WebhookEventRecord> {
        self.state.lock().unwrap().webhook_events.clone()
    }
}

#[async_trait]
impl SubscriptionPlanRepo for InMemoryBillingStore {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<SubscriptionPlan>> {
        Ok(self.plan(id))
    }

    async fn list_active(&self) -> AppResult<Vec<SubscriptionPlan>> {
        let mut plans: Vec<SubscriptionPlan> = self
            .state
            .lock()
            .unwrap()
            .plans
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        plans.sort_by(|a, b| {
            a.price_cents
                .cmp(&b.price_cents)
                .then_with(|| a.code.cmp(&b.code))
        });
        Ok(plans)
    }
}

#[async_trait]
impl PaymentIntentRepo for InMemoryBillingStore {
    async fn create(&self, input: &CreateIntentInput) -> AppResult<PaymentIntent> {
        let intent = PaymentIntent {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            plan_id: input.plan_id,
            provider: input.provider,
            external_reference: None,
            amount_cents: input.amount_cents,
            currency: input.currency.clone(),
            status: PaymentStatus::Pending,
            failure_reason: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.insert_intent(intent.clone());
        Ok(intent)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<PaymentIntent>> {
        Ok(self.intent(id))
    }

    async fn get_by_reference(
        &self,
        provider: PaymentProvider,
        external_reference: &str,
    ) -> AppResult<Option<PaymentIntent>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .intents
            .iter()
            .find(|i| {
                i.provider == provider && i.external_reference.as_deref() == Some(external_reference)
            })
            .cloned())
    }

    async fn attach_external_reference(
        &self,
        id: Uuid,
        external_reference: &str,
    ) -> AppResult<PaymentIntent> {
        let mut state = self.state.lock().unwrap();
        let provider = state
            .intents
            .iter()
            .find(|i| i.id == id)
            .map(|i| i.provider)
            .ok_or(AppError::UnknownIntent)?;
        if state.intents.iter().any(|i| {
            i.provider == provider && i.external_reference.as_deref() == Some(external_reference)
        }) {
            return Err(AppError::InvalidInput("A record with this value already exists".into()));
        }

        let intent = state
            .intents
            .iter_mut()
            .find(|i| i.id == id && i.external_reference.is_none())
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "payment intent {id} missing or already has an external reference"
                ))
            })?;
        intent.external_reference = Some(external_reference.to_string());
        Ok(intent.clone())
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> AppResult<FailureResult> {
        let mut state = self.state.lock().unwrap();
        let intent = state
            .intents
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(AppError::UnknownIntent)?;

        if intent.status.is_terminal() {
            return Ok(FailureResult::AlreadyFinal(intent.clone()));
        }
        intent.status = PaymentStatus::Failed;
        intent.failure_reason = Some(reason.to_string());
        Ok(FailureResult::Failed(intent.clone()))
    }

    async fn complete_and_activate(
        &self,
        input: &CompletePaymentInput,
    ) -> AppResult<CompletionResult> {
        let mut state = self.state.lock().unwrap();
        let intent = state
            .intents
            .iter_mut()
            .find(|i| i.id == input.intent_id)
            .ok_or(AppError::UnknownIntent)?;

        if intent.status.is_terminal() {
            return Ok(CompletionResult::AlreadyFinal(intent.clone()));
        }
        let external_reference = intent.external_reference.clone().ok_or_else(|| {
            AppError::Internal(format!("payment intent {} has no external reference", intent.id))
        })?;

        intent.status = PaymentStatus::Completed;
        intent.completed_at = Some(input.completed_at);
        let intent = intent.clone();

        let ledger_entry =
            PaymentLedgerEntry::for_intent(&intent, external_reference, input.completed_at);
        state.ledger.push(ledger_entry.clone());

        let current_expires_at = state
            .subscriptions
            .get(&intent.user_id)
            .and_then(|s| s.expires_at);
        let subscription = SubscriptionState {
            user_id: intent.user_id,
            status: SubscriptionStatus::Active,
            current_plan_id: Some(intent.plan_id),
            expires_at: Some(SubscriptionState::extended_expiry(
                current_expires_at,
                input.completed_at,
                input.duration_days,
            )),
            updated_at: Some(input.completed_at),
        };
        state
            .subscriptions
            .insert(intent.user_id, subscription.clone());

        Ok(CompletionResult::Completed {
            intent,
            ledger_entry,
            subscription,
        })
    }
}

#[async_trait]
impl WebhookEventRepo for InMemoryBillingStore {
    async fn record(&self, event: &WebhookEventRecord) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        let redelivery = event.event_id.is_some()
            && state
                .webhook_events
                .iter()
                .any(|e| e.provider == event.provider && e.event_id == event.event_id);
        if !redelivery {
            state.webhook_events.push(event.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStateRepo for InMemoryBillingStore {
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<SubscriptionState>> {
        Ok(self.subscription(user_id))
    }

    async fn cancel_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SubscriptionState>> {
        let mut state = self.state.lock().unwrap();
        match state.subscriptions.get_mut(&user_id) {
            Some(sub) if sub.status == SubscriptionStatus::Active => {
                sub.status = SubscriptionStatus::Canceled;
                sub.updated_at = Some(now);
                Ok(Some(sub.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl PaymentLedgerRepo for InMemoryBillingStore {
    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<PaymentLedgerEntry>> {
        let mut entries: Vec<PaymentLedgerEntry> = self
            .state
            .lock()
            .unwrap()
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(entries)
    }
}

// ============================================================================
// ScriptedPaymentProvider
// ============================================================================

/// What the next `verify_intent` call answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyScript {
    Outcome(ProviderOutcome),
    Unavailable,
    Rejected,
}

struct Script {
    verify: VerifyScript,
    verify_delay: Option<Duration>,
    create_rejection: Option<String>,
}

/// Provider adapter double: answers from a script and counts calls.
pub struct ScriptedPaymentProvider {
    provider: PaymentProvider,
    script: Mutex<Script>,
    create_calls: AtomicUsize,
    verify_calls: AtomicUsize,
    settle_calls: AtomicUsize,
}

impl ScriptedPaymentProvider {
    pub fn new(provider: PaymentProvider) -> Self {
        Self {
            provider,
            script: Mutex::new(Script {
                verify: VerifyScript::Outcome(ProviderOutcome::Pending),
                verify_delay: None,
                create_rejection: None,
            }),
            create_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
            settle_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_outcome(&self, outcome: ProviderOutcome) {
        self.set_verify_script(VerifyScript::Outcome(outcome));
    }

    pub fn set_verify_script(&self, script: VerifyScript) {
        self.script.lock().unwrap().verify = script;
    }

    pub fn set_verify_delay(&self, delay: Duration) {
        self.script.lock().unwrap().verify_delay = Some(delay);
    }

    pub fn fail_create_with_rejection(&self, message: &str) {
        self.script.lock().unwrap().create_rejection = Some(message.to_string());
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn settle_calls(&self) -> usize {
        self.settle_calls.load(Ordering::SeqCst)
    }

    /// A fresh reference shaped like the provider's own ids.
    pub fn next_reference(&self) -> ExternalReference {
        let id = Uuid::new_v4().simple();
        ExternalReference::new(match self.provider {
            PaymentProvider::Card => format!("pi_{id}"),
            PaymentProvider::Redirect => format!("ORDER-{id}"),
            PaymentProvider::MobileMoney => format!("ws_CO_{id}"),
        })
    }
}

#[async_trait]
impl PaymentProviderPort for ScriptedPaymentProvider {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    async fn create_intent(&self, _request: &IntentRequest) -> AppResult<ProviderIntentRef> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.script.lock().unwrap().create_rejection.clone() {
            return Err(AppError::ProviderRejected(message));
        }

        let external_reference = self.next_reference();
        let client_payload = match self.provider {
            PaymentProvider::Card => ClientPayload::CardConfirmation {
                client_secret: format!("{external_reference}_secret_test"),
                publishable_key: "pk_test_scripted".to_string(),
            },
            PaymentProvider::Redirect => ClientPayload::RedirectApproval {
                approval_url: format!(
                    "https://pay.example/checkoutnow?token={external_reference}"
                ),
            },
            PaymentProvider::MobileMoney => ClientPayload::PushPrompt {
                checkout_request_id: external_reference.to_string(),
                customer_message: "Success. Request accepted for processing".to_string(),
            },
        };

        Ok(ProviderIntentRef {
            external_reference,
            client_payload,
        })
    }

    async fn verify_intent(&self, _reference: &ExternalReference) -> AppResult<ProviderOutcome> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let (verify, delay) = {
            let script = self.script.lock().unwrap();
            (script.verify, script.verify_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match verify {
            VerifyScript::Outcome(outcome) => Ok(outcome),
            VerifyScript::Unavailable => Err(AppError::ProviderUnavailable(format!(
                "{} scripted outage",
                self.provider
            ))),
            VerifyScript::Rejected => Err(AppError::ProviderRejected(format!(
                "{} scripted rejection",
                self.provider
            ))),
        }
    }

    async fn settle(&self, _reference: &ExternalReference) -> AppResult<()> {
        self.settle_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
