//! Test app state builder for use case and HTTP-level testing.
//!
//! `TestAppStateBuilder` wires the real use cases to the in-memory store and
//! scripted providers. The returned `TestBilling` keeps handles to all of them
//! so tests can script providers and inspect stored state.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::http::HeaderValue;
use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::payment_provider::ExternalReference,
        use_cases::{
            provider_registry::ProviderRegistry,
            reconciliation::{
                PaymentIntentRepo, ReconciliationUseCases, SubscriptionPlanRepo, WebhookEventRepo,
            },
            subscription::{PaymentLedgerRepo, SubscriptionStateRepo, SubscriptionUseCases},
        },
    },
    domain::entities::{
        payment_intent::PaymentIntent, payment_provider::PaymentProvider,
        subscription_plan::SubscriptionPlan,
    },
    infra::config::{AppConfig, CardConfig, MobileMoneyConfig, RedirectConfig},
    test_utils::{
        InMemoryBillingStore, ScriptedPaymentProvider, TEST_CALLBACK_TOKEN,
        TEST_CARD_WEBHOOK_SECRET, TEST_REDIRECT_WEBHOOK_ID, TEST_REDIRECT_WEBHOOK_SECRET,
        TEST_WEBHOOK_TOLERANCE_SECS, create_test_intent, create_test_plan,
        test_webhook_verifier,
    },
};

pub const TEST_FREE_CAMPAIGN_LIMIT: i32 = 1;

const DEFAULT_TEST_VERIFY_TIMEOUT: Duration = Duration::from_secs(2);

/// Builder for [`TestBilling`].
///
/// # Example
///
/// ```ignore
/// let billing = TestAppStateBuilder::new()
///     .with_verify_timeout(Duration::from_millis(20))
///     .build();
/// let (intent, reference) = billing.pending_intent(PaymentProvider::Card, |_| {});
/// billing.card.set_outcome(ProviderOutcome::Succeeded);
/// ```
pub struct TestAppStateBuilder {
    verify_timeout: Duration,
    plans: Vec<SubscriptionPlan>,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            verify_timeout: DEFAULT_TEST_VERIFY_TIMEOUT,
            plans: vec![],
        }
    }

    /// Bound on each provider verification call.
    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    /// Add a plan to the test state.
    pub fn with_plan(mut self, plan: SubscriptionPlan) -> Self {
        self.plans.push(plan);
        self
    }

    pub fn build(self) -> TestBilling {
        let store = Arc::new(InMemoryBillingStore::new());
        for plan in self.plans {
            store.insert_plan(plan);
        }

        let card = Arc::new(ScriptedPaymentProvider::new(PaymentProvider::Card));
        let redirect = Arc::new(ScriptedPaymentProvider::new(PaymentProvider::Redirect));
        let mobile_money = Arc::new(ScriptedPaymentProvider::new(PaymentProvider::MobileMoney));
        let providers = Arc::new(ProviderRegistry::new(
            card.clone(),
            redirect.clone(),
            mobile_money.clone(),
        ));

        let plan_repo = store.clone() as Arc<dyn SubscriptionPlanRepo>;

        let reconciliation = Arc::new(ReconciliationUseCases::new(
            plan_repo.clone(),
            store.clone() as Arc<dyn PaymentIntentRepo>,
            store.clone() as Arc<dyn WebhookEventRepo>,
            providers,
            Arc::new(test_webhook_verifier()),
            self.verify_timeout,
        ));

        let subscriptions = Arc::new(SubscriptionUseCases::new(
            store.clone() as Arc<dyn SubscriptionStateRepo>,
            store.clone() as Arc<dyn PaymentLedgerRepo>,
            plan_repo,
            TEST_FREE_CAMPAIGN_LIMIT,
        ));

        TestBilling {
            store,
            card,
            redirect,
            mobile_money,
            reconciliation,
            subscriptions,
            config: Arc::new(test_config(self.verify_timeout)),
        }
    }
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Use cases plus handles on their test doubles.
pub struct TestBilling {
    pub store: Arc<InMemoryBillingStore>,
    pub card: Arc<ScriptedPaymentProvider>,
    pub redirect: Arc<ScriptedPaymentProvider>,
    pub mobile_money: Arc<ScriptedPaymentProvider>,
    pub reconciliation: Arc<ReconciliationUseCases>,
    pub subscriptions: Arc<SubscriptionUseCases>,
    pub config: Arc<AppConfig>,
}

impl TestBilling {
    pub fn app_state(&self) -> AppState {
        AppState {
            config: self.config.clone(),
            reconciliation_use_cases: self.reconciliation.clone(),
            subscription_use_cases: self.subscriptions.clone(),
        }
    }

    pub fn insert_plan(&self, plan: SubscriptionPlan) -> SubscriptionPlan {
        self.store.insert_plan(plan.clone());
        plan
    }

    /// Store a fresh plan and a pending intent for it that already carries a
    /// provider reference, as if `initiate` had run.
    pub fn pending_intent(
        &self,
        provider: PaymentProvider,
        overrides: impl FnOnce(&mut PaymentIntent),
    ) -> (PaymentIntent, ExternalReference) {
        let plan = self.insert_plan(create_test_plan(|_| {}));
        let reference = self.scripted(provider).next_reference();

        let intent = create_test_intent(|i| {
            i.plan_id = plan.id;
            i.provider = provider;
            i.amount_cents = plan.price_cents;
            i.currency = plan.currency.clone();
            i.external_reference = Some(reference.to_string());
            overrides(i);
        });
        let reference = ExternalReference::new(
            intent
                .external_reference
                .clone()
                .expect("pending intent needs an external reference"),
        );
        self.store.insert_intent(intent.clone());
        (intent, reference)
    }

    fn scripted(&self, provider: PaymentProvider) -> &ScriptedPaymentProvider {
        match provider {
            PaymentProvider::Card => self.card.as_ref(),
            PaymentProvider::Redirect => self.redirect.as_ref(),
            PaymentProvider::MobileMoney => self.mobile_money.as_ref(),
        }
    }
}

fn test_url(url: &str) -> Url {
    Url::parse(url).unwrap()
}

/// Minimal config for tests; provider endpoints are never contacted.
pub fn test_config(provider_timeout: Duration) -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:3001".parse::<SocketAddr>().unwrap(),
        database_url: String::new(),
        cors_origin: HeaderValue::from_static("http://localhost:3000"),
        provider_timeout,
        provider_connect_timeout: Duration::from_secs(1),
        webhook_tolerance_secs: TEST_WEBHOOK_TOLERANCE_SECS,
        free_campaign_limit: TEST_FREE_CAMPAIGN_LIMIT,
        card: CardConfig {
            api_base: test_url("http://127.0.0.1:9/card"),
            secret_key: SecretString::new("sk_test_unused".into()),
            publishable_key: "pk_test_unused".to_string(),
            webhook_secret: SecretString::new(TEST_CARD_WEBHOOK_SECRET.into()),
        },
        redirect: RedirectConfig {
            api_base: test_url("http://127.0.0.1:9/redirect"),
            client_id: "client_test".to_string(),
            client_secret: SecretString::new("client_secret_test".into()),
            webhook_id: TEST_REDIRECT_WEBHOOK_ID.to_string(),
            webhook_secret: SecretString::new(TEST_REDIRECT_WEBHOOK_SECRET.into()),
            return_url: test_url("http://localhost:3000/api/billing/redirect/return"),
            cancel_url: test_url("http://localhost:3000/api/billing/redirect/cancel"),
        },
        mobile_money: MobileMoneyConfig {
            api_base: test_url("http://127.0.0.1:9/mobile-money"),
            consumer_key: "consumer_test".to_string(),
            consumer_secret: SecretString::new("consumer_secret_test".into()),
            shortcode: "174379".to_string(),
            passkey: SecretString::new("passkey_test".into()),
            callback_url: test_url("http://localhost:3000/api/billing/webhook/mobile-money"),
            callback_token: SecretString::new(TEST_CALLBACK_TOKEN.into()),
        },
    }
}
