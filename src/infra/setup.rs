use crate::{
    adapters::http::app_state::AppState,
    application::use_cases::{
        provider_registry::ProviderRegistry,
        reconciliation::{
            PaymentIntentRepo, ReconciliationUseCases, SubscriptionPlanRepo, WebhookEventRepo,
        },
        subscription::{PaymentLedgerRepo, SubscriptionStateRepo, SubscriptionUseCases},
    },
    infra::{
        config::AppConfig,
        http_client::build_client,
        postgres_persistence,
        webhook_verifier::{WebhookSecrets, WebhookVerifier},
    },
};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env();

    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);
    let http = build_client(config.provider_connect_timeout, config.provider_timeout)?;

    let plan_repo_arc = postgres_arc.clone() as Arc<dyn SubscriptionPlanRepo>;
    let intent_repo_arc = postgres_arc.clone() as Arc<dyn PaymentIntentRepo>;
    let webhook_event_repo_arc = postgres_arc.clone() as Arc<dyn WebhookEventRepo>;
    let state_repo_arc = postgres_arc.clone() as Arc<dyn SubscriptionStateRepo>;
    let ledger_repo_arc = postgres_arc.clone() as Arc<dyn PaymentLedgerRepo>;

    let providers = Arc::new(ProviderRegistry::from_config(&config, http));
    let verifier = Arc::new(WebhookVerifier::new(
        WebhookSecrets::from_config(&config),
        config.webhook_tolerance_secs,
    ));

    let reconciliation_use_cases = ReconciliationUseCases::new(
        plan_repo_arc.clone(),
        intent_repo_arc,
        webhook_event_repo_arc,
        providers,
        verifier,
        config.provider_timeout,
    );

    let subscription_use_cases = SubscriptionUseCases::new(
        state_repo_arc,
        ledger_repo_arc,
        plan_repo_arc,
        config.free_campaign_limit,
    );

    Ok(AppState {
        config: Arc::new(config),
        reconciliation_use_cases: Arc::new(reconciliation_use_cases),
        subscription_use_cases: Arc::new(subscription_use_cases),
    })
}

/// Pretty console logs by default; `LOG_FORMAT=json` switches to one JSON object per line.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "campaign_billing=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_level(true).pretty())
            .try_init()
            .ok();
    }
}
