use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_provider::{
        ClientPayload, ExternalReference, IntentRequest, PaymentProviderPort, ProviderIntentRef,
        ProviderOutcome,
    },
    domain::entities::payment_provider::PaymentProvider,
    infra::{
        config::{CardConfig, api_base},
        http_client::{handle_response, request_error},
    },
};

const PROVIDER: PaymentProvider = PaymentProvider::Card;

/// Card payments through a PaymentIntents-style API, confirmed in the browser.
pub struct CardPaymentAdapter {
    client: Client,
    api_base: String,
    secret_key: SecretString,
    publishable_key: String,
}

impl CardPaymentAdapter {
    pub fn new(client: Client, config: &CardConfig) -> Self {
        Self {
            client,
            api_base: api_base(&config.api_base),
            secret_key: config.secret_key.clone(),
            publishable_key: config.publishable_key.clone(),
        }
    }

    fn auth_header(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    /// Map a provider intent status to an outcome.
    ///
    /// A declined card sends the intent back to `requires_payment_method` with
    /// the decline attached; without one the payer simply hasn't paid yet.
    pub fn map_intent_status(status: &str, has_payment_error: bool) -> ProviderOutcome {
        match status {
            "succeeded" => ProviderOutcome::Succeeded,
            "canceled" => ProviderOutcome::Failed,
            "requires_payment_method" if has_payment_error => ProviderOutcome::Failed,
            _ => ProviderOutcome::Pending,
        }
    }

    fn create_params(request: &IntentRequest) -> Vec<(&'static str, String)> {
        vec![
            ("amount", request.amount_cents.to_string()),
            ("currency", request.currency.to_lowercase()),
            ("description", request.description.clone()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("metadata[intent_id]", request.intent_id.to_string()),
            ("metadata[user_id]", request.user_id.to_string()),
            ("metadata[plan_id]", request.plan_id.to_string()),
        ]
    }
}

#[async_trait]
impl PaymentProviderPort for CardPaymentAdapter {
    fn provider(&self) -> PaymentProvider {
        PROVIDER
    }

    async fn create_intent(&self, request: &IntentRequest) -> AppResult<ProviderIntentRef> {
        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .header("Authorization", self.auth_header())
            // A retried create returns the same provider-side intent.
            .header("Idempotency-Key", request.intent_id.to_string())
            .form(&Self::create_params(request))
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, e))?;

        let intent: CardIntent = handle_response(PROVIDER, response).await?;
        let client_secret = intent.client_secret.ok_or_else(|| {
            AppError::Internal("card payment intent returned without client secret".into())
        })?;

        Ok(ProviderIntentRef {
            external_reference: ExternalReference::new(intent.id),
            client_payload: ClientPayload::CardConfirmation {
                client_secret,
                publishable_key: self.publishable_key.clone(),
            },
        })
    }

    async fn verify_intent(&self, reference: &ExternalReference) -> AppResult<ProviderOutcome> {
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{}", self.api_base, reference))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, e))?;

        let intent: CardIntent = handle_response(PROVIDER, response).await?;
        let outcome = Self::map_intent_status(&intent.status, intent.last_payment_error.is_some());
        tracing::debug!(
            external_reference = %reference,
            status = %intent.status,
            outcome = ?outcome,
            "Card intent verified"
        );
        Ok(outcome)
    }
}

// ============================================================================
// Card API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct CardIntent {
    id: String,
    status: String,
    client_secret: Option<String>,
    last_payment_error: Option<serde_json::Value>,
}
