use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_provider::{
        ClientPayload, ExternalReference, IntentRequest, PaymentProviderPort, ProviderIntentRef,
        ProviderOutcome,
    },
    domain::entities::payment_provider::PaymentProvider,
    infra::{
        config::{RedirectConfig, api_base},
        http_client::{handle_response, request_error, status_error},
    },
};

const PROVIDER: PaymentProvider = PaymentProvider::Redirect;

/// Hosted checkout: the payer approves on the provider's page, then the order is captured.
pub struct RedirectPaymentAdapter {
    client: Client,
    api_base: String,
    client_id: String,
    client_secret: SecretString,
    return_url: String,
    cancel_url: String,
}

impl RedirectPaymentAdapter {
    pub fn new(client: Client, config: &RedirectConfig) -> Self {
        Self {
            client,
            api_base: api_base(&config.api_base),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            return_url: config.return_url.to_string(),
            cancel_url: config.cancel_url.to_string(),
        }
    }

    pub fn map_order_status(status: &str) -> ProviderOutcome {
        match status {
            "COMPLETED" => ProviderOutcome::Succeeded,
            "VOIDED" => ProviderOutcome::Failed,
            _ => ProviderOutcome::Pending,
        }
    }

    /// Decimal amount string the orders API expects, e.g. `2999` -> `"29.99"`.
    pub fn format_amount(amount_cents: i64) -> String {
        format!("{}.{:02}", amount_cents / 100, amount_cents % 100)
    }

    fn order_body(&self, request: &IntentRequest) -> serde_json::Value {
        json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.intent_id.to_string(),
                "custom_id": request.intent_id.to_string(),
                "description": request.description,
                "amount": {
                    "currency_code": request.currency,
                    "value": Self::format_amount(request.amount_cents),
                },
            }],
            "application_context": {
                "return_url": self.return_url,
                "cancel_url": self.cancel_url,
                "user_action": "PAY_NOW",
                "shipping_preference": "NO_SHIPPING",
            },
        })
    }

    async fn access_token(&self) -> AppResult<String> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, e))?;

        let token: AccessToken = handle_response(PROVIDER, response).await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentProviderPort for RedirectPaymentAdapter {
    fn provider(&self) -> PaymentProvider {
        PROVIDER
    }

    async fn create_intent(&self, request: &IntentRequest) -> AppResult<ProviderIntentRef> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.api_base))
            .bearer_auth(token)
            .header("PayPal-Request-Id", request.intent_id.to_string())
            .json(&self.order_body(request))
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, e))?;

        let order: Order = handle_response(PROVIDER, response).await?;
        let approval_url = order.approval_url().ok_or_else(|| {
            AppError::Internal(format!("order {} returned without approval link", order.id))
        })?;

        Ok(ProviderIntentRef {
            external_reference: ExternalReference::new(order.id),
            client_payload: ClientPayload::RedirectApproval { approval_url },
        })
    }

    async fn verify_intent(&self, reference: &ExternalReference) -> AppResult<ProviderOutcome> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}/v2/checkout/orders/{}", self.api_base, reference))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, e))?;

        let order: Order = handle_response(PROVIDER, response).await?;
        let outcome = Self::map_order_status(&order.status);
        tracing::debug!(
            external_reference = %reference,
            status = %order.status,
            outcome = ?outcome,
            "Redirect order verified"
        );
        Ok(outcome)
    }

    /// Capture an approved order. Safe to repeat: the request id deduplicates
    /// at the provider and an already captured order counts as settled.
    async fn settle(&self, reference: &ExternalReference) -> AppResult<()> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.api_base, reference
            ))
            .bearer_auth(token)
            .header("PayPal-Request-Id", format!("capture-{reference}"))
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, e))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(external_reference = %reference, "Redirect order captured");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNPROCESSABLE_ENTITY && body.contains("ORDER_ALREADY_CAPTURED") {
            return Ok(());
        }
        Err(status_error(PROVIDER, status, &body))
    }
}

// ============================================================================
// Orders API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Order {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<OrderLink>,
}

#[derive(Debug, Deserialize)]
struct OrderLink {
    href: String,
    rel: String,
}

impl Order {
    fn approval_url(&self) -> Option<String> {
        self.links
            .iter()
            .find(|link| link.rel == "approve" || link.rel == "payer-action")
            .map(|link| link.href.clone())
    }
}
