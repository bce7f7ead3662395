use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::payment_provider::PaymentProvider,
};

// ============================================================================
// Port Types - Provider-agnostic domain types
// ============================================================================

/// Identifier a provider assigns to a payment attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalReference(pub String);

impl ExternalReference {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExternalReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider chosen by the payer, with whatever that provider needs from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderSelection {
    Card,
    Redirect,
    /// Phone number already normalised to international digits.
    MobileMoney { phone_number: String },
}

impl ProviderSelection {
    /// Build a selection from the raw request fields, validating provider-specific input.
    pub fn from_parts(provider: PaymentProvider, phone_number: Option<&str>) -> AppResult<Self> {
        match provider {
            PaymentProvider::Card => Ok(ProviderSelection::Card),
            PaymentProvider::Redirect => Ok(ProviderSelection::Redirect),
            PaymentProvider::MobileMoney => {
                let raw = phone_number.ok_or_else(|| {
                    AppError::InvalidInput("phone_number is required for mobile money".into())
                })?;
                Ok(ProviderSelection::MobileMoney {
                    phone_number: normalize_phone_number(raw)?,
                })
            }
        }
    }

    pub fn provider(&self) -> PaymentProvider {
        match self {
            ProviderSelection::Card => PaymentProvider::Card,
            ProviderSelection::Redirect => PaymentProvider::Redirect,
            ProviderSelection::MobileMoney { .. } => PaymentProvider::MobileMoney,
        }
    }
}

/// Default country prefix applied to numbers written in local `0...` form.
pub const DEFAULT_COUNTRY_PREFIX: &str = "254";

/// Normalise a payer phone number to the digits-only international form the
/// mobile-money API expects (`0712...` and `+254712...` both become `254712...`).
pub fn normalize_phone_number(raw: &str) -> AppResult<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);

    let normalized = match digits.strip_prefix('0') {
        Some(local) => format!("{DEFAULT_COUNTRY_PREFIX}{local}"),
        None => digits.to_string(),
    };

    if !(9..=15).contains(&normalized.len()) || !normalized.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::InvalidInput(format!(
            "invalid phone number '{raw}'"
        )));
    }
    Ok(normalized)
}

/// What the engine asks a provider to charge
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub intent_id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub selection: ProviderSelection,
}

/// What the client needs to finish the payment on its side
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientPayload {
    /// Confirmed in the browser with the provider's JS library.
    CardConfirmation {
        client_secret: String,
        publishable_key: String,
    },
    /// Payer must be sent to the approval page.
    RedirectApproval { approval_url: String },
    /// A prompt was pushed to the payer's phone.
    PushPrompt {
        checkout_request_id: String,
        customer_message: String,
    },
}

/// Result of creating an intent at the provider
#[derive(Debug, Clone)]
pub struct ProviderIntentRef {
    pub external_reference: ExternalReference,
    pub client_payload: ClientPayload,
}

/// The provider's own answer about a payment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderOutcome {
    Succeeded,
    Pending,
    Failed,
}

// ============================================================================
// Port Trait
// ============================================================================

/// A payment provider adapter.
///
/// Implementations hold configuration only and are shared between requests.
/// Network failures, timeouts and 5xx answers map to `ProviderUnavailable`;
/// 4xx answers map to `ProviderRejected`.
#[async_trait]
pub trait PaymentProviderPort: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    /// Begin a payment at the provider.
    async fn create_intent(&self, request: &IntentRequest) -> AppResult<ProviderIntentRef>;

    /// Ask the provider what happened to a payment. Read-only and safe to repeat.
    async fn verify_intent(&self, reference: &ExternalReference) -> AppResult<ProviderOutcome>;

    /// Finalise a payment the payer approved out of band. Idempotent at the provider.
    async fn settle(&self, _reference: &ExternalReference) -> AppResult<()> {
        Ok(())
    }
}
