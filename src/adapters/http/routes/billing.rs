//! Billing routes: plans, payment initiation and confirmation, subscription, payments.

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    adapters::http::{app_state::AppState, extract::AuthenticatedUser},
    app_error::{AppError, AppResult},
    application::{
        ports::payment_provider::{ClientPayload, ExternalReference, ProviderSelection},
        use_cases::{reconciliation::ConfirmResult, subscription::Entitlement},
    },
    domain::entities::{
        payment_provider::PaymentProvider,
        payment_status::{ClaimedOutcome, PaymentStatus},
        subscription_state::{SubscriptionState, SubscriptionStatus},
    },
};

// ============================================================================
// Types
// ============================================================================

#[derive(Serialize)]
struct PlanResponse {
    id: Uuid,
    code: String,
    name: String,
    price_cents: i64,
    display_price: String,
    currency: String,
    duration_days: i32,
    max_campaigns: i32,
    features: Vec<String>,
}

#[derive(Deserialize)]
struct InitiatePayload {
    plan_id: Uuid,
    provider: PaymentProvider,
    phone_number: Option<String>,
}

#[derive(Serialize)]
struct InitiateResponse {
    intent_id: Uuid,
    provider: PaymentProvider,
    external_reference: Option<String>,
    amount_cents: i64,
    currency: String,
    status: PaymentStatus,
    client_payload: ClientPayload,
}

#[derive(Deserialize)]
struct ConfirmPayload {
    external_reference: String,
    provider: PaymentProvider,
    #[serde(default)]
    claimed_outcome: ClaimedOutcome,
}

#[derive(Serialize)]
pub(super) struct ConfirmResponse {
    intent_id: Uuid,
    status: PaymentStatus,
    already_processed: bool,
    retry_later: bool,
    failure_reason: Option<String>,
    subscription: Option<SubscriptionStateResponse>,
}

impl From<ConfirmResult> for ConfirmResponse {
    fn from(result: ConfirmResult) -> Self {
        Self {
            intent_id: result.intent.id,
            status: result.intent.status,
            already_processed: result.already_processed,
            retry_later: result.retry_later,
            failure_reason: result.intent.failure_reason,
            subscription: result.subscription.map(SubscriptionStateResponse::from),
        }
    }
}

#[derive(Serialize)]
pub(super) struct SubscriptionStateResponse {
    status: SubscriptionStatus,
    plan_id: Option<Uuid>,
    expires_at: Option<i64>,
}

impl From<SubscriptionState> for SubscriptionStateResponse {
    fn from(state: SubscriptionState) -> Self {
        Self {
            status: state.status,
            plan_id: state.current_plan_id,
            expires_at: state.expires_at.map(|dt| dt.timestamp()),
        }
    }
}

#[derive(Serialize)]
struct SubscriptionResponse {
    status: SubscriptionStatus,
    plan_id: Option<Uuid>,
    expires_at: Option<i64>,
    has_access: bool,
    max_campaigns: i32,
}

impl From<Entitlement> for SubscriptionResponse {
    fn from(entitlement: Entitlement) -> Self {
        Self {
            status: entitlement.status,
            plan_id: entitlement.plan_id,
            expires_at: entitlement.expires_at.map(|dt| dt.timestamp()),
            has_access: entitlement.has_access,
            max_campaigns: entitlement.max_campaigns,
        }
    }
}

#[derive(Serialize)]
struct PaymentResponse {
    id: Uuid,
    intent_id: Uuid,
    plan_id: Uuid,
    provider: PaymentProvider,
    amount_cents: i64,
    currency: String,
    external_reference: String,
    completed_at: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/billing/plans
async fn list_plans(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    let plans = app_state.subscription_use_cases.list_plans().await?;

    let response: Vec<PlanResponse> = plans
        .into_iter()
        .map(|p| PlanResponse {
            display_price: p.display_price(),
            id: p.id,
            code: p.code,
            name: p.name,
            price_cents: p.price_cents,
            currency: p.currency,
            duration_days: p.duration_days,
            max_campaigns: p.max_campaigns,
            features: p.features,
        })
        .collect();

    Ok(Json(response))
}

/// POST /api/billing/initiate
/// Creates a payment intent and returns what the client needs to continue with the provider
async fn initiate(
    State(app_state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(payload): Json<InitiatePayload>,
) -> AppResult<impl IntoResponse> {
    let selection =
        ProviderSelection::from_parts(payload.provider, payload.phone_number.as_deref())?;

    let result = app_state
        .reconciliation_use_cases
        .initiate(user_id, payload.plan_id, selection)
        .await?;

    Ok(Json(InitiateResponse {
        intent_id: result.intent.id,
        provider: result.intent.provider,
        external_reference: result.intent.external_reference,
        amount_cents: result.intent.amount_cents,
        currency: result.intent.currency,
        status: result.intent.status,
        client_payload: result.client_payload,
    }))
}

/// POST /api/billing/confirm
/// Client-side confirmation. The claim is only a hint; the provider is asked directly.
async fn confirm(
    State(app_state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(payload): Json<ConfirmPayload>,
) -> AppResult<impl IntoResponse> {
    let reference = ExternalReference::new(payload.external_reference.trim());
    if reference.as_str().is_empty() {
        return Err(AppError::InvalidInput(
            "external_reference is required".into(),
        ));
    }

    let result = app_state
        .reconciliation_use_cases
        .confirm_for_user(user_id, payload.provider, &reference, payload.claimed_outcome)
        .await?;

    Ok(Json(ConfirmResponse::from(result)))
}

/// GET /api/billing/subscription
/// Current subscription state and the campaign quota it grants
async fn get_subscription(
    State(app_state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let entitlement = app_state
        .subscription_use_cases
        .entitlement(user_id, Utc::now())
        .await?;

    Ok(Json(SubscriptionResponse::from(entitlement)))
}

/// POST /api/billing/subscription/cancel
/// Stops renewal; access continues until the paid period ends
async fn cancel_subscription(
    State(app_state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let state = app_state.subscription_use_cases.cancel(user_id).await?;
    Ok(Json(SubscriptionStateResponse::from(state)))
}

/// GET /api/billing/payments
async fn list_payments(
    State(app_state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let payments = app_state
        .subscription_use_cases
        .list_payments(user_id)
        .await?;

    let response: Vec<PaymentResponse> = payments
        .into_iter()
        .map(|p| PaymentResponse {
            id: p.id,
            intent_id: p.intent_id,
            plan_id: p.plan_id,
            provider: p.provider,
            amount_cents: p.amount_cents,
            currency: p.currency,
            external_reference: p.external_reference,
            completed_at: p.completed_at.timestamp(),
        })
        .collect();

    Ok(Json(response))
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/plans", get(list_plans))
        .route("/initiate", post(initiate))
        .route("/confirm", post(confirm))
        .route("/subscription", get(get_subscription))
        .route("/subscription/cancel", post(cancel_subscription))
        .route("/payments", get(list_payments))
}
