//! Provider callbacks: redirect returns and server-to-server webhooks.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::{error, warn};

use super::billing::ConfirmResponse;
use crate::{
    adapters::http::{app_error_impl::error_resp, app_state::AppState},
    app_error::{AppError, AppResult, ErrorCode},
    application::{
        ports::payment_provider::ExternalReference, use_cases::reconciliation::ConfirmResult,
    },
    domain::entities::{payment_provider::PaymentProvider, payment_status::ClaimedOutcome},
    infra::webhook_verifier::CALLBACK_TOKEN_HEADER,
};

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl TokenQuery {
    fn reference(&self) -> AppResult<ExternalReference> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(ExternalReference::new)
            .ok_or_else(|| AppError::InvalidInput("Missing order token".into()))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Status for a webhook outcome.
///
/// Retryable failures and unreachable providers answer 5xx; the provider
/// redelivers those. Everything else is acknowledged so it is not sent again.
fn webhook_response(provider: PaymentProvider, result: AppResult<ConfirmResult>) -> Response {
    match result {
        Ok(result) if result.retry_later => {
            warn!(
                provider = %provider,
                intent_id = %result.intent.id,
                "Provider unreachable while verifying webhook, returning 503 for redelivery"
            );
            error_resp(StatusCode::SERVICE_UNAVAILABLE, ErrorCode::ProviderUnavailable, None)
        }
        Ok(result) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "received": true,
                "status": result.status(),
                "already_processed": result.already_processed,
            })),
        )
            .into_response(),
        Err(err @ AppError::AuthenticationFailure(_)) => {
            error_resp(StatusCode::UNAUTHORIZED, err.code(), None)
        }
        Err(err @ AppError::UnknownIntent) => error_resp(StatusCode::NOT_FOUND, err.code(), None),
        Err(err) if err.is_retryable() => {
            error!(
                provider = %provider,
                error = %err,
                retryable = true,
                "Webhook processing failed, returning 500 for provider retry"
            );
            error_resp(StatusCode::INTERNAL_SERVER_ERROR, err.code(), None)
        }
        Err(err) => {
            warn!(
                provider = %provider,
                error = %err,
                "Webhook acknowledged without state change"
            );
            (
                StatusCode::OK,
                Json(serde_json::json!({ "received": true, "code": err.code().as_str() })),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/billing/redirect/return?token=...
/// The payer approved the order on the provider's page
async fn redirect_return(
    State(app_state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> AppResult<impl IntoResponse> {
    let reference = query.reference()?;

    let result = app_state
        .reconciliation_use_cases
        .settle_and_confirm(PaymentProvider::Redirect, &reference)
        .await?;

    Ok(Json(ConfirmResponse::from(result)))
}

/// GET /api/billing/redirect/cancel?token=...
/// The payer backed out; the order is still checked with the provider
async fn redirect_cancel(
    State(app_state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> AppResult<impl IntoResponse> {
    let reference = query.reference()?;

    let result = app_state
        .reconciliation_use_cases
        .confirm(PaymentProvider::Redirect, &reference, ClaimedOutcome::Failed)
        .await?;

    Ok(Json(ConfirmResponse::from(result)))
}

/// POST /api/billing/webhook/{provider}
/// Raw body is kept as bytes; signatures are computed over it unchanged
async fn handle_webhook(
    State(app_state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<TokenQuery>,
    mut headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(provider) = provider.parse::<PaymentProvider>() else {
        warn!(provider = %provider, "Webhook for unknown provider");
        return error_resp(
            StatusCode::NOT_FOUND,
            AppError::NotFound.code(),
            None,
        );
    };

    // The mobile money callback URL carries its token as a query parameter.
    if !headers.contains_key(CALLBACK_TOKEN_HEADER)
        && let Some(token) = query.token.as_deref()
        && let Ok(value) = HeaderValue::from_str(token)
    {
        headers.insert(CALLBACK_TOKEN_HEADER, value);
    }

    let result = app_state
        .reconciliation_use_cases
        .handle_webhook(provider, &body, &headers)
        .await;

    webhook_response(provider, result)
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/redirect/return", get(redirect_return))
        .route("/redirect/cancel", get(redirect_cancel))
        .route("/webhook/{provider}", post(handle_webhook))
}
