//! HTTP client factory and shared response handling for provider adapters.
//!
//! Adapters share one `reqwest::Client` built here, so every outbound provider
//! call carries the configured connect and request timeouts.

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::payment_provider::PaymentProvider,
};

/// Default connect timeout (TCP handshake + TLS).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default request timeout (total request/response time).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest provider error body kept in logs and error messages.
const MAX_ERROR_BODY_LEN: usize = 300;

/// Build an HTTP client with explicit timeouts.
pub fn build_client(connect_timeout: Duration, request_timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()
}

/// Map a failed `send()` to the error taxonomy. The request never got a
/// usable answer, so the provider counts as unavailable.
pub fn request_error(provider: PaymentProvider, err: reqwest::Error) -> AppError {
    if err.is_builder() {
        return AppError::Internal(format!("{provider} request could not be built: {err}"));
    }
    let kind = if err.is_timeout() { "timed out" } else { "failed" };
    AppError::ProviderUnavailable(format!("{provider} request {kind}: {err}"))
}

/// Classify a non-success status: 5xx and 429 are transient, other 4xx are rejections.
pub fn status_error(provider: PaymentProvider, status: StatusCode, body: &str) -> AppError {
    let body = truncate(body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        tracing::error!(provider = %provider, status = %status, body = %body, "Provider API error");
        AppError::ProviderUnavailable(format!("{provider} returned {status}"))
    } else {
        tracing::warn!(provider = %provider, status = %status, body = %body, "Provider rejected request");
        AppError::ProviderRejected(format!("{provider} returned {status}: {body}"))
    }
}

/// Read a provider response, decoding the body as JSON on success.
pub async fn handle_response<T: DeserializeOwned>(
    provider: PaymentProvider,
    response: Response,
) -> AppResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AppError::ProviderUnavailable(format!("{provider} response unreadable: {e}")))?;

    if !status.is_success() {
        return Err(status_error(provider, status, &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        tracing::error!(provider = %provider, body = %truncate(&body), error = %e, "Failed to parse provider response");
        AppError::Internal(format!("Failed to parse {provider} response: {e}"))
    })
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LEN {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
