//! Authentication of inbound provider webhooks.
//!
//! Every scheme recomputes its check over the raw request bytes before the
//! body is parsed. Anything that does not authenticate fails closed with
//! `AuthenticationFailure`.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_provider::ExternalReference,
    domain::entities::{payment_provider::PaymentProvider, payment_status::ClaimedOutcome},
    infra::config::AppConfig,
};

pub const CARD_SIGNATURE_HEADER: &str = "stripe-signature";
pub const REDIRECT_TRANSMISSION_ID_HEADER: &str = "paypal-transmission-id";
pub const REDIRECT_TRANSMISSION_TIME_HEADER: &str = "paypal-transmission-time";
pub const REDIRECT_TRANSMISSION_SIG_HEADER: &str = "paypal-transmission-sig";
pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

type HmacSha256 = Hmac<Sha256>;

/// Shared secrets for each provider's webhook scheme.
pub struct WebhookSecrets {
    pub card_signing_secret: SecretString,
    pub redirect_webhook_id: String,
    pub redirect_signing_secret: SecretString,
    pub mobile_money_callback_token: SecretString,
}

impl WebhookSecrets {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            card_signing_secret: config.card.webhook_secret.clone(),
            redirect_webhook_id: config.redirect.webhook_id.clone(),
            redirect_signing_secret: config.redirect.webhook_secret.clone(),
            mobile_money_callback_token: config.mobile_money.callback_token.clone(),
        }
    }
}

/// The normalised fields of an authenticated webhook.
#[derive(Debug, Clone)]
pub struct VerifiedEvent {
    pub provider: PaymentProvider,
    /// Provider's own event id, when the scheme has one.
    pub event_id: Option<String>,
    pub external_reference: ExternalReference,
    pub outcome: ClaimedOutcome,
    pub raw_payload: Value,
}

pub struct WebhookVerifier {
    secrets: WebhookSecrets,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secrets: WebhookSecrets, tolerance_secs: i64) -> Self {
        Self {
            secrets,
            tolerance_secs,
        }
    }

    pub fn verify(
        &self,
        provider: PaymentProvider,
        raw_body: &[u8],
        headers: &HeaderMap,
    ) -> AppResult<VerifiedEvent> {
        self.verify_at(provider, raw_body, headers, Utc::now())
    }

    /// Same as [`verify`](Self::verify) with an explicit clock.
    pub fn verify_at(
        &self,
        provider: PaymentProvider,
        raw_body: &[u8],
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> AppResult<VerifiedEvent> {
        match provider {
            PaymentProvider::Card => self.verify_card(raw_body, headers, now),
            PaymentProvider::Redirect => self.verify_redirect(raw_body, headers, now),
            PaymentProvider::MobileMoney => self.verify_mobile_money(raw_body, headers),
        }
    }

    // ========================================================================
    // Card: `t=<unix>,v1=<hex>` over "<t>.<body>"
    // ========================================================================

    fn verify_card(
        &self,
        raw_body: &[u8],
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> AppResult<VerifiedEvent> {
        let secret = configured(&self.secrets.card_signing_secret)?;
        let header = SignatureHeader::parse(required_header(headers, CARD_SIGNATURE_HEADER)?)?;
        self.check_timestamp(header.timestamp, now)?;

        let timestamp = header.timestamp.to_string();
        let expected = hmac_sha256(secret, &[timestamp.as_bytes(), b".", raw_body])?;
        if !header
            .signatures
            .iter()
            .any(|candidate| constant_time_eq(&expected, candidate))
        {
            return Err(auth_failure("card signature mismatch"));
        }

        let payload = parse_payload(raw_body)?;
        let event_type = payload["type"].as_str().unwrap_or_default();
        let outcome = card_event_outcome(event_type).ok_or_else(|| {
            AppError::InvalidInput(format!("unsupported card event type '{event_type}'"))
        })?;
        let reference = string_at(&payload, &["data", "object", "id"])
            .ok_or_else(|| AppError::InvalidInput("card event carries no payment id".into()))?;

        Ok(VerifiedEvent {
            provider: PaymentProvider::Card,
            event_id: payload["id"].as_str().map(str::to_string),
            external_reference: ExternalReference::new(reference),
            outcome,
            raw_payload: payload,
        })
    }

    // ========================================================================
    // Redirect: hex HMAC over "<id>|<time>|<webhook id>|<body>"
    // ========================================================================

    fn verify_redirect(
        &self,
        raw_body: &[u8],
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> AppResult<VerifiedEvent> {
        let secret = configured(&self.secrets.redirect_signing_secret)?;
        let transmission_id = required_header(headers, REDIRECT_TRANSMISSION_ID_HEADER)?;
        let transmission_time = required_header(headers, REDIRECT_TRANSMISSION_TIME_HEADER)?;
        let signature = hex::decode(required_header(headers, REDIRECT_TRANSMISSION_SIG_HEADER)?)
            .map_err(|_| auth_failure("redirect signature is not hex"))?;

        let sent_at = DateTime::parse_from_rfc3339(transmission_time)
            .map_err(|_| auth_failure("invalid transmission time"))?;
        self.check_timestamp(sent_at.timestamp(), now)?;

        let expected = hmac_sha256(
            secret,
            &[
                transmission_id.as_bytes(),
                b"|",
                transmission_time.as_bytes(),
                b"|",
                self.secrets.redirect_webhook_id.as_bytes(),
                b"|",
                raw_body,
            ],
        )?;
        if !constant_time_eq(&expected, &signature) {
            return Err(auth_failure("redirect signature mismatch"));
        }

        let payload = parse_payload(raw_body)?;
        let event_type = payload["event_type"].as_str().unwrap_or_default();
        let outcome = redirect_event_outcome(event_type).ok_or_else(|| {
            AppError::InvalidInput(format!("unsupported redirect event type '{event_type}'"))
        })?;
        let reference = if event_type.starts_with("CHECKOUT.ORDER.") {
            string_at(&payload, &["resource", "id"])
        } else {
            string_at(
                &payload,
                &["resource", "supplementary_data", "related_ids", "order_id"],
            )
        }
        .ok_or_else(|| AppError::InvalidInput("redirect event carries no order id".into()))?;

        Ok(VerifiedEvent {
            provider: PaymentProvider::Redirect,
            event_id: payload["id"].as_str().map(str::to_string),
            external_reference: ExternalReference::new(reference),
            outcome,
            raw_payload: payload,
        })
    }

    // ========================================================================
    // Mobile money: unsigned callbacks, shared token
    // ========================================================================

    fn verify_mobile_money(&self, raw_body: &[u8], headers: &HeaderMap) -> AppResult<VerifiedEvent> {
        let expected = configured(&self.secrets.mobile_money_callback_token)?;
        let presented = required_header(headers, CALLBACK_TOKEN_HEADER)?;
        if !constant_time_eq(expected, presented.as_bytes()) {
            return Err(auth_failure("callback token mismatch"));
        }

        let payload = parse_payload(raw_body)?;
        let callback = &payload["Body"]["stkCallback"];
        let reference = callback["CheckoutRequestID"]
            .as_str()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::InvalidInput("callback carries no CheckoutRequestID".into()))?
            .to_string();
        let result_code = callback["ResultCode"]
            .as_i64()
            .ok_or_else(|| AppError::InvalidInput("callback carries no ResultCode".into()))?;
        let outcome = if result_code == 0 {
            ClaimedOutcome::Succeeded
        } else {
            ClaimedOutcome::Failed
        };

        Ok(VerifiedEvent {
            provider: PaymentProvider::MobileMoney,
            event_id: None,
            external_reference: ExternalReference::new(reference),
            outcome,
            raw_payload: payload,
        })
    }

    fn check_timestamp(&self, timestamp: i64, now: DateTime<Utc>) -> AppResult<()> {
        if now.timestamp().abs_diff(timestamp) > self.tolerance_secs.unsigned_abs() {
            return Err(auth_failure("timestamp outside tolerance"));
        }
        Ok(())
    }
}

/// Parsed `t=<unix>,v1=<hex>[,v1=<hex>...]` header. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> AppResult<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                return Err(auth_failure("malformed signature header"));
            };
            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| auth_failure("invalid signature timestamp"))?,
                    );
                }
                "v1" => {
                    // Skip undecodable candidates; another v1 may still match.
                    if let Ok(signature) = hex::decode(value) {
                        signatures.push(signature);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| auth_failure("missing signature timestamp"))?;
        if signatures.is_empty() {
            return Err(auth_failure("missing v1 signature"));
        }
        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

pub fn card_event_outcome(event_type: &str) -> Option<ClaimedOutcome> {
    match event_type {
        "payment_intent.succeeded" => Some(ClaimedOutcome::Succeeded),
        "payment_intent.payment_failed" | "payment_intent.canceled" => {
            Some(ClaimedOutcome::Failed)
        }
        other if other.starts_with("payment_intent.") => Some(ClaimedOutcome::Unknown),
        _ => None,
    }
}

pub fn redirect_event_outcome(event_type: &str) -> Option<ClaimedOutcome> {
    match event_type {
        "PAYMENT.CAPTURE.COMPLETED" => Some(ClaimedOutcome::Succeeded),
        "PAYMENT.CAPTURE.DENIED" | "CHECKOUT.ORDER.VOIDED" => Some(ClaimedOutcome::Failed),
        "CHECKOUT.ORDER.APPROVED" | "CHECKOUT.ORDER.COMPLETED" | "PAYMENT.CAPTURE.PENDING" => {
            Some(ClaimedOutcome::Unknown)
        }
        _ => None,
    }
}

fn auth_failure(reason: &str) -> AppError {
    AppError::AuthenticationFailure(reason.to_string())
}

/// An empty secret means the scheme is not set up; nothing can authenticate against it.
fn configured(secret: &SecretString) -> AppResult<&[u8]> {
    let bytes = secret.expose_secret().as_bytes();
    if bytes.is_empty() {
        return Err(auth_failure("webhook secret not configured"));
    }
    Ok(bytes)
}

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> AppResult<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| auth_failure(&format!("missing {name} header")))
}

fn hmac_sha256(secret: &[u8], parts: &[&[u8]]) -> AppResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(format!("HMAC key error: {e}")))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn parse_payload(raw_body: &[u8]) -> AppResult<Value> {
    serde_json::from_slice(raw_body)
        .map_err(|e| AppError::InvalidInput(format!("webhook body is not valid JSON: {e}")))
}

fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(value, |current, key| current.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
