use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_provider::{
        ClientPayload, ExternalReference, IntentRequest, PaymentProviderPort, ProviderIntentRef,
        ProviderOutcome, ProviderSelection,
    },
    domain::entities::payment_provider::PaymentProvider,
    infra::{
        config::{MobileMoneyConfig, api_base},
        http_client::{handle_response, request_error, status_error},
    },
};

const PROVIDER: PaymentProvider = PaymentProvider::MobileMoney;

/// Error code the query API answers with while the payer hasn't responded yet.
const STILL_PROCESSING_ERROR: &str = "500.001.1001";

/// Provider timestamps are East Africa Time.
const EAT_OFFSET_SECS: i64 = 3 * 3600;

/// STK push: the provider prompts the payer's phone for a PIN.
pub struct MobileMoneyAdapter {
    client: Client,
    api_base: String,
    consumer_key: String,
    consumer_secret: SecretString,
    shortcode: String,
    passkey: SecretString,
    callback_url: String,
}

impl MobileMoneyAdapter {
    pub fn new(client: Client, config: &MobileMoneyConfig) -> Self {
        Self {
            client,
            api_base: api_base(&config.api_base),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            shortcode: config.shortcode.clone(),
            passkey: config.passkey.clone(),
            callback_url: callback_url_with_token(
                config.callback_url.as_str(),
                config.callback_token.expose_secret(),
            ),
        }
    }

    /// `%Y%m%d%H%M%S` in East Africa Time.
    pub fn timestamp(now: DateTime<Utc>) -> String {
        (now + Duration::seconds(EAT_OFFSET_SECS)).format("%Y%m%d%H%M%S").to_string()
    }

    /// base64(shortcode ‖ passkey ‖ timestamp)
    pub fn password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(format!("{shortcode}{passkey}{timestamp}"))
    }

    /// Whole currency units, rounded up so the payer never pays less than the plan price.
    pub fn whole_units(amount_cents: i64) -> i64 {
        (amount_cents + 99).div_euclid(100)
    }

    /// Outcome for a query `ResultCode`: `0` is paid, anything else is final.
    pub fn map_result_code(result_code: &str) -> ProviderOutcome {
        match result_code {
            "0" => ProviderOutcome::Succeeded,
            _ => ProviderOutcome::Failed,
        }
    }

    fn credentials(&self) -> (String, String) {
        let timestamp = Self::timestamp(Utc::now());
        let password = Self::password(&self.shortcode, self.passkey.expose_secret(), &timestamp);
        (password, timestamp)
    }

    async fn access_token(&self) -> AppResult<String> {
        let response = self
            .client
            .get(format!("{}/oauth/v1/generate", self.api_base))
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(&self.consumer_key, Some(self.consumer_secret.expose_secret()))
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, e))?;

        let token: AccessToken = handle_response(PROVIDER, response).await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl PaymentProviderPort for MobileMoneyAdapter {
    fn provider(&self) -> PaymentProvider {
        PROVIDER
    }

    async fn create_intent(&self, request: &IntentRequest) -> AppResult<ProviderIntentRef> {
        let ProviderSelection::MobileMoney { phone_number } = &request.selection else {
            return Err(AppError::InvalidInput(
                "mobile money payments need a phone number".into(),
            ));
        };

        let token = self.access_token().await?;
        let (password, timestamp) = self.credentials();
        let body = json!({
            "BusinessShortCode": self.shortcode,
            "Password": password,
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": Self::whole_units(request.amount_cents),
            "PartyA": phone_number,
            "PartyB": self.shortcode,
            "PhoneNumber": phone_number,
            "CallBackURL": self.callback_url,
            "AccountReference": request.intent_id.to_string(),
            "TransactionDesc": request.description,
        });

        let response = self
            .client
            .post(format!("{}/mpesa/stkpush/v1/processrequest", self.api_base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, e))?;

        let push: PushResponse = handle_response(PROVIDER, response).await?;
        if push.response_code != "0" {
            return Err(AppError::ProviderRejected(format!(
                "push request refused ({}): {}",
                push.response_code, push.response_description
            )));
        }

        Ok(ProviderIntentRef {
            external_reference: ExternalReference::new(push.checkout_request_id.clone()),
            client_payload: ClientPayload::PushPrompt {
                checkout_request_id: push.checkout_request_id,
                customer_message: push.customer_message,
            },
        })
    }

    async fn verify_intent(&self, reference: &ExternalReference) -> AppResult<ProviderOutcome> {
        let token = self.access_token().await?;
        let (password, timestamp) = self.credentials();
        let response = self
            .client
            .post(format!("{}/mpesa/stkpushquery/v1/query", self.api_base))
            .bearer_auth(token)
            .json(&json!({
                "BusinessShortCode": self.shortcode,
                "Password": password,
                "Timestamp": timestamp,
                "CheckoutRequestID": reference.as_str(),
            }))
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, e))?;

        // "Still processing" arrives as an error status, so the body is inspected first.
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("{PROVIDER} response unreadable: {e}")))?;
        let outcome = classify_query_response(status.is_success(), &body)
            .ok_or_else(|| status_error(PROVIDER, status, &body))?;

        tracing::debug!(
            external_reference = %reference,
            outcome = ?outcome,
            "Mobile money push verified"
        );
        Ok(outcome)
    }
}

/// Outcome of a push query, or `None` when the answer isn't a recognised query result.
fn classify_query_response(success: bool, body: &str) -> Option<ProviderOutcome> {
    let parsed: QueryResponse = serde_json::from_str(body).ok()?;
    if parsed.error_code.as_deref() == Some(STILL_PROCESSING_ERROR) {
        return Some(ProviderOutcome::Pending);
    }
    if !success {
        return None;
    }
    parsed
        .result_code
        .as_ref()
        .map(|code| MobileMoneyAdapter::map_result_code(&code.to_string()))
}

fn callback_url_with_token(callback_url: &str, token: &str) -> String {
    match url::Url::parse(callback_url) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("token", token);
            url.to_string()
        }
        Err(_) => callback_url.to_string(),
    }
}

// ============================================================================
// STK API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PushResponse {
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    response_code: String,
    #[serde(default)]
    response_description: String,
    #[serde(default)]
    customer_message: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(rename = "ResultCode")]
    result_code: Option<ResultCode>,
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

/// The query API sends the result code as a string, some sandboxes as a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResultCode {
    Text(String),
    Number(i64),
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultCode::Text(code) => write!(f, "{}", code),
            ResultCode::Number(code) => write!(f, "{}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_is_east_africa_time() {
        let now = Utc.with_ymd_and_hms(2025, 1, 31, 22, 30, 5).unwrap();
        assert_eq!(MobileMoneyAdapter::timestamp(now), "20250201013005");
    }

    #[test]
    fn password_concatenates_then_encodes() {
        let password = MobileMoneyAdapter::password("174379", "passkey", "20250201013005");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(password)
            .unwrap();
        assert_eq!(decoded, b"174379passkey20250201013005");
    }

    #[test]
    fn amount_rounds_up_to_whole_units() {
        assert_eq!(MobileMoneyAdapter::whole_units(100_000), 1000);
        assert_eq!(MobileMoneyAdapter::whole_units(2999), 30);
        assert_eq!(MobileMoneyAdapter::whole_units(1), 1);
    }

    #[test]
    fn query_results_map_to_outcomes() {
        assert_eq!(
            classify_query_response(true, r#"{"ResponseCode":"0","ResultCode":"0"}"#),
            Some(ProviderOutcome::Succeeded)
        );
        assert_eq!(
            classify_query_response(true, r#"{"ResponseCode":"0","ResultCode":"1032"}"#),
            Some(ProviderOutcome::Failed)
        );
        assert_eq!(
            classify_query_response(true, r#"{"ResultCode":1037}"#),
            Some(ProviderOutcome::Failed)
        );
        assert_eq!(
            classify_query_response(
                false,
                r#"{"requestId":"1","errorCode":"500.001.1001","errorMessage":"The transaction is being processed"}"#
            ),
            Some(ProviderOutcome::Pending)
        );
    }

    #[test]
    fn unrecognised_query_answers_are_errors() {
        assert_eq!(classify_query_response(false, "<html>bad gateway</html>"), None);
        assert_eq!(
            classify_query_response(false, r#"{"errorCode":"404.001.03","errorMessage":"Invalid Access Token"}"#),
            None
        );
        assert_eq!(classify_query_response(true, "{}"), None);
    }

    #[test]
    fn callback_url_carries_token() {
        let url = callback_url_with_token("https://billing.example/api/billing/webhook/mobile-money", "s3cret");
        assert_eq!(
            url,
            "https://billing.example/api/billing/webhook/mobile-money?token=s3cret"
        );
    }

    #[test]
    fn push_response_decodes() {
        let push: PushResponse = serde_json::from_str(
            r#"{"MerchantRequestID":"29115-34620561-1","CheckoutRequestID":"ws_CO_191220191020363925","ResponseCode":"0","ResponseDescription":"Success. Request accepted for processing","CustomerMessage":"Success. Request accepted for processing"}"#,
        )
        .unwrap();
        assert_eq!(push.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(push.response_code, "0");
    }
}
