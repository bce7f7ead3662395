//! Secrets and signing helpers for webhook tests.

use hmac::{Hmac, Mac};
use secrecy::SecretString;
use sha2::Sha256;

use crate::infra::webhook_verifier::{WebhookSecrets, WebhookVerifier};

pub const TEST_CARD_WEBHOOK_SECRET: &str = "whsec_test_card_secret";
pub const TEST_REDIRECT_WEBHOOK_ID: &str = "WH-TEST-0001";
pub const TEST_REDIRECT_WEBHOOK_SECRET: &str = "redirect_test_signing_secret";
pub const TEST_CALLBACK_TOKEN: &str = "cb0token0for0tests";
pub const TEST_WEBHOOK_TOLERANCE_SECS: i64 = 300;

fn hex_hmac(secret: &str, parts: &[&[u8]]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    for part in parts {
        mac.update(part);
    }
    hex::encode(mac.finalize().into_bytes())
}

/// `v1` signature for a card webhook sent at `timestamp`.
pub fn sign_card_webhook(secret: &str, timestamp: i64, body: &[u8]) -> String {
    hex_hmac(secret, &[timestamp.to_string().as_bytes(), b".", body])
}

/// Transmission signature for a redirect-provider webhook.
pub fn sign_redirect_webhook(
    secret: &str,
    transmission_id: &str,
    transmission_time: &str,
    webhook_id: &str,
    body: &[u8],
) -> String {
    hex_hmac(
        secret,
        &[
            transmission_id.as_bytes(),
            b"|",
            transmission_time.as_bytes(),
            b"|",
            webhook_id.as_bytes(),
            b"|",
            body,
        ],
    )
}

pub fn test_webhook_secrets() -> WebhookSecrets {
    WebhookSecrets {
        card_signing_secret: SecretString::new(TEST_CARD_WEBHOOK_SECRET.into()),
        redirect_webhook_id: TEST_REDIRECT_WEBHOOK_ID.to_string(),
        redirect_signing_secret: SecretString::new(TEST_REDIRECT_WEBHOOK_SECRET.into()),
        mobile_money_callback_token: SecretString::new(TEST_CALLBACK_TOKEN.into()),
    }
}

pub fn test_webhook_verifier() -> WebhookVerifier {
    WebhookVerifier::new(test_webhook_secrets(), TEST_WEBHOOK_TOLERANCE_SECS)
}
