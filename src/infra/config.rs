use std::{net::SocketAddr, time::Duration};

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub cors_origin: HeaderValue,
    /// Total time allowed for one provider call, including verification.
    pub provider_timeout: Duration,
    pub provider_connect_timeout: Duration,
    /// Maximum age of a signed webhook, in seconds.
    pub webhook_tolerance_secs: i64,
    /// Campaign quota for users without a paid subscription.
    pub free_campaign_limit: i32,
    pub card: CardConfig,
    pub redirect: RedirectConfig,
    pub mobile_money: MobileMoneyConfig,
}

pub struct CardConfig {
    pub api_base: Url,
    pub secret_key: SecretString,
    /// Handed to the browser; not a secret.
    pub publishable_key: String,
    pub webhook_secret: SecretString,
}

pub struct RedirectConfig {
    pub api_base: Url,
    pub client_id: String,
    pub client_secret: SecretString,
    pub webhook_id: String,
    pub webhook_secret: SecretString,
    pub return_url: Url,
    pub cancel_url: Url,
}

pub struct MobileMoneyConfig {
    pub api_base: Url,
    pub consumer_key: String,
    pub consumer_secret: SecretString,
    pub shortcode: String,
    pub passkey: SecretString,
    pub callback_url: Url,
    pub callback_token: SecretString,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let bind_addr: SocketAddr =
            get_env_default("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3001)));
        let database_url: String = get_env("DATABASE_URL");
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .expect("CORS_ORIGIN must be a valid header value");

        let provider_timeout_secs: u64 = get_env_default("PROVIDER_TIMEOUT_SECS", 15);
        let provider_connect_timeout_secs: u64 =
            get_env_default("PROVIDER_CONNECT_TIMEOUT_SECS", 5);
        let webhook_tolerance_secs: i64 = get_env_default("WEBHOOK_TOLERANCE_SECS", 300);
        let free_campaign_limit: i32 = get_env_default("FREE_CAMPAIGN_LIMIT", 1);

        Self {
            bind_addr,
            database_url,
            cors_origin,
            provider_timeout: Duration::from_secs(provider_timeout_secs),
            provider_connect_timeout: Duration::from_secs(provider_connect_timeout_secs),
            webhook_tolerance_secs,
            free_campaign_limit,
            card: CardConfig::from_env(),
            redirect: RedirectConfig::from_env(),
            mobile_money: MobileMoneyConfig::from_env(),
        }
    }
}

impl CardConfig {
    fn from_env() -> Self {
        Self {
            api_base: get_env_default(
                "CARD_API_BASE",
                Url::parse("https://api.stripe.com").expect("valid default card API base"),
            ),
            secret_key: secret("CARD_SECRET_KEY"),
            publishable_key: get_env("CARD_PUBLISHABLE_KEY"),
            webhook_secret: secret("CARD_WEBHOOK_SECRET"),
        }
    }
}

impl RedirectConfig {
    fn from_env() -> Self {
        Self {
            api_base: get_env_default(
                "REDIRECT_API_BASE",
                Url::parse("https://api-m.sandbox.paypal.com")
                    .expect("valid default redirect API base"),
            ),
            client_id: get_env("REDIRECT_CLIENT_ID"),
            client_secret: secret("REDIRECT_CLIENT_SECRET"),
            webhook_id: get_env("REDIRECT_WEBHOOK_ID"),
            webhook_secret: secret("REDIRECT_WEBHOOK_SECRET"),
            return_url: get_env("REDIRECT_RETURN_URL"),
            cancel_url: get_env("REDIRECT_CANCEL_URL"),
        }
    }
}

impl MobileMoneyConfig {
    fn from_env() -> Self {
        Self {
            api_base: get_env_default(
                "MOBILE_MONEY_API_BASE",
                Url::parse("https://sandbox.safaricom.co.ke")
                    .expect("valid default mobile money API base"),
            ),
            consumer_key: get_env("MOBILE_MONEY_CONSUMER_KEY"),
            consumer_secret: secret("MOBILE_MONEY_CONSUMER_SECRET"),
            shortcode: get_env("MOBILE_MONEY_SHORTCODE"),
            passkey: secret("MOBILE_MONEY_PASSKEY"),
            callback_url: get_env("MOBILE_MONEY_CALLBACK_URL"),
            callback_token: secret("MOBILE_MONEY_CALLBACK_TOKEN"),
        }
    }
}

fn secret(name: &'static str) -> SecretString {
    SecretString::new(get_env::<String>(name).into())
}

/// Base URL without a trailing slash, ready for `format!("{base}/path")`.
pub fn api_base(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}
