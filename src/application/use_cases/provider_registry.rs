use std::sync::Arc;

use crate::{
    application::ports::payment_provider::PaymentProviderPort,
    domain::entities::payment_provider::PaymentProvider,
    infra::{
        card_payment_adapter::CardPaymentAdapter, config::AppConfig,
        mobile_money_adapter::MobileMoneyAdapter, redirect_payment_adapter::RedirectPaymentAdapter,
    },
};

/// One adapter per provider variant, built once at startup and shared by all requests.
pub struct ProviderRegistry {
    card: Arc<dyn PaymentProviderPort>,
    redirect: Arc<dyn PaymentProviderPort>,
    mobile_money: Arc<dyn PaymentProviderPort>,
}

impl ProviderRegistry {
    pub fn new(
        card: Arc<dyn PaymentProviderPort>,
        redirect: Arc<dyn PaymentProviderPort>,
        mobile_money: Arc<dyn PaymentProviderPort>,
    ) -> Self {
        debug_assert_eq!(card.provider(), PaymentProvider::Card);
        debug_assert_eq!(redirect.provider(), PaymentProvider::Redirect);
        debug_assert_eq!(mobile_money.provider(), PaymentProvider::MobileMoney);
        Self {
            card,
            redirect,
            mobile_money,
        }
    }

    /// Build the real HTTP adapters from configuration, sharing one HTTP client.
    pub fn from_config(config: &AppConfig, http: reqwest::Client) -> Self {
        Self::new(
            Arc::new(CardPaymentAdapter::new(http.clone(), &config.card)),
            Arc::new(RedirectPaymentAdapter::new(http.clone(), &config.redirect)),
            Arc::new(MobileMoneyAdapter::new(http, &config.mobile_money)),
        )
    }

    pub fn get(&self, provider: PaymentProvider) -> Arc<dyn PaymentProviderPort> {
        match provider {
            PaymentProvider::Card => self.card.clone(),
            PaymentProvider::Redirect => self.redirect.clone(),
            PaymentProvider::MobileMoney => self.mobile_money.clone(),
        }
    }
}
