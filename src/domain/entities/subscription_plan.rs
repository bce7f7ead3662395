use serde::Serialize;
use uuid::Uuid;

/// A purchasable plan. The catalog is seeded externally and read-only here.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub duration_days: i32,
    pub max_campaigns: i32,
    pub features: Vec<String>,
    pub is_active: bool,
}

impl SubscriptionPlan {
    /// Price formatted in major units, e.g. `29.99 USD`
    pub fn display_price(&self) -> String {
        format!(
            "{}.{:02} {}",
            self.price_cents / 100,
            self.price_cents % 100,
            self.currency
        )
    }
}
