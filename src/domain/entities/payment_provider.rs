use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// The external processor a payment intent was created with.
///
/// Parsed once at the HTTP boundary and carried as a typed value from there on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
    EnumString,
)]
#[sqlx(type_name = "payment_provider", rename_all = "snake_case")]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum PaymentProvider {
    /// Card processor confirmed client-side with a client secret.
    Card,
    /// Hosted checkout the payer is redirected to for approval.
    Redirect,
    /// STK push to the payer's phone.
    #[serde(alias = "mobile_money")]
    #[strum(to_string = "mobile-money", serialize = "mobile_money")]
    MobileMoney,
}
