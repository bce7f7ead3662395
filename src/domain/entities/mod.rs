pub mod payment_intent;
pub mod payment_provider;
pub mod payment_status;
pub mod subscription_plan;
pub mod subscription_state;
