pub mod provider_registry;
pub mod reconciliation;
pub mod subscription;
