use crate::{adapters::persistence::PostgresPersistence, infra::db::init_db};

pub mod app;
pub mod card_payment_adapter;
pub mod config;
pub mod db;
pub mod http_client;
pub mod mobile_money_adapter;
pub mod redirect_payment_adapter;
pub mod setup;
pub mod webhook_verifier;

pub async fn postgres_persistence(database_url: &str) -> anyhow::Result<PostgresPersistence> {
    let pool = init_db(database_url).await?;
    let persistence = PostgresPersistence::new(pool);
    Ok(persistence)
}
