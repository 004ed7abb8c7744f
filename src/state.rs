use crate::{config::AppConfig, db::DbPool, mpesa::MpesaGateway};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: AppConfig,
    pub mpesa: MpesaGateway,
}
