use std::sync::Arc;

use crate::{config::AppConfig, db::OrmConn, payments::PaymentGateway};

#[derive(Clone)]
pub struct AppState {
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    /// `None` when no payment processor key is configured.
    pub payments: Option<Arc<dyn PaymentGateway>>,
}

impl AppState {
    pub fn new(
        orm: OrmConn,
        config: AppConfig,
        payments: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        Self {
            orm,
            config: Arc::new(config),
            payments,
        }
    }
}
