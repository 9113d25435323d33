use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn, orm_from_pool},
    printer::{ReceiptPrinter, printer_from_config},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub printer: Arc<dyn ReceiptPrinter>,
}

impl AppState {
    /// Builds the state from a pool, wiring the printer described by the config.
    pub fn new(pool: DbPool, config: AppConfig) -> anyhow::Result<Self> {
        let printer = printer_from_config(&config.printer)?;
        Ok(Self::with_printer(pool, config, printer))
    }

    pub fn with_printer(
        pool: DbPool,
        config: AppConfig,
        printer: Arc<dyn ReceiptPrinter>,
    ) -> Self {
        let orm = orm_from_pool(&pool);
        Self {
            pool,
            orm,
            config: Arc::new(config),
            printer,
        }
    }
}
