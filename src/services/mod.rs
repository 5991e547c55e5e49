//! Business logic services

pub mod cache;
pub mod catalog;
pub mod clock;
pub mod ledger;

use std::sync::Arc;

use crate::{config::AppConfig, repository::Store};

use self::clock::Clock;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub ledger: ledger::LendingLedger,
    pub cache: cache::ResponseCache,
}

impl Services {
    /// Wire every service onto one store and one clock
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: &AppConfig) -> Self {
        let ledger = ledger::LendingLedger::new(store.clone(), clock.clone(), config.lending.clone());
        Self {
            catalog: catalog::CatalogService::new(store, ledger.clone()),
            ledger,
            cache: cache::ResponseCache::new(clock, config.cache.clone()),
        }
    }
}
