pub mod boms;
pub mod common;
pub mod manufacturing_orders;
pub mod material_debts;
pub mod materials;
pub mod purchase_orders;
pub mod wip;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    BomResolverService, MaterialLedgerService, PoRegistryService, ReleaseService,
    WipTrackerService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub po_registry: Arc<PoRegistryService>,
    pub release: Arc<ReleaseService>,
    pub bom_resolver: Arc<BomResolverService>,
    pub wip_tracker: Arc<WipTrackerService>,
    pub material_ledger: Arc<MaterialLedgerService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let bom_resolver = BomResolverService::new(db_pool.clone());
        let material_ledger = MaterialLedgerService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.debt_escalation_threshold,
        );
        let release = ReleaseService::new(
            db_pool.clone(),
            event_sender.clone(),
            bom_resolver.clone(),
            material_ledger.clone(),
            config.fanout_retry_config(),
        );
        let po_registry = PoRegistryService::new(db_pool.clone(), event_sender.clone());
        let wip_tracker =
            WipTrackerService::new(db_pool, event_sender, config.wip_debt_allowance);

        Self {
            po_registry: Arc::new(po_registry),
            release: Arc::new(release),
            bom_resolver: Arc::new(bom_resolver),
            wip_tracker: Arc::new(wip_tracker),
            material_ledger: Arc::new(material_ledger),
        }
    }
}
