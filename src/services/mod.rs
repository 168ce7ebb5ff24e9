pub mod bom_resolver;
pub mod material_ledger;
pub mod po_registry;
pub mod release;
pub mod wip_tracker;

pub use bom_resolver::BomResolverService;
pub use material_ledger::MaterialLedgerService;
pub use po_registry::PoRegistryService;
pub use release::ReleaseService;
pub use wip_tracker::WipTrackerService;
