//! SeaORM entities for the order-release and material-resolution engine.

pub mod bom;
pub mod bom_detail;
pub mod bom_variant;
pub mod debt_settlement;
pub mod department;
pub mod manufacturing_order;
pub mod material_allocation;
pub mod material_balance;
pub mod material_debt;
pub mod purchase_order;
pub mod spk;
pub mod wip_buffer;

pub use department::Department;
