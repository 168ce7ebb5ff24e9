//! Role-based authorization gate.
//!
//! The engine does not authenticate anyone; callers arrive with a role
//! already resolved by the upstream permission service, passed explicitly
//! on each gated operation. The capability check is a total match so a
//! new role or capability cannot be added without the compiler pointing
//! at every decision site.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use utoipa::ToSchema;

/// Shop-floor roles, ordered by authority.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumIter, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Role {
    Operator,
    Spv,
    Manager,
    Admin,
}

/// Everything a role can be asked to do in this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    /// Drive the MO release state machine (partial/full/complete).
    ReleaseMo,
    /// First-tier material-debt approval.
    ApproveDebtSpv,
    /// Final material-debt approval or rejection at the manager desk.
    ApproveDebtFinal,
    /// Record WIP production, consumption and transfers.
    RecordWip,
    /// Author BOM structure: details, variants, multi-material toggles.
    ManageBom,
}

impl Role {
    pub fn has_capability(self, capability: Capability) -> bool {
        match (self, capability) {
            (Role::Operator, Capability::RecordWip) => true,
            (Role::Operator, _) => false,

            (Role::Spv, Capability::ReleaseMo) => true,
            (Role::Spv, Capability::ApproveDebtSpv) => true,
            (Role::Spv, Capability::RecordWip) => true,
            (Role::Spv, Capability::ApproveDebtFinal) => false,
            (Role::Spv, Capability::ManageBom) => false,

            (Role::Manager, _) => true,
            (Role::Admin, _) => true,
        }
    }

    /// True for MANAGER and above; the debt approval track treats these
    /// roles as able to finalize in one step.
    pub fn is_manager_or_higher(self) -> bool {
        self >= Role::Manager
    }
}
