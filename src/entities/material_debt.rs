use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;
use uuid::Uuid;

use super::department::Department;

/// Negative-inventory allowance: production consumed material before its
/// formal receipt. Carries two independent tracks — who approved the
/// debt, and how far settlements have covered it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "material_debts")]
#[schema(as = MaterialDebt)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub spk_id: Uuid,
    pub material_id: Uuid,
    pub department: Department,
    pub qty_owed: Decimal,
    /// Monotonically non-decreasing; settlements are never retracted.
    pub qty_settled: Decimal,
    pub approval_status: DebtApprovalStatus,
    pub debt_status: DebtStatus,
    pub due_date: Option<Date>,
    pub reason: String,
    /// Whether further consumption may deepen this shortfall before the
    /// debt is approved.
    pub allow_production_while_pending: bool,
    /// Snapshotted at creation: qtyOwed at or above the configured
    /// threshold requires a manager to finish the approval.
    pub requires_escalation: bool,
    /// Notes from the most recent approval decision.
    pub approval_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DebtApprovalStatus {
    #[sea_orm(string_value = "pending_approval")]
    PendingApproval,
    /// First-tier sign-off; waits for a manager when escalation applies.
    #[sea_orm(string_value = "spv_approved")]
    SpvApproved,
    /// Manager completed an escalated approval.
    #[sea_orm(string_value = "manager_approved")]
    ManagerApproved,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl DebtApprovalStatus {
    /// Both APPROVED and MANAGER_APPROVED are final approvals.
    pub fn is_approved(self) -> bool {
        matches!(
            self,
            DebtApprovalStatus::Approved | DebtApprovalStatus::ManagerApproved
        )
    }

    pub fn is_terminal(self) -> bool {
        self.is_approved() || self == DebtApprovalStatus::Rejected
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DebtStatus {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "partial_resolved")]
    PartialResolved,
    #[sea_orm(string_value = "fully_resolved")]
    FullyResolved,
    /// Settlements overshot the owed quantity.
    #[sea_orm(string_value = "excess")]
    Excess,
}

impl DebtStatus {
    /// Derive the settlement-track status from the two quantities.
    pub fn derive(qty_owed: Decimal, qty_settled: Decimal) -> DebtStatus {
        if qty_settled > qty_owed {
            DebtStatus::Excess
        } else if qty_settled == qty_owed {
            DebtStatus::FullyResolved
        } else if qty_settled > Decimal::ZERO {
            DebtStatus::PartialResolved
        } else {
            DebtStatus::Open
        }
    }
}

impl Model {
    pub fn remaining_debt(&self) -> Decimal {
        (self.qty_owed - self.qty_settled).max(Decimal::ZERO)
    }

    pub fn excess_qty(&self) -> Decimal {
        (self.qty_settled - self.qty_owed).max(Decimal::ZERO)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::debt_settlement::Entity")]
    Settlements,
}

impl Related<super::debt_settlement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Settlements.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = self.id {
                self.id = ActiveValue::Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = self.qty_settled {
                self.qty_settled = ActiveValue::Set(Decimal::ZERO);
            }
            if let ActiveValue::NotSet = self.approval_status {
                self.approval_status = ActiveValue::Set(DebtApprovalStatus::PendingApproval);
            }
            if let ActiveValue::NotSet = self.debt_status {
                self.debt_status = ActiveValue::Set(DebtStatus::Open);
            }
            if let ActiveValue::NotSet = self.version {
                self.version = ActiveValue::Set(1);
            }
            if let ActiveValue::NotSet = self.created_at {
                self.created_at = ActiveValue::Set(now);
            }
        }

        self.updated_at = ActiveValue::Set(now);

        Ok(self)
    }
}
