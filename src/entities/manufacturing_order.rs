use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;
use uuid::Uuid;

/// Manufacturing order: the top-level production-quantity commitment for
/// an article, driven by the dual-trigger (PO-Kain / PO-Label) release.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "manufacturing_orders")]
#[schema(as = ManufacturingOrder)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub article_id: Uuid,
    /// Human-facing SKU, denormalized onto SPKs and WIP rows at fan-out.
    pub article_code: String,
    pub target_qty: i32,
    pub buffer_percent: Decimal,
    /// target_qty plus the rounded buffer; never below target_qty.
    pub final_qty: i32,
    /// Candidate values from the bound label until full release locks
    /// them in as inherited, immutable fields.
    pub week: Option<String>,
    pub destination: Option<String>,
    pub status: MoStatus,
    pub po_kain_id: Option<Uuid>,
    #[sea_orm(unique)]
    pub po_label_id: Uuid,
    /// Set when the full-release fan-out has recorded its
    /// material-allocation request; part of fan-out completion tracking.
    pub allocation_requested_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MoStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "partial")]
    Partial,
    /// Release committed, but one or more fan-out legs (SPK generation,
    /// allocation request) still outstanding; re-drivable.
    #[sea_orm(string_value = "released_pending_fanout")]
    ReleasedPendingFanout,
    #[sea_orm(string_value = "released")]
    Released,
    #[sea_orm(string_value = "completed")]
    Completed,
}

impl MoStatus {
    /// Forward-only state machine; no backward edges.
    pub fn can_transition_to(self, next: MoStatus) -> bool {
        matches!(
            (self, next),
            (MoStatus::Draft, MoStatus::Partial)
                | (MoStatus::Partial, MoStatus::ReleasedPendingFanout)
                | (MoStatus::ReleasedPendingFanout, MoStatus::Released)
                | (MoStatus::Released, MoStatus::Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MoStatus::Completed)
    }

    /// True once the full release has been committed (fan-out may still
    /// be outstanding).
    pub fn is_released(self) -> bool {
        matches!(
            self,
            MoStatus::ReleasedPendingFanout | MoStatus::Released | MoStatus::Completed
        )
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::spk::Entity")]
    Spks,
    #[sea_orm(has_many = "super::material_allocation::Entity")]
    Allocations,
}

impl Related<super::spk::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Spks.def()
    }
}

impl Related<super::material_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Allocations.def()
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
            if let ActiveValue::NotSet = self.status {
                self.status = ActiveValue::Set(MoStatus::Draft);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_forward_only() {
        assert!(MoStatus::Draft.can_transition_to(MoStatus::Partial));
        assert!(MoStatus::Partial.can_transition_to(MoStatus::ReleasedPendingFanout));
        assert!(MoStatus::ReleasedPendingFanout.can_transition_to(MoStatus::Released));
        assert!(MoStatus::Released.can_transition_to(MoStatus::Completed));

        assert!(!MoStatus::Partial.can_transition_to(MoStatus::Draft));
        assert!(!MoStatus::Draft.can_transition_to(MoStatus::ReleasedPendingFanout));
        assert!(!MoStatus::Draft.can_transition_to(MoStatus::Released));
        assert!(!MoStatus::Completed.can_transition_to(MoStatus::Released));
    }

    #[test]
    fn completed_is_terminal() {
        assert!(MoStatus::Completed.is_terminal());
        for next in [
            MoStatus::Draft,
            MoStatus::Partial,
            MoStatus::ReleasedPendingFanout,
            MoStatus::Released,
            MoStatus::Completed,
        ] {
            assert!(!MoStatus::Completed.can_transition_to(next));
        }
    }

    #[test]
    fn released_covers_pending_fanout_sub_state() {
        assert!(MoStatus::ReleasedPendingFanout.is_released());
        assert!(MoStatus::Released.is_released());
        assert!(!MoStatus::Partial.is_released());
    }
}
