use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;
use uuid::Uuid;

use super::department::Department;

/// Work-in-progress buffer between two production stages, keyed by
/// (department, article, SPK). `buffer_stock` is signed — negative means
/// the department consumed pieces it has not yet received.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "wip_buffers")]
#[schema(as = WipBuffer)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub department: Department,
    pub article_id: Uuid,
    pub article_code: String,
    pub spk_id: Uuid,
    pub buffer_stock: i32,
    pub cumulative_produced: i32,
    pub cumulative_consumed: i32,
    pub target_qty: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived buffer band; never stored. The 15/30/50% bands match the
/// tri-band the material ledger uses for balance health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WipStatus {
    Abundant,
    Sufficient,
    Low,
    Critical,
    Negative,
}

impl Model {
    /// Band from the bufferStock/targetQty ratio. A zero target with
    /// stock on hand counts as abundant; zero/zero is critical.
    pub fn derived_status(&self) -> WipStatus {
        derive_status(self.buffer_stock, self.target_qty)
    }
}

pub fn derive_status(buffer_stock: i32, target_qty: i32) -> WipStatus {
    if buffer_stock < 0 {
        return WipStatus::Negative;
    }
    if target_qty <= 0 {
        return if buffer_stock > 0 {
            WipStatus::Abundant
        } else {
            WipStatus::Critical
        };
    }
    let ratio = buffer_stock as f64 / target_qty as f64;
    if ratio >= 0.5 {
        WipStatus::Abundant
    } else if ratio >= 0.3 {
        WipStatus::Sufficient
    } else if ratio < 0.15 {
        WipStatus::Critical
    } else {
        WipStatus::Low
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::spk::Entity",
        from = "Column::SpkId",
        to = "super::spk::Column::Id"
    )]
    Spk,
}

impl Related<super::spk::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Spk.def()
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
    use test_case::test_case;

    #[test_case(-1, 1000, WipStatus::Negative ; "negative stock")]
    #[test_case(500, 1000, WipStatus::Abundant ; "at half")]
    #[test_case(300, 1000, WipStatus::Sufficient ; "at thirty percent")]
    #[test_case(299, 1000, WipStatus::Low ; "just under thirty")]
    #[test_case(150, 1000, WipStatus::Low ; "at fifteen percent")]
    #[test_case(149, 1000, WipStatus::Critical ; "under fifteen")]
    #[test_case(0, 1000, WipStatus::Critical ; "empty buffer")]
    fn band_boundaries(stock: i32, target: i32, expected: WipStatus) {
        assert_eq!(derive_status(stock, target), expected);
    }

    #[test]
    fn zero_target_edge_cases() {
        assert_eq!(derive_status(10, 0), WipStatus::Abundant);
        assert_eq!(derive_status(0, 0), WipStatus::Critical);
        assert_eq!(derive_status(-5, 0), WipStatus::Negative);
    }
}
