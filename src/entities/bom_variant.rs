use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Alternative material for a multi-material BOM line. Only active and
/// approved variants participate in selection; `qty_variance` (absolute)
/// and `qty_variance_percent` are mutually exclusive overrides of the
/// parent line quantity.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "bom_variants")]
#[schema(as = BomVariant)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub detail_id: Uuid,
    pub material_id: Uuid,
    pub variant_type: VariantType,
    /// Tie-break order; the lowest sequence owns the draw on equal weights.
    pub sequence: i32,
    pub qty_variance: Option<Decimal>,
    pub qty_variance_percent: Option<Decimal>,
    /// Relative selection likelihood; must be > 0.
    pub weight: i32,
    pub cost_variance: Option<Decimal>,
    pub is_active: bool,
    pub approval_status: VariantApproval,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantType {
    #[sea_orm(string_value = "primary")]
    Primary,
    #[sea_orm(string_value = "alternative")]
    Alternative,
    #[sea_orm(string_value = "optional")]
    Optional,
}

impl VariantType {
    /// Preference order used by PRIMARY_FIRST selection.
    pub fn rank(self) -> u8 {
        match self {
            VariantType::Primary => 0,
            VariantType::Alternative => 1,
            VariantType::Optional => 2,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantApproval {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl Model {
    /// Eligible for probability computation and automatic resolution.
    pub fn is_eligible(&self) -> bool {
        self.is_active && self.approval_status == VariantApproval::Approved
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bom_detail::Entity",
        from = "Column::DetailId",
        to = "super::bom_detail::Column::Id"
    )]
    Detail,
}

impl Related<super::bom_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Detail.def()
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
            if let ActiveValue::NotSet = self.approval_status {
                self.approval_status = ActiveValue::Set(VariantApproval::Pending);
            }
            if let ActiveValue::NotSet = self.created_at {
                self.created_at = ActiveValue::Set(now);
            }
        }

        self.updated_at = ActiveValue::Set(now);

        Ok(self)
    }
}
