use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;

/// Production departments in process order. The declaration order is
/// load-bearing: bottleneck ties resolve to the earliest department.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Department {
    #[sea_orm(string_value = "cutting")]
    Cutting,
    #[sea_orm(string_value = "embroidery")]
    Embroidery,
    #[sea_orm(string_value = "sewing")]
    Sewing,
    #[sea_orm(string_value = "finishing")]
    Finishing,
    #[sea_orm(string_value = "packing")]
    Packing,
}

impl Department {
    pub const ALL: [Department; 5] = [
        Department::Cutting,
        Department::Embroidery,
        Department::Sewing,
        Department::Finishing,
        Department::Packing,
    ];

    /// Departments unlocked by a partial release (fabric is available).
    pub const PARTIAL_RELEASE: [Department; 2] = [Department::Cutting, Department::Embroidery];

    /// Departments unlocked by a full release (labels are available).
    pub const FULL_RELEASE: [Department; 3] = [
        Department::Sewing,
        Department::Finishing,
        Department::Packing,
    ];

    /// Position in the process chain, used for bottleneck tie-breaks.
    pub fn process_order(self) -> usize {
        match self {
            Department::Cutting => 0,
            Department::Embroidery => 1,
            Department::Sewing => 2,
            Department::Finishing => 3,
            Department::Packing => 4,
        }
    }

    /// Short code used in SPK numbers.
    pub fn code(self) -> &'static str {
        match self {
            Department::Cutting => "CUT",
            Department::Embroidery => "EMB",
            Department::Sewing => "SEW",
            Department::Finishing => "FIN",
            Department::Packing => "PCK",
        }
    }
}
