use crate::{
    db::DbPool,
    entities::{
        bom::{self, BomType, Entity as BomEntity},
        bom_detail::{self, Entity as BomDetailEntity, VariantSelectionMode},
        bom_variant::{self, Entity as BomVariantEntity, VariantApproval, VariantType},
        department::Department,
    },
    errors::ServiceError,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::sea_query::Expr;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// Recursion ceiling of an explosion when the caller does not pick one.
pub const DEFAULT_MAX_DEPTH: u32 = 10;

#[derive(Debug, Clone, Copy)]
pub struct ExplosionOptions {
    pub max_depth: u32,
    /// Fixes the weighted-variant draws, making a run reproducible.
    pub seed: Option<u64>,
    /// In strict mode a line whose variants are all ineligible fails the
    /// walk instead of falling back to the parent component.
    pub strict: bool,
}

impl Default for ExplosionOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            seed: None,
            strict: false,
        }
    }
}

/// In-memory picture of every BOM reachable from one product, read once
/// up front so a walk never touches the database mid-iteration.
#[derive(Debug, Clone, Default)]
pub struct BomSnapshot {
    boms: HashMap<Uuid, SnapshotBom>,
}

impl BomSnapshot {
    pub fn insert(&mut self, product_id: Uuid, bom: SnapshotBom) {
        self.boms.insert(product_id, bom);
    }

    pub fn get(&self, product_id: &Uuid) -> Option<&SnapshotBom> {
        self.boms.get(product_id)
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotBom {
    pub bom_id: Uuid,
    pub qty_output: Decimal,
    /// In line position order.
    pub details: Vec<SnapshotDetail>,
}

#[derive(Debug, Clone)]
pub struct SnapshotDetail {
    pub detail_id: Uuid,
    pub component_id: Uuid,
    pub qty_needed: Decimal,
    pub wastage_percent: Decimal,
    pub department: Option<Department>,
    /// Line toggle AND the header's supportsMultiMaterial gate, folded
    /// together at snapshot time.
    pub has_variants: bool,
    pub selection_mode: VariantSelectionMode,
    /// In sequence order.
    pub variants: Vec<SnapshotVariant>,
}

#[derive(Debug, Clone)]
pub struct SnapshotVariant {
    pub variant_id: Uuid,
    pub material_id: Uuid,
    pub variant_type: VariantType,
    pub sequence: i32,
    pub qty_variance: Option<Decimal>,
    pub qty_variance_percent: Option<Decimal>,
    pub weight: i32,
    pub eligible: bool,
}

impl From<bom_variant::Model> for SnapshotVariant {
    fn from(model: bom_variant::Model) -> Self {
        let eligible = model.is_eligible();
        Self {
            variant_id: model.id,
            material_id: model.material_id,
            variant_type: model.variant_type,
            sequence: model.sequence,
            qty_variance: model.qty_variance,
            qty_variance_percent: model.qty_variance_percent,
            weight: model.weight,
            eligible,
        }
    }
}

/// One emitted line of an explosion. `qty_base` is the post-variance,
/// pre-wastage demand; `qty_required` adds the wastage factor and is what
/// child levels multiply through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExplosionNode {
    pub product_id: Uuid,
    pub detail_id: Uuid,
    pub component_id: Uuid,
    /// Resolved material: the chosen variant's material, or the component
    /// itself for plain lines and fallbacks.
    pub material_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub level: u32,
    pub department: Option<Department>,
    pub qty_base: Decimal,
    pub qty_required: Decimal,
    pub is_leaf: bool,
}

/// Leaf demand grouped by (material, department).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MaterialRequirement {
    pub material_id: Uuid,
    pub department: Option<Department>,
    pub total_qty: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExplosionReport {
    pub product_id: Uuid,
    pub qty: Decimal,
    pub max_depth: u32,
    pub seed: Option<u64>,
    pub strict: bool,
    pub nodes: Vec<ExplosionNode>,
    pub rolled_up: Vec<MaterialRequirement>,
}

struct Frame {
    product_id: Uuid,
    qty: Decimal,
    level: u32,
    next_detail: usize,
}

/// Lazy depth-first explosion over a snapshot. Finite and
/// non-restartable; the first error fuses the iterator.
pub struct ExplosionWalk {
    snapshot: BomSnapshot,
    stack: Vec<Frame>,
    /// Products on the active recursion path, for the cycle guard.
    path: Vec<Uuid>,
    rng: StdRng,
    max_depth: u32,
    strict: bool,
    poisoned: bool,
}

impl ExplosionWalk {
    pub fn new(
        snapshot: BomSnapshot,
        product_id: Uuid,
        qty: Decimal,
        options: &ExplosionOptions,
    ) -> Result<Self, ServiceError> {
        if qty <= Decimal::ZERO {
            return Err(ServiceError::InvalidQuantity(
                "explosion qty must be greater than zero".to_string(),
            ));
        }
        if options.max_depth < 1 {
            return Err(ServiceError::OutOfRange(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if snapshot.get(&product_id).is_none() {
            return Err(ServiceError::NotFound(format!(
                "no active BOM for product {}",
                product_id
            )));
        }

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            snapshot,
            stack: vec![Frame {
                product_id,
                qty,
                level: 1,
                next_detail: 0,
            }],
            path: vec![product_id],
            rng,
            max_depth: options.max_depth,
            strict: options.strict,
            poisoned: false,
        })
    }
}

impl Iterator for ExplosionWalk {
    type Item = Result<ExplosionNode, ServiceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned {
            return None;
        }
        loop {
            let frame = self.stack.last_mut()?;
            let product_id = frame.product_id;
            let level = frame.level;
            let parent_qty = frame.qty;
            let detail_index = frame.next_detail;
            frame.next_detail += 1;

            let Some(bom) = self.snapshot.get(&product_id) else {
                self.stack.pop();
                self.path.pop();
                continue;
            };
            let Some(detail) = bom.details.get(detail_index) else {
                self.stack.pop();
                self.path.pop();
                continue;
            };

            // The cycle guard comes before the depth cap: a cyclic
            // component must fail even at the deepest level.
            let child_has_bom = self.snapshot.get(&detail.component_id).is_some();
            if child_has_bom && self.path.contains(&detail.component_id) {
                self.poisoned = true;
                return Some(Err(ServiceError::CyclicBom {
                    product_id: detail.component_id,
                }));
            }

            let is_leaf = !child_has_bom || level >= self.max_depth;

            let resolution = if is_leaf {
                match resolve_detail(detail, &mut self.rng, self.strict) {
                    Ok(resolution) => resolution,
                    Err(err) => {
                        self.poisoned = true;
                        return Some(Err(err));
                    }
                }
            } else {
                VariantResolution {
                    material_id: detail.component_id,
                    variant_id: None,
                    effective_qty: detail.qty_needed,
                }
            };

            let qty_base = parent_qty * resolution.effective_qty;
            let qty_required = qty_base * (Decimal::ONE + detail.wastage_percent / dec!(100));

            let node = ExplosionNode {
                product_id,
                detail_id: detail.detail_id,
                component_id: detail.component_id,
                material_id: resolution.material_id,
                variant_id: resolution.variant_id,
                level,
                department: detail.department,
                qty_base,
                qty_required,
                is_leaf,
            };

            if !is_leaf {
                let component_id = detail.component_id;
                self.stack.push(Frame {
                    product_id: component_id,
                    qty: qty_required,
                    level: level + 1,
                    next_detail: 0,
                });
                self.path.push(component_id);
            }

            return Some(Ok(node));
        }
    }
}

struct VariantResolution {
    material_id: Uuid,
    variant_id: Option<Uuid>,
    effective_qty: Decimal,
}

/// Resolves one line to a concrete material. The rng advances only when a
/// weighted draw over two or more eligible variants actually happens, so
/// plain lines never shift later draws.
fn resolve_detail(
    detail: &SnapshotDetail,
    rng: &mut StdRng,
    strict: bool,
) -> Result<VariantResolution, ServiceError> {
    let parent = VariantResolution {
        material_id: detail.component_id,
        variant_id: None,
        effective_qty: detail.qty_needed,
    };

    // A line without variant rows is a single-material line even when the
    // toggle is on.
    if !detail.has_variants || detail.variants.is_empty() {
        return Ok(parent);
    }

    let eligible: Vec<&SnapshotVariant> = detail.variants.iter().filter(|v| v.eligible).collect();
    if eligible.is_empty() {
        if strict {
            return Err(ServiceError::NoEligibleVariant {
                detail_id: detail.detail_id,
            });
        }
        return Ok(parent);
    }

    let chosen: &SnapshotVariant = match detail.selection_mode {
        VariantSelectionMode::PrimaryFirst => {
            let mut best = eligible[0];
            for variant in eligible.iter().copied() {
                if (variant.variant_type.rank(), variant.sequence)
                    < (best.variant_type.rank(), best.sequence)
                {
                    best = variant;
                }
            }
            best
        }
        VariantSelectionMode::Weighted => {
            if eligible.len() == 1 {
                eligible[0]
            } else {
                // Variants arrive sequence-sorted, so on a boundary tie
                // the lowest sequence owns the draw.
                let total: i64 = eligible.iter().map(|v| i64::from(v.weight)).sum();
                let mut draw = rng.gen_range(0..total);
                let mut chosen = eligible[0];
                for variant in eligible.iter().copied() {
                    let weight = i64::from(variant.weight);
                    if draw < weight {
                        chosen = variant;
                        break;
                    }
                    draw -= weight;
                }
                chosen
            }
        }
    };

    let effective_qty = if let Some(absolute) = chosen.qty_variance {
        absolute
    } else if let Some(percent) = chosen.qty_variance_percent {
        detail.qty_needed * (Decimal::ONE + percent / dec!(100))
    } else {
        detail.qty_needed
    };

    Ok(VariantResolution {
        material_id: chosen.material_id,
        variant_id: Some(chosen.variant_id),
        effective_qty,
    })
}

/// Selection probabilities of the eligible variants, in percent rounded
/// to two places. Ineligible variants get no entry.
pub fn selection_probabilities(variants: &[bom_variant::Model]) -> Vec<(Uuid, Decimal)> {
    let eligible: Vec<&bom_variant::Model> =
        variants.iter().filter(|v| v.is_eligible()).collect();
    let total: i64 = eligible.iter().map(|v| i64::from(v.weight)).sum();
    if total <= 0 {
        return Vec::new();
    }
    eligible
        .iter()
        .map(|v| {
            let share = Decimal::from(v.weight) * dec!(100) / Decimal::from(total);
            (v.id, share.round_dp(2))
        })
        .collect()
}

/// Groups leaf demand by (material, department), in first-appearance
/// order.
pub fn roll_up(nodes: &[ExplosionNode]) -> Vec<MaterialRequirement> {
    let mut index: HashMap<(Uuid, Option<Department>), usize> = HashMap::new();
    let mut rolled: Vec<MaterialRequirement> = Vec::new();
    for node in nodes.iter().filter(|n| n.is_leaf) {
        let key = (node.material_id, node.department);
        match index.get(&key) {
            Some(&slot) => rolled[slot].total_qty += node.qty_required,
            None => {
                index.insert(key, rolled.len());
                rolled.push(MaterialRequirement {
                    material_id: node.material_id,
                    department: node.department,
                    total_qty: node.qty_required,
                });
            }
        }
    }
    rolled
}

/// Input payload for creating a BOM revision with its lines.
#[derive(Debug, Clone)]
pub struct CreateBomInput {
    pub product_id: Uuid,
    pub bom_type: BomType,
    pub qty_output: Decimal,
    pub revision: Option<String>,
    pub supports_multi_material: bool,
    pub created_by: Option<Uuid>,
    pub details: Vec<CreateBomDetailInput>,
}

#[derive(Debug, Clone)]
pub struct CreateBomDetailInput {
    pub component_id: Uuid,
    pub qty_needed: Decimal,
    pub wastage_percent: Decimal,
    pub department: Option<Department>,
    pub variant_selection_mode: VariantSelectionMode,
}

#[derive(Debug, Clone)]
pub struct CreateVariantInput {
    pub material_id: Uuid,
    pub variant_type: VariantType,
    pub sequence: Option<i32>,
    pub qty_variance: Option<Decimal>,
    pub qty_variance_percent: Option<Decimal>,
    pub weight: i32,
    pub cost_variance: Option<Decimal>,
    pub is_active: bool,
    pub approval_status: Option<VariantApproval>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateVariantInput {
    pub variant_type: Option<VariantType>,
    pub sequence: Option<i32>,
    pub qty_variance: Option<Decimal>,
    pub qty_variance_percent: Option<Decimal>,
    pub weight: Option<i32>,
    pub cost_variance: Option<Decimal>,
    pub is_active: Option<bool>,
    pub approval_status: Option<VariantApproval>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BomView {
    pub bom: bom::Model,
    pub details: Vec<BomDetailView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BomDetailView {
    pub detail: bom_detail::Model,
    pub variants: Vec<bom_variant::Model>,
}

/// BOM structure plus the explosion and variant-resolution walk over it.
#[derive(Clone)]
pub struct BomResolverService {
    db_pool: Arc<DbPool>,
}

impl BomResolverService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Loads every BOM reachable from the product into one snapshot.
    /// Cycles are tolerated here; the walk is what rejects them.
    #[instrument(skip(self))]
    pub async fn load_snapshot(&self, product_id: &Uuid) -> Result<BomSnapshot, ServiceError> {
        let db = self.connection();
        let mut snapshot = BomSnapshot::default();
        let mut frontier = vec![*product_id];
        let mut seen: HashSet<Uuid> = frontier.iter().copied().collect();

        while let Some(pid) = frontier.pop() {
            let Some(header) = BomEntity::find()
                .filter(bom::Column::ProductId.eq(pid))
                .filter(bom::Column::IsActive.eq(true))
                .one(db)
                .await?
            else {
                continue;
            };

            let details = BomDetailEntity::find()
                .filter(bom_detail::Column::BomId.eq(header.id))
                .order_by_asc(bom_detail::Column::Position)
                .all(db)
                .await?;

            let detail_ids: Vec<Uuid> = details.iter().map(|d| d.id).collect();
            let mut by_detail: HashMap<Uuid, Vec<SnapshotVariant>> = HashMap::new();
            if !detail_ids.is_empty() {
                let variants = BomVariantEntity::find()
                    .filter(bom_variant::Column::DetailId.is_in(detail_ids))
                    .order_by_asc(bom_variant::Column::Sequence)
                    .all(db)
                    .await?;
                for variant in variants {
                    by_detail
                        .entry(variant.detail_id)
                        .or_default()
                        .push(SnapshotVariant::from(variant));
                }
            }

            let mut lines = Vec::with_capacity(details.len());
            for detail in &details {
                if seen.insert(detail.component_id) {
                    frontier.push(detail.component_id);
                }
                lines.push(SnapshotDetail {
                    detail_id: detail.id,
                    component_id: detail.component_id,
                    qty_needed: detail.qty_needed,
                    wastage_percent: detail.wastage_percent,
                    department: detail.department,
                    has_variants: detail.has_variants && header.supports_multi_material,
                    selection_mode: detail.variant_selection_mode,
                    variants: by_detail.remove(&detail.id).unwrap_or_default(),
                });
            }

            snapshot.insert(
                pid,
                SnapshotBom {
                    bom_id: header.id,
                    qty_output: header.qty_output,
                    details: lines,
                },
            );
        }

        Ok(snapshot)
    }

    /// Full explosion of `qty` units of the product: every node plus the
    /// leaf demand rolled up by (material, department).
    #[instrument(skip(self))]
    pub async fn explode(
        &self,
        product_id: &Uuid,
        qty: Decimal,
        options: ExplosionOptions,
    ) -> Result<ExplosionReport, ServiceError> {
        let snapshot = self.load_snapshot(product_id).await?;
        let walk = ExplosionWalk::new(snapshot, *product_id, qty, &options)?;

        let mut nodes = Vec::new();
        for node in walk {
            nodes.push(node?);
        }
        let rolled_up = roll_up(&nodes);

        Ok(ExplosionReport {
            product_id: *product_id,
            qty,
            max_depth: options.max_depth,
            seed: options.seed,
            strict: options.strict,
            nodes,
            rolled_up,
        })
    }

    /// Creates a new active BOM revision for the product, deactivating any
    /// prior active revision in the same transaction.
    #[instrument(skip(self, input))]
    pub async fn create_bom(&self, input: CreateBomInput) -> Result<BomView, ServiceError> {
        if input.qty_output <= Decimal::ZERO {
            return Err(ServiceError::InvalidQuantity(
                "qty_output must be greater than zero".to_string(),
            ));
        }
        for detail in &input.details {
            validate_detail_line(&input.product_id, detail)?;
        }

        let db = self.connection();
        let txn = db.begin().await?;

        BomEntity::update_many()
            .col_expr(bom::Column::IsActive, Expr::value(false))
            .filter(bom::Column::ProductId.eq(input.product_id))
            .filter(bom::Column::IsActive.eq(true))
            .exec(&txn)
            .await?;

        let header = bom::ActiveModel {
            product_id: Set(input.product_id),
            bom_type: Set(input.bom_type),
            qty_output: Set(input.qty_output),
            revision: input.revision.map(Set).unwrap_or_default(),
            is_active: Set(true),
            supports_multi_material: Set(input.supports_multi_material),
            created_by: Set(input.created_by),
            ..Default::default()
        };
        let header = header.insert(&txn).await?;

        let mut details = Vec::with_capacity(input.details.len());
        for (position, line) in input.details.into_iter().enumerate() {
            let model = bom_detail::ActiveModel {
                bom_id: Set(header.id),
                component_id: Set(line.component_id),
                qty_needed: Set(line.qty_needed),
                wastage_percent: Set(line.wastage_percent),
                department: Set(line.department),
                has_variants: Set(false),
                variant_selection_mode: Set(line.variant_selection_mode),
                position: Set(position as i32),
                ..Default::default()
            };
            details.push(model.insert(&txn).await?);
        }
        txn.commit().await?;

        Ok(BomView {
            bom: header,
            details: details
                .into_iter()
                .map(|detail| BomDetailView {
                    detail,
                    variants: Vec::new(),
                })
                .collect(),
        })
    }

    /// Appends a line to an existing BOM.
    #[instrument(skip(self, input))]
    pub async fn add_detail(
        &self,
        bom_id: &Uuid,
        input: CreateBomDetailInput,
    ) -> Result<bom_detail::Model, ServiceError> {
        let db = self.connection();
        let header = BomEntity::find_by_id(*bom_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("BOM {} not found", bom_id)))?;
        validate_detail_line(&header.product_id, &input)?;

        let position = BomDetailEntity::find()
            .filter(bom_detail::Column::BomId.eq(header.id))
            .count(db)
            .await? as i32;

        let model = bom_detail::ActiveModel {
            bom_id: Set(header.id),
            component_id: Set(input.component_id),
            qty_needed: Set(input.qty_needed),
            wastage_percent: Set(input.wastage_percent),
            department: Set(input.department),
            has_variants: Set(false),
            variant_selection_mode: Set(input.variant_selection_mode),
            position: Set(position),
            ..Default::default()
        };
        let detail = model.insert(db).await?;
        Ok(detail)
    }

    /// Adds a variant to a line. The first variant flips the line's
    /// multi-material toggle on.
    #[instrument(skip(self, input))]
    pub async fn add_variant(
        &self,
        detail_id: &Uuid,
        input: CreateVariantInput,
    ) -> Result<bom_variant::Model, ServiceError> {
        validate_variance_pair(&input.qty_variance, &input.qty_variance_percent)?;
        if input.weight < 1 {
            return Err(ServiceError::ValidationError(
                "weight must be at least 1".to_string(),
            ));
        }

        let db = self.connection();
        let detail = BomDetailEntity::find_by_id(*detail_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("BOM detail {} not found", detail_id)))?;

        let existing = BomVariantEntity::find()
            .filter(bom_variant::Column::DetailId.eq(detail.id))
            .all(db)
            .await?;
        let sequence = input
            .sequence
            .unwrap_or_else(|| existing.iter().map(|v| v.sequence).max().unwrap_or(0) + 1);

        let txn = db.begin().await?;
        let model = bom_variant::ActiveModel {
            detail_id: Set(detail.id),
            material_id: Set(input.material_id),
            variant_type: Set(input.variant_type),
            sequence: Set(sequence),
            qty_variance: Set(input.qty_variance),
            qty_variance_percent: Set(input.qty_variance_percent),
            weight: Set(input.weight),
            cost_variance: Set(input.cost_variance),
            is_active: Set(input.is_active),
            approval_status: input.approval_status.map(Set).unwrap_or_default(),
            ..Default::default()
        };
        let variant = model.insert(&txn).await?;

        if !detail.has_variants {
            let mut active: bom_detail::ActiveModel = detail.into();
            active.has_variants = Set(true);
            active.update(&txn).await?;
        }
        txn.commit().await?;

        Ok(variant)
    }

    /// Patches a variant. Setting one variance form clears the other, so
    /// the pair stays mutually exclusive.
    #[instrument(skip(self, input))]
    pub async fn update_variant(
        &self,
        variant_id: &Uuid,
        input: UpdateVariantInput,
    ) -> Result<bom_variant::Model, ServiceError> {
        if input.qty_variance.is_some() && input.qty_variance_percent.is_some() {
            return Err(ServiceError::ValidationError(
                "qty_variance and qty_variance_percent are mutually exclusive".to_string(),
            ));
        }
        if let Some(weight) = input.weight {
            if weight < 1 {
                return Err(ServiceError::ValidationError(
                    "weight must be at least 1".to_string(),
                ));
            }
        }
        if let Some(absolute) = input.qty_variance {
            if absolute <= Decimal::ZERO {
                return Err(ServiceError::InvalidQuantity(
                    "qty_variance must be greater than zero".to_string(),
                ));
            }
        }

        let db = self.connection();
        let variant = BomVariantEntity::find_by_id(*variant_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("BOM variant {} not found", variant_id))
            })?;

        let mut active: bom_variant::ActiveModel = variant.into();
        if let Some(variant_type) = input.variant_type {
            active.variant_type = Set(variant_type);
        }
        if let Some(sequence) = input.sequence {
            active.sequence = Set(sequence);
        }
        if let Some(absolute) = input.qty_variance {
            active.qty_variance = Set(Some(absolute));
            active.qty_variance_percent = Set(None);
        }
        if let Some(percent) = input.qty_variance_percent {
            active.qty_variance_percent = Set(Some(percent));
            active.qty_variance = Set(None);
        }
        if let Some(weight) = input.weight {
            active.weight = Set(weight);
        }
        if let Some(cost_variance) = input.cost_variance {
            active.cost_variance = Set(Some(cost_variance));
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(approval_status) = input.approval_status {
            active.approval_status = Set(approval_status);
        }
        let updated = active.update(db).await?;
        Ok(updated)
    }

    /// Deletes a variant row outright. When the last row goes, the line's
    /// multi-material toggle goes with it.
    #[instrument(skip(self))]
    pub async fn remove_variant(&self, variant_id: &Uuid) -> Result<(), ServiceError> {
        let db = self.connection();
        let variant = BomVariantEntity::find_by_id(*variant_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("BOM variant {} not found", variant_id))
            })?;
        let detail_id = variant.detail_id;

        let txn = db.begin().await?;
        variant.delete(&txn).await?;

        let remaining = BomVariantEntity::find()
            .filter(bom_variant::Column::DetailId.eq(detail_id))
            .count(&txn)
            .await?;
        if remaining == 0 {
            if let Some(detail) = BomDetailEntity::find_by_id(detail_id).one(&txn).await? {
                if detail.has_variants {
                    let mut active: bom_detail::ActiveModel = detail.into();
                    active.has_variants = Set(false);
                    active.update(&txn).await?;
                }
            }
        }
        txn.commit().await?;
        Ok(())
    }

    /// Flips a line's multi-material toggle without touching the variant
    /// rows. Toggled off they lie dormant; toggling back on restores the
    /// prior weights and approvals untouched.
    #[instrument(skip(self))]
    pub async fn toggle_multi_material(
        &self,
        detail_id: &Uuid,
        enabled: bool,
    ) -> Result<bom_detail::Model, ServiceError> {
        let db = self.connection();
        let detail = BomDetailEntity::find_by_id(*detail_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("BOM detail {} not found", detail_id)))?;

        if detail.has_variants == enabled {
            return Ok(detail);
        }
        let mut active: bom_detail::ActiveModel = detail.into();
        active.has_variants = Set(enabled);
        let updated = active.update(db).await?;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn get_bom(&self, bom_id: &Uuid) -> Result<Option<BomView>, ServiceError> {
        let db = self.connection();
        let Some(header) = BomEntity::find_by_id(*bom_id).one(db).await? else {
            return Ok(None);
        };

        let details = BomDetailEntity::find()
            .filter(bom_detail::Column::BomId.eq(header.id))
            .order_by_asc(bom_detail::Column::Position)
            .all(db)
            .await?;

        let detail_ids: Vec<Uuid> = details.iter().map(|d| d.id).collect();
        let mut by_detail: HashMap<Uuid, Vec<bom_variant::Model>> = HashMap::new();
        if !detail_ids.is_empty() {
            let variants = BomVariantEntity::find()
                .filter(bom_variant::Column::DetailId.is_in(detail_ids))
                .order_by_asc(bom_variant::Column::Sequence)
                .all(db)
                .await?;
            for variant in variants {
                by_detail.entry(variant.detail_id).or_default().push(variant);
            }
        }

        Ok(Some(BomView {
            bom: header,
            details: details
                .into_iter()
                .map(|detail| {
                    let variants = by_detail.remove(&detail.id).unwrap_or_default();
                    BomDetailView { detail, variants }
                })
                .collect(),
        }))
    }

    #[instrument(skip(self))]
    pub async fn list_boms(
        &self,
        product_id: Option<Uuid>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<bom::Model>, u64), ServiceError> {
        let db = self.connection();
        let limit = limit.max(1);
        let page = page.max(1) - 1;

        let mut query = BomEntity::find();
        if let Some(product_id) = product_id {
            query = query.filter(bom::Column::ProductId.eq(product_id));
        }

        let paginator = query
            .order_by_desc(bom::Column::UpdatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page).await?;
        Ok((models, total))
    }

    /// The variant rows of a line, sequence-sorted, for probability
    /// display and editing.
    #[instrument(skip(self))]
    pub async fn get_variants(
        &self,
        detail_id: &Uuid,
    ) -> Result<Vec<bom_variant::Model>, ServiceError> {
        let db = self.connection();
        BomDetailEntity::find_by_id(*detail_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("BOM detail {} not found", detail_id)))?;

        let variants = BomVariantEntity::find()
            .filter(bom_variant::Column::DetailId.eq(*detail_id))
            .order_by_asc(bom_variant::Column::Sequence)
            .all(db)
            .await?;
        Ok(variants)
    }

    fn connection(&self) -> &DatabaseConnection {
        self.db_pool.as_ref()
    }
}

fn validate_detail_line(
    product_id: &Uuid,
    line: &CreateBomDetailInput,
) -> Result<(), ServiceError> {
    if line.qty_needed <= Decimal::ZERO {
        return Err(ServiceError::InvalidQuantity(
            "qty_needed must be greater than zero".to_string(),
        ));
    }
    if line.wastage_percent < Decimal::ZERO {
        return Err(ServiceError::OutOfRange(
            "wastage_percent must not be negative".to_string(),
        ));
    }
    if line.component_id == *product_id {
        return Err(ServiceError::ValidationError(
            "a BOM line cannot reference its own product".to_string(),
        ));
    }
    Ok(())
}

fn validate_variance_pair(
    qty_variance: &Option<Decimal>,
    qty_variance_percent: &Option<Decimal>,
) -> Result<(), ServiceError> {
    if qty_variance.is_some() && qty_variance_percent.is_some() {
        return Err(ServiceError::ValidationError(
            "qty_variance and qty_variance_percent are mutually exclusive".to_string(),
        ));
    }
    if let Some(absolute) = qty_variance {
        if *absolute <= Decimal::ZERO {
            return Err(ServiceError::InvalidQuantity(
                "qty_variance must be greater than zero".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn variant(
        material: Uuid,
        variant_type: VariantType,
        sequence: i32,
        weight: i32,
        eligible: bool,
    ) -> SnapshotVariant {
        SnapshotVariant {
            variant_id: Uuid::new_v4(),
            material_id: material,
            variant_type,
            sequence,
            qty_variance: None,
            qty_variance_percent: None,
            weight,
            eligible,
        }
    }

    fn plain_detail(component: Uuid, qty_needed: Decimal, wastage: Decimal) -> SnapshotDetail {
        SnapshotDetail {
            detail_id: Uuid::new_v4(),
            component_id: component,
            qty_needed,
            wastage_percent: wastage,
            department: None,
            has_variants: false,
            selection_mode: VariantSelectionMode::Weighted,
            variants: Vec::new(),
        }
    }

    fn single_line_snapshot(product: Uuid, detail: SnapshotDetail) -> BomSnapshot {
        let mut snapshot = BomSnapshot::default();
        snapshot.insert(
            product,
            SnapshotBom {
                bom_id: Uuid::new_v4(),
                qty_output: dec!(1),
                details: vec![detail],
            },
        );
        snapshot
    }

    fn collect(walk: ExplosionWalk) -> Result<Vec<ExplosionNode>, ServiceError> {
        walk.collect()
    }

    fn variant_model(weight: i32, eligible: bool) -> bom_variant::Model {
        bom_variant::Model {
            id: Uuid::new_v4(),
            detail_id: Uuid::new_v4(),
            material_id: Uuid::new_v4(),
            variant_type: VariantType::Primary,
            sequence: 1,
            qty_variance: None,
            qty_variance_percent: None,
            weight,
            cost_variance: None,
            is_active: eligible,
            approval_status: if eligible {
                VariantApproval::Approved
            } else {
                VariantApproval::Pending
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn wastage_compounds_across_levels() {
        let product = Uuid::new_v4();
        let intermediate = Uuid::new_v4();
        let raw = Uuid::new_v4();

        let mut snapshot = BomSnapshot::default();
        snapshot.insert(
            product,
            SnapshotBom {
                bom_id: Uuid::new_v4(),
                qty_output: dec!(1),
                details: vec![plain_detail(intermediate, dec!(2), dec!(10))],
            },
        );
        snapshot.insert(
            intermediate,
            SnapshotBom {
                bom_id: Uuid::new_v4(),
                qty_output: dec!(1),
                details: vec![plain_detail(raw, dec!(3), dec!(5))],
            },
        );

        let walk =
            ExplosionWalk::new(snapshot, product, dec!(1), &ExplosionOptions::default()).unwrap();
        let nodes = collect(walk).unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].level, 1);
        assert!(!nodes[0].is_leaf);
        assert_eq!(nodes[0].qty_required, dec!(2.2));
        assert_eq!(nodes[1].level, 2);
        assert!(nodes[1].is_leaf);
        assert_eq!(nodes[1].material_id, raw);
        // 2.2 * 3 * 1.05
        assert_eq!(nodes[1].qty_required, dec!(6.930));
    }

    #[test]
    fn cycle_is_rejected_before_depth() {
        let product = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut snapshot = BomSnapshot::default();
        snapshot.insert(
            product,
            SnapshotBom {
                bom_id: Uuid::new_v4(),
                qty_output: dec!(1),
                details: vec![plain_detail(other, dec!(1), dec!(0))],
            },
        );
        snapshot.insert(
            other,
            SnapshotBom {
                bom_id: Uuid::new_v4(),
                qty_output: dec!(1),
                details: vec![plain_detail(product, dec!(1), dec!(0))],
            },
        );

        let walk =
            ExplosionWalk::new(snapshot, product, dec!(1), &ExplosionOptions::default()).unwrap();
        let err = collect(walk).unwrap_err();
        assert_matches!(err, ServiceError::CyclicBom { product_id } if product_id == product);
    }

    #[test]
    fn max_depth_turns_intermediates_into_leaves() {
        let product = Uuid::new_v4();
        let intermediate = Uuid::new_v4();
        let raw = Uuid::new_v4();

        let mut snapshot = BomSnapshot::default();
        snapshot.insert(
            product,
            SnapshotBom {
                bom_id: Uuid::new_v4(),
                qty_output: dec!(1),
                details: vec![plain_detail(intermediate, dec!(2), dec!(0))],
            },
        );
        snapshot.insert(
            intermediate,
            SnapshotBom {
                bom_id: Uuid::new_v4(),
                qty_output: dec!(1),
                details: vec![plain_detail(raw, dec!(3), dec!(0))],
            },
        );

        let options = ExplosionOptions {
            max_depth: 1,
            ..Default::default()
        };
        let walk = ExplosionWalk::new(snapshot, product, dec!(1), &options).unwrap();
        let nodes = collect(walk).unwrap();

        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].is_leaf);
        assert_eq!(nodes[0].material_id, intermediate);
    }

    #[test]
    fn same_seed_resolves_the_same_materials() {
        let product = Uuid::new_v4();
        let component = Uuid::new_v4();
        let red = Uuid::new_v4();
        let blue = Uuid::new_v4();

        let make_snapshot = || {
            let detail = SnapshotDetail {
                detail_id: Uuid::new_v4(),
                component_id: component,
                qty_needed: dec!(1),
                wastage_percent: dec!(0),
                department: None,
                has_variants: true,
                selection_mode: VariantSelectionMode::Weighted,
                variants: vec![
                    variant(red, VariantType::Primary, 1, 3, true),
                    variant(blue, VariantType::Alternative, 2, 1, true),
                ],
            };
            single_line_snapshot(product, detail)
        };

        let options = ExplosionOptions {
            seed: Some(42),
            ..Default::default()
        };
        let first = collect(
            ExplosionWalk::new(make_snapshot(), product, dec!(10), &options).unwrap(),
        )
        .unwrap();
        let second = collect(
            ExplosionWalk::new(make_snapshot(), product, dec!(10), &options).unwrap(),
        )
        .unwrap();

        assert_eq!(first[0].material_id, second[0].material_id);
        assert!(first[0].material_id == red || first[0].material_id == blue);
    }

    #[test]
    fn ineligible_variants_fall_back_to_the_parent_component() {
        let product = Uuid::new_v4();
        let component = Uuid::new_v4();

        let detail = SnapshotDetail {
            detail_id: Uuid::new_v4(),
            component_id: component,
            qty_needed: dec!(4),
            wastage_percent: dec!(0),
            department: None,
            has_variants: true,
            selection_mode: VariantSelectionMode::Weighted,
            variants: vec![variant(Uuid::new_v4(), VariantType::Primary, 1, 5, false)],
        };

        let walk = ExplosionWalk::new(
            single_line_snapshot(product, detail.clone()),
            product,
            dec!(1),
            &ExplosionOptions::default(),
        )
        .unwrap();
        let nodes = collect(walk).unwrap();
        assert_eq!(nodes[0].material_id, component);
        assert_eq!(nodes[0].variant_id, None);
        assert_eq!(nodes[0].qty_required, dec!(4));

        let strict = ExplosionOptions {
            strict: true,
            ..Default::default()
        };
        let walk = ExplosionWalk::new(
            single_line_snapshot(product, detail.clone()),
            product,
            dec!(1),
            &strict,
        )
        .unwrap();
        let err = collect(walk).unwrap_err();
        assert_matches!(
            err,
            ServiceError::NoEligibleVariant { detail_id } if detail_id == detail.detail_id
        );
    }

    #[test]
    fn primary_first_ignores_weights() {
        let product = Uuid::new_v4();
        let primary = Uuid::new_v4();
        let alternative = Uuid::new_v4();

        let detail = SnapshotDetail {
            detail_id: Uuid::new_v4(),
            component_id: Uuid::new_v4(),
            qty_needed: dec!(1),
            wastage_percent: dec!(0),
            department: None,
            has_variants: true,
            selection_mode: VariantSelectionMode::PrimaryFirst,
            variants: vec![
                variant(alternative, VariantType::Alternative, 1, 99, true),
                variant(primary, VariantType::Primary, 2, 1, true),
            ],
        };

        let walk = ExplosionWalk::new(
            single_line_snapshot(product, detail),
            product,
            dec!(1),
            &ExplosionOptions::default(),
        )
        .unwrap();
        let nodes = collect(walk).unwrap();
        assert_eq!(nodes[0].material_id, primary);
    }

    #[test]
    fn variance_overrides_the_parent_qty() {
        let product = Uuid::new_v4();
        let absolute_material = Uuid::new_v4();

        let mut with_absolute = variant(absolute_material, VariantType::Primary, 1, 1, true);
        with_absolute.qty_variance = Some(dec!(7));

        let detail = SnapshotDetail {
            detail_id: Uuid::new_v4(),
            component_id: Uuid::new_v4(),
            qty_needed: dec!(4),
            wastage_percent: dec!(0),
            department: None,
            has_variants: true,
            selection_mode: VariantSelectionMode::Weighted,
            variants: vec![with_absolute],
        };
        let walk = ExplosionWalk::new(
            single_line_snapshot(product, detail),
            product,
            dec!(2),
            &ExplosionOptions::default(),
        )
        .unwrap();
        let nodes = collect(walk).unwrap();
        // 2 * 7, the absolute variance replacing qty_needed outright
        assert_eq!(nodes[0].qty_required, dec!(14));

        let mut with_percent = variant(Uuid::new_v4(), VariantType::Primary, 1, 1, true);
        with_percent.qty_variance_percent = Some(dec!(50));
        let detail = SnapshotDetail {
            detail_id: Uuid::new_v4(),
            component_id: Uuid::new_v4(),
            qty_needed: dec!(4),
            wastage_percent: dec!(0),
            department: None,
            has_variants: true,
            selection_mode: VariantSelectionMode::Weighted,
            variants: vec![with_percent],
        };
        let walk = ExplosionWalk::new(
            single_line_snapshot(product, detail),
            product,
            dec!(2),
            &ExplosionOptions::default(),
        )
        .unwrap();
        let nodes = collect(walk).unwrap();
        // 2 * 4 * 1.5
        assert_eq!(nodes[0].qty_required, dec!(12.0));
    }

    #[test]
    fn probabilities_follow_the_weights() {
        let mut three = variant_model(3, true);
        let one = variant_model(1, true);
        let ignored = variant_model(100, false);
        three.sequence = 1;

        let probabilities = selection_probabilities(&[three.clone(), one.clone(), ignored]);
        assert_eq!(probabilities.len(), 2);
        assert_eq!(probabilities[0], (three.id, dec!(75.00)));
        assert_eq!(probabilities[1], (one.id, dec!(25.00)));
    }

    #[test]
    fn roll_up_groups_by_material_and_department() {
        let material = Uuid::new_v4();
        let node = |department, qty| ExplosionNode {
            product_id: Uuid::new_v4(),
            detail_id: Uuid::new_v4(),
            component_id: material,
            material_id: material,
            variant_id: None,
            level: 1,
            department,
            qty_base: qty,
            qty_required: qty,
            is_leaf: true,
        };

        let rolled = roll_up(&[
            node(Some(Department::Cutting), dec!(5)),
            node(Some(Department::Cutting), dec!(2.5)),
            node(Some(Department::Sewing), dec!(1)),
        ]);

        assert_eq!(rolled.len(), 2);
        assert_eq!(rolled[0].total_qty, dec!(7.5));
        assert_eq!(rolled[0].department, Some(Department::Cutting));
        assert_eq!(rolled[1].total_qty, dec!(1));
    }
}
