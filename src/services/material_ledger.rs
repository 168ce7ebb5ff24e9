use crate::{
    auth::{Capability, Role},
    db::DbPool,
    entities::{
        debt_settlement::{self, Entity as DebtSettlementEntity},
        department::Department,
        material_allocation::{self, AllocationStatus, Entity as MaterialAllocationEntity},
        material_balance::{self, Entity as MaterialBalanceEntity},
        material_debt::{self, DebtApprovalStatus, DebtStatus, Entity as MaterialDebtEntity},
        spk::{self, Entity as SpkEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    locks::EntityLocks,
    services::bom_resolver::MaterialRequirement,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Location used for balances when the caller does not distinguish one.
pub const DEFAULT_LOCATION: &str = "WAREHOUSE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

/// Input payload for opening a material debt.
#[derive(Debug, Clone)]
pub struct CreateDebtInput {
    pub spk_id: Uuid,
    pub material_id: Uuid,
    /// Defaults to the SPK's own department.
    pub department: Option<Department>,
    pub qty_owed: Decimal,
    pub due_date: Option<NaiveDate>,
    pub reason: String,
    pub allow_production_while_pending: bool,
}

/// Input payload for settling part of a debt.
#[derive(Debug, Clone)]
pub struct SettleDebtInput {
    pub qty_received: Decimal,
    pub notes: Option<String>,
    pub recorded_by: Option<Uuid>,
    /// Defaults to now.
    pub settlement_date: Option<DateTime<Utc>>,
}

/// Debt with its derived quantities and append-only settlement history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DebtDetail {
    pub debt: material_debt::Model,
    pub remaining_debt: Decimal,
    pub excess_qty: Decimal,
    pub settlements: Vec<debt_settlement::Model>,
}

/// Per-location material balances plus the debt approval/settlement
/// lifecycle. Balances are signed; allocation may drive on-hand negative,
/// which is exactly the debt culture the rest of the engine reconciles.
#[derive(Clone)]
pub struct MaterialLedgerService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    locks: EntityLocks,
    /// qtyOwed at or above this snapshot threshold requires the two-step
    /// supervisor + manager approval track.
    escalation_threshold: Decimal,
}

impl MaterialLedgerService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        escalation_threshold: Decimal,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            locks: EntityLocks::new(),
            escalation_threshold,
        }
    }

    /// Books received material onto the (material, location) balance row,
    /// creating it on first receipt.
    #[instrument(skip(self))]
    pub async fn receive_material(
        &self,
        material_id: &Uuid,
        location: &str,
        qty: Decimal,
    ) -> Result<material_balance::Model, ServiceError> {
        if qty <= Decimal::ZERO {
            return Err(ServiceError::InvalidQuantity(
                "received qty must be greater than zero".to_string(),
            ));
        }
        let location = location.trim();
        if location.is_empty() {
            return Err(ServiceError::ValidationError(
                "location must not be empty".to_string(),
            ));
        }

        let _guard = self.locks.acquire(*material_id).await;
        let db = self.connection();

        let updated = apply_balance_delta(db, material_id, location, qty, Decimal::ZERO).await?;

        self.event_sender
            .send_or_log(Event::MaterialReceived {
                material_id: *material_id,
                location: location.to_string(),
                qty,
            })
            .await;

        Ok(updated)
    }

    /// Records the material-allocation request of a full release: one
    /// REQUESTED row per exploded material. Idempotent per MO — a re-drive
    /// that finds existing rows returns them untouched.
    #[instrument(skip(self, requirements))]
    pub async fn request_allocations(
        &self,
        mo_id: &Uuid,
        requirements: &[MaterialRequirement],
    ) -> Result<Vec<material_allocation::Model>, ServiceError> {
        let db = self.connection();

        let existing = MaterialAllocationEntity::find()
            .filter(material_allocation::Column::MoId.eq(*mo_id))
            .all(db)
            .await?;
        if !existing.is_empty() {
            return Ok(existing);
        }
        if requirements.is_empty() {
            return Ok(Vec::new());
        }

        let txn = db.begin().await?;
        let mut rows = Vec::with_capacity(requirements.len());
        for requirement in requirements {
            let model = material_allocation::ActiveModel {
                mo_id: Set(*mo_id),
                material_id: Set(requirement.material_id),
                department: Set(requirement.department),
                qty: Set(requirement.total_qty),
                ..Default::default()
            };
            rows.push(model.insert(&txn).await?);
        }
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::MaterialAllocationRequested {
                mo_id: *mo_id,
                material_count: rows.len(),
            })
            .await;

        Ok(rows)
    }

    /// Applies every still-REQUESTED allocation of an MO to the warehouse
    /// balances (on-hand down, allocated up; on-hand may go negative) and
    /// marks the rows COMMITTED. Idempotent; returns how many rows were
    /// committed this call.
    #[instrument(skip(self))]
    pub async fn commit_pending_allocations(&self, mo_id: &Uuid) -> Result<usize, ServiceError> {
        let db = self.connection();

        let pending = MaterialAllocationEntity::find()
            .filter(material_allocation::Column::MoId.eq(*mo_id))
            .filter(material_allocation::Column::Status.eq(AllocationStatus::Requested))
            .order_by_asc(material_allocation::Column::CreatedAt)
            .all(db)
            .await?;
        if pending.is_empty() {
            return Ok(0);
        }

        // Lock the touched materials in id order; commits racing on the
        // same balance row must not interleave.
        let mut materials: Vec<Uuid> = pending.iter().map(|r| r.material_id).collect();
        materials.sort();
        materials.dedup();
        let mut guards = Vec::with_capacity(materials.len());
        for material_id in materials {
            guards.push(self.locks.acquire(material_id).await);
        }

        let txn = db.begin().await?;
        let committed = pending.len();
        for row in pending {
            apply_balance_delta(&txn, &row.material_id, DEFAULT_LOCATION, -row.qty, row.qty)
                .await?;

            let mut active: material_allocation::ActiveModel = row.into();
            active.status = Set(AllocationStatus::Committed);
            active.update(&txn).await?;
        }
        txn.commit().await?;

        info!(mo_id = %mo_id, committed, "allocation requests committed to balances");
        Ok(committed)
    }

    #[instrument(skip(self))]
    pub async fn get_allocations(
        &self,
        mo_id: &Uuid,
    ) -> Result<Vec<material_allocation::Model>, ServiceError> {
        let db = self.connection();
        let rows = MaterialAllocationEntity::find()
            .filter(material_allocation::Column::MoId.eq(*mo_id))
            .order_by_asc(material_allocation::Column::CreatedAt)
            .all(db)
            .await?;
        Ok(rows)
    }

    /// Returns paginated balances, optionally narrowed by material and/or
    /// location.
    #[instrument(skip(self))]
    pub async fn get_balances(
        &self,
        material_id: Option<Uuid>,
        location: Option<String>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<material_balance::Model>, u64), ServiceError> {
        let db = self.connection();
        let limit = limit.max(1);
        let page = page.max(1) - 1;

        let mut query = MaterialBalanceEntity::find();
        if let Some(material_id) = material_id {
            query = query.filter(material_balance::Column::MaterialId.eq(material_id));
        }
        if let Some(location) = location {
            query = query.filter(material_balance::Column::Location.eq(location));
        }

        let paginator = query
            .order_by_desc(material_balance::Column::UpdatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page).await?;

        Ok((models, total))
    }

    /// Opens a material debt against an SPK. The escalation requirement is
    /// snapshotted from the configured threshold at creation time.
    #[instrument(skip(self, input))]
    pub async fn create_debt(
        &self,
        input: CreateDebtInput,
    ) -> Result<material_debt::Model, ServiceError> {
        if input.qty_owed <= Decimal::ZERO {
            return Err(ServiceError::InvalidQuantity(
                "debt qty must be greater than zero".to_string(),
            ));
        }
        if input.reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "debt reason must not be empty".to_string(),
            ));
        }

        let db = self.connection();
        let spk = SpkEntity::find_by_id(input.spk_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("SPK {} not found", input.spk_id)))?;

        let department = input.department.unwrap_or(spk.department);
        let debt = self
            .insert_debt(
                &spk,
                &input.material_id,
                department,
                input.qty_owed,
                input.due_date,
                input.reason.trim().to_string(),
                input.allow_production_while_pending,
            )
            .await?;

        self.event_sender
            .send_or_log(Event::MaterialDebtCreated {
                debt_id: debt.id,
                spk_id: debt.spk_id,
                material_id: debt.material_id,
                qty_owed: debt.qty_owed,
            })
            .await;

        Ok(debt)
    }

    /// The tracker's debt-creation request: deepens the open
    /// PENDING_APPROVAL debt for (spk, material) or opens a new one.
    #[instrument(skip(self))]
    pub async fn register_shortfall(
        &self,
        spk_id: &Uuid,
        material_id: &Uuid,
        qty: Decimal,
        department: Option<Department>,
    ) -> Result<material_debt::Model, ServiceError> {
        if qty <= Decimal::ZERO {
            return Err(ServiceError::InvalidQuantity(
                "shortfall qty must be greater than zero".to_string(),
            ));
        }

        let _guard = self.locks.acquire(*spk_id).await;
        let db = self.connection();

        let spk = SpkEntity::find_by_id(*spk_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("SPK {} not found", spk_id)))?;
        let department = department.unwrap_or(spk.department);

        let existing = MaterialDebtEntity::find()
            .filter(material_debt::Column::SpkId.eq(*spk_id))
            .filter(material_debt::Column::MaterialId.eq(*material_id))
            .filter(material_debt::Column::ApprovalStatus.eq(DebtApprovalStatus::PendingApproval))
            .one(db)
            .await?;

        let debt = match existing {
            Some(debt) => {
                let new_owed = debt.qty_owed + qty;
                let qty_settled = debt.qty_settled;
                let version = debt.version;
                let mut active: material_debt::ActiveModel = debt.into();
                active.qty_owed = Set(new_owed);
                active.requires_escalation = Set(new_owed >= self.escalation_threshold);
                active.debt_status = Set(DebtStatus::derive(new_owed, qty_settled));
                active.version = Set(version + 1);
                active.update(db).await?
            }
            None => {
                self.insert_debt(
                    &spk,
                    material_id,
                    department,
                    qty,
                    None,
                    "Material shortfall at issue".to_string(),
                    true,
                )
                .await?
            }
        };

        self.event_sender
            .send_or_log(Event::ShortfallRegistered {
                spk_id: *spk_id,
                material_id: *material_id,
                department,
                qty,
            })
            .await;

        Ok(debt)
    }

    /// Role-gated approval-track transition; see `next_approval_status`
    /// for the full decision table.
    #[instrument(skip(self, notes))]
    pub async fn approve_debt(
        &self,
        debt_id: &Uuid,
        decision: ApprovalDecision,
        approver_role: Role,
        notes: Option<String>,
    ) -> Result<material_debt::Model, ServiceError> {
        let _guard = self.locks.acquire(*debt_id).await;
        let db = self.connection();

        let debt = MaterialDebtEntity::find_by_id(*debt_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("material debt {} not found", debt_id)))?;

        let next = next_approval_status(
            debt.approval_status,
            decision,
            approver_role,
            debt.requires_escalation,
        )?;

        let version = debt.version;
        let mut active: material_debt::ActiveModel = debt.into();
        active.approval_status = Set(next);
        active.approval_notes = Set(notes);
        active.version = Set(version + 1);
        let updated = active.update(db).await?;

        match next {
            DebtApprovalStatus::Rejected => {
                self.event_sender
                    .send_or_log(Event::MaterialDebtRejected(updated.id))
                    .await;
            }
            _ => {
                self.event_sender
                    .send_or_log(Event::MaterialDebtApproved {
                        debt_id: updated.id,
                        approval_status: next.to_string(),
                    })
                    .await;
            }
        }

        Ok(updated)
    }

    /// Appends a settlement and rolls the settlement track forward.
    /// qtySettled only ever grows; the history rows are never touched
    /// again once written.
    #[instrument(skip(self, input))]
    pub async fn settle_debt(
        &self,
        debt_id: &Uuid,
        input: SettleDebtInput,
    ) -> Result<DebtDetail, ServiceError> {
        if input.qty_received <= Decimal::ZERO {
            return Err(ServiceError::InvalidQuantity(
                "settlement qty must be greater than zero".to_string(),
            ));
        }

        let _guard = self.locks.acquire(*debt_id).await;
        let db = self.connection();

        let debt = MaterialDebtEntity::find_by_id(*debt_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("material debt {} not found", debt_id)))?;

        if debt.approval_status == DebtApprovalStatus::Rejected {
            return Err(ServiceError::InvalidState(format!(
                "material debt {} was rejected and cannot be settled",
                debt_id
            )));
        }
        if matches!(
            debt.debt_status,
            DebtStatus::FullyResolved | DebtStatus::Excess
        ) {
            return Err(ServiceError::InvalidState(format!(
                "material debt {} is already settled in full ({})",
                debt_id, debt.debt_status
            )));
        }

        let new_settled = debt.qty_settled + input.qty_received;
        let new_status = DebtStatus::derive(debt.qty_owed, new_settled);
        let qty_owed = debt.qty_owed;
        let version = debt.version;

        let txn = db.begin().await?;
        let settlement = debt_settlement::ActiveModel {
            debt_id: Set(*debt_id),
            settlement_date: Set(input.settlement_date.unwrap_or_else(Utc::now)),
            qty_received: Set(input.qty_received),
            qty_settled_after: Set(new_settled),
            notes: Set(input.notes),
            recorded_by: Set(input.recorded_by),
            ..Default::default()
        };
        settlement.insert(&txn).await?;

        let mut active: material_debt::ActiveModel = debt.into();
        active.qty_settled = Set(new_settled);
        active.debt_status = Set(new_status);
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::MaterialDebtSettled {
                debt_id: *debt_id,
                qty_received: input.qty_received,
                debt_status: new_status.to_string(),
            })
            .await;

        info!(
            debt_id = %debt_id,
            qty_received = %input.qty_received,
            remaining = %(qty_owed - new_settled).max(Decimal::ZERO),
            status = %new_status,
            "settlement applied"
        );

        let settlements = self.settlement_history(debt_id).await?;
        Ok(detail_from(updated, settlements))
    }

    #[instrument(skip(self))]
    pub async fn get_debt(&self, debt_id: &Uuid) -> Result<Option<DebtDetail>, ServiceError> {
        let db = self.connection();
        let debt = MaterialDebtEntity::find_by_id(*debt_id).one(db).await?;
        match debt {
            Some(debt) => {
                let settlements = self.settlement_history(debt_id).await?;
                Ok(Some(detail_from(debt, settlements)))
            }
            None => Ok(None),
        }
    }

    /// Returns paginated debts, optionally filtered by SPK and the two
    /// lifecycle tracks.
    #[instrument(skip(self))]
    pub async fn list_debts(
        &self,
        spk_id: Option<Uuid>,
        approval_status: Option<DebtApprovalStatus>,
        debt_status: Option<DebtStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<material_debt::Model>, u64), ServiceError> {
        let db = self.connection();
        let limit = limit.max(1);
        let page = page.max(1) - 1;

        let mut query = MaterialDebtEntity::find();
        if let Some(spk_id) = spk_id {
            query = query.filter(material_debt::Column::SpkId.eq(spk_id));
        }
        if let Some(approval_status) = approval_status {
            query = query.filter(material_debt::Column::ApprovalStatus.eq(approval_status));
        }
        if let Some(debt_status) = debt_status {
            query = query.filter(material_debt::Column::DebtStatus.eq(debt_status));
        }

        let paginator = query
            .order_by_desc(material_debt::Column::CreatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page).await?;

        Ok((models, total))
    }

    async fn settlement_history(
        &self,
        debt_id: &Uuid,
    ) -> Result<Vec<debt_settlement::Model>, ServiceError> {
        let db = self.connection();
        let rows = DebtSettlementEntity::find()
            .filter(debt_settlement::Column::DebtId.eq(*debt_id))
            .order_by_asc(debt_settlement::Column::CreatedAt)
            .all(db)
            .await?;
        Ok(rows)
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_debt(
        &self,
        spk: &spk::Model,
        material_id: &Uuid,
        department: Department,
        qty_owed: Decimal,
        due_date: Option<NaiveDate>,
        reason: String,
        allow_production_while_pending: bool,
    ) -> Result<material_debt::Model, ServiceError> {
        let db = self.connection();
        let model = material_debt::ActiveModel {
            spk_id: Set(spk.id),
            material_id: Set(*material_id),
            department: Set(department),
            qty_owed: Set(qty_owed),
            due_date: Set(due_date),
            reason: Set(reason),
            allow_production_while_pending: Set(allow_production_while_pending),
            requires_escalation: Set(qty_owed >= self.escalation_threshold),
            ..Default::default()
        };
        let debt = model.insert(db).await?;
        Ok(debt)
    }

    fn connection(&self) -> &DatabaseConnection {
        self.db_pool.as_ref()
    }
}

fn detail_from(
    debt: material_debt::Model,
    settlements: Vec<debt_settlement::Model>,
) -> DebtDetail {
    let remaining_debt = debt.remaining_debt();
    let excess_qty = debt.excess_qty();
    DebtDetail {
        debt,
        remaining_debt,
        excess_qty,
        settlements,
    }
}

/// Finds or creates the (material, location) balance row and applies the
/// given deltas. on_hand is signed and may go negative.
async fn apply_balance_delta<C: ConnectionTrait>(
    db: &C,
    material_id: &Uuid,
    location: &str,
    on_hand_delta: Decimal,
    allocated_delta: Decimal,
) -> Result<material_balance::Model, ServiceError> {
    let existing = MaterialBalanceEntity::find()
        .filter(material_balance::Column::MaterialId.eq(*material_id))
        .filter(material_balance::Column::Location.eq(location))
        .one(db)
        .await?;

    let updated = match existing {
        Some(balance) => {
            let next_on_hand = balance.on_hand + on_hand_delta;
            let next_allocated = balance.allocated + allocated_delta;
            let mut active: material_balance::ActiveModel = balance.into();
            active.on_hand = Set(next_on_hand);
            active.allocated = Set(next_allocated);
            active.update(db).await?
        }
        None => {
            let model = material_balance::ActiveModel {
                material_id: Set(*material_id),
                location: Set(location.to_string()),
                on_hand: Set(on_hand_delta),
                allocated: Set(allocated_delta),
                ..Default::default()
            };
            model.insert(db).await?
        }
    };
    Ok(updated)
}

/// The approval-track decision table. REJECTED is terminal; APPROVED and
/// MANAGER_APPROVED both count as final approvals. Below the escalation
/// threshold a supervisor's sign-off is final; at or above it the
/// supervisor only reaches SPV_APPROVED and a manager must finish.
fn next_approval_status(
    current: DebtApprovalStatus,
    decision: ApprovalDecision,
    role: Role,
    requires_escalation: bool,
) -> Result<DebtApprovalStatus, ServiceError> {
    if current.is_terminal() {
        return Err(ServiceError::InvalidState(format!(
            "debt approval already resolved to {}",
            current
        )));
    }
    if !role.has_capability(Capability::ApproveDebtSpv) {
        return Err(ServiceError::UnauthorizedTransition(format!(
            "role {} cannot act on material-debt approvals",
            role
        )));
    }

    match decision {
        ApprovalDecision::Reject => Ok(DebtApprovalStatus::Rejected),
        ApprovalDecision::Approve => match current {
            DebtApprovalStatus::PendingApproval => {
                if role.has_capability(Capability::ApproveDebtFinal) {
                    Ok(DebtApprovalStatus::Approved)
                } else if requires_escalation {
                    Ok(DebtApprovalStatus::SpvApproved)
                } else {
                    Ok(DebtApprovalStatus::Approved)
                }
            }
            DebtApprovalStatus::SpvApproved => {
                if role.has_capability(Capability::ApproveDebtFinal) {
                    Ok(DebtApprovalStatus::ManagerApproved)
                } else {
                    Err(ServiceError::UnauthorizedTransition(
                        "an escalated debt needs a manager to finalize the approval".to_string(),
                    ))
                }
            }
            // is_terminal is checked above.
            _ => Err(ServiceError::InvalidState(format!(
                "no approval transition from {}",
                current
            ))),
        },
    }
}
