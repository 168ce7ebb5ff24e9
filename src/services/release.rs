use crate::{
    auth::{Capability, Role},
    db::DbPool,
    entities::{
        department::Department,
        manufacturing_order::{self, Entity as MoEntity, MoStatus},
        purchase_order::{self, Entity as PurchaseOrderEntity, PoKind, PoStatus},
        spk::{self, Entity as SpkEntity, SpkStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    locks::EntityLocks,
    middleware_helpers::{with_retry, FanoutRetryPolicy, RetryConfig},
    services::{
        bom_resolver::{BomResolverService, ExplosionOptions},
        material_ledger::MaterialLedgerService,
    },
};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use sea_orm::sea_query::Expr;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Input payload for creating an MO from a received label PO. The label
/// carries the target quantity and the week/destination candidates.
#[derive(Debug, Clone)]
pub struct CreateMoInput {
    pub article_id: Uuid,
    pub article_code: String,
    pub po_label_id: Uuid,
    /// Percent in [0, 10]; missing means no buffer.
    pub buffer_percent: Option<Decimal>,
    pub created_by: Option<Uuid>,
}

/// MO lifecycle: creation from a label PO, the dual-trigger partial/full
/// release with idempotent SPK fan-out, and completion.
#[derive(Clone)]
pub struct ReleaseService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    locks: EntityLocks,
    bom_resolver: BomResolverService,
    ledger: MaterialLedgerService,
    retry: RetryConfig,
}

impl ReleaseService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        bom_resolver: BomResolverService,
        ledger: MaterialLedgerService,
        retry: RetryConfig,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            locks: EntityLocks::new(),
            bom_resolver,
            ledger,
            retry,
        }
    }

    /// Creates a DRAFT MO from a received, unconsumed label PO and binds
    /// the label to it. targetQty comes from the label; week and
    /// destination are copied as candidates and only lock in at full
    /// release.
    #[instrument(skip(self, input))]
    pub async fn create_mo(
        &self,
        input: CreateMoInput,
    ) -> Result<manufacturing_order::Model, ServiceError> {
        if input.article_code.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "article_code must not be empty".to_string(),
            ));
        }

        let db = self.connection();
        let label = PurchaseOrderEntity::find_by_id(input.po_label_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("purchase order {} not found", input.po_label_id))
            })?;

        if label.kind != PoKind::Label {
            return Err(ServiceError::ValidationError(format!(
                "purchase order {} is a {:?} order, not a label order",
                label.id, label.kind
            )));
        }
        if label.status != PoStatus::Received {
            return Err(ServiceError::PreconditionNotMet(format!(
                "label PO {} has not been received (status {})",
                label.id, label.status
            )));
        }
        if let Some(consumer) = label.consumed_by_mo {
            return Err(ServiceError::AlreadyBound(format!(
                "label PO {} is already bound to MO {}",
                label.id, consumer
            )));
        }
        if label.qty <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "label PO {} carries a non-positive qty",
                label.id
            )));
        }

        let buffer_percent = input.buffer_percent.unwrap_or(Decimal::ZERO);
        let final_qty = compute_final_qty(label.qty, buffer_percent)?;

        let mo_id = Uuid::new_v4();
        let order_number = order_number_for(&mo_id);

        let txn = db.begin().await?;
        let model = manufacturing_order::ActiveModel {
            id: Set(mo_id),
            order_number: Set(order_number),
            article_id: Set(input.article_id),
            article_code: Set(input.article_code.trim().to_string()),
            target_qty: Set(label.qty),
            buffer_percent: Set(buffer_percent),
            final_qty: Set(final_qty),
            week: Set(label.week.clone()),
            destination: Set(label.destination.clone()),
            po_label_id: Set(label.id),
            created_by: Set(input.created_by),
            ..Default::default()
        };
        let mo = model.insert(&txn).await?;

        let mut label_active: purchase_order::ActiveModel = label.into();
        label_active.consumed_by_mo = Set(Some(mo_id));
        label_active.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ManufacturingOrderCreated(mo.id))
            .await;
        info!(mo_id = %mo.id, order_number = %mo.order_number, final_qty, "manufacturing order created");

        Ok(mo)
    }

    /// Changes the buffer percent of a not-yet-fully-released MO and
    /// recomputes finalQty. SPKs already issued but still pending pick up
    /// the new quantity.
    #[instrument(skip(self))]
    pub async fn apply_buffer(
        &self,
        mo_id: &Uuid,
        buffer_percent: Decimal,
    ) -> Result<manufacturing_order::Model, ServiceError> {
        let _guard = self.locks.acquire(*mo_id).await;
        let db = self.connection();
        let mo = self.find_mo(mo_id).await?;

        if !matches!(mo.status, MoStatus::Draft | MoStatus::Partial) {
            return Err(ServiceError::InvalidState(format!(
                "buffer can only change before full release; MO {} is {}",
                mo_id, mo.status
            )));
        }

        let final_qty = compute_final_qty(mo.target_qty, buffer_percent)?;
        let version = mo.version;

        let txn = db.begin().await?;
        let mut active: manufacturing_order::ActiveModel = mo.into();
        active.buffer_percent = Set(buffer_percent);
        active.final_qty = Set(final_qty);
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;

        SpkEntity::update_many()
            .col_expr(spk::Column::Qty, Expr::value(final_qty))
            .filter(spk::Column::MoId.eq(*mo_id))
            .filter(spk::Column::Status.eq(SpkStatus::Pending))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!(mo_id = %mo_id, buffer = %buffer_percent, final_qty, "buffer applied");
        Ok(updated)
    }

    /// Binds a received-or-issued fabric PO to the MO. The fabric PO must
    /// be RECEIVED by the time of partial release, not at bind time.
    #[instrument(skip(self))]
    pub async fn bind_po_kain(
        &self,
        mo_id: &Uuid,
        po_kain_id: &Uuid,
    ) -> Result<manufacturing_order::Model, ServiceError> {
        let _guard = self.locks.acquire(*mo_id).await;
        let db = self.connection();
        let mo = self.find_mo(mo_id).await?;

        if !matches!(mo.status, MoStatus::Draft | MoStatus::Partial) {
            return Err(ServiceError::InvalidState(format!(
                "fabric PO can only bind before full release; MO {} is {}",
                mo_id, mo.status
            )));
        }
        if let Some(bound) = mo.po_kain_id {
            if bound == *po_kain_id {
                return Ok(mo);
            }
            return Err(ServiceError::AlreadyBound(format!(
                "MO {} already has fabric PO {} bound",
                mo_id, bound
            )));
        }

        let po = PurchaseOrderEntity::find_by_id(*po_kain_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("purchase order {} not found", po_kain_id))
            })?;
        if po.kind != PoKind::Kain {
            return Err(ServiceError::ValidationError(format!(
                "purchase order {} is a {:?} order, not a fabric order",
                po.id, po.kind
            )));
        }
        if po.status == PoStatus::Cancelled {
            return Err(ServiceError::InvalidState(format!(
                "fabric PO {} is cancelled",
                po.id
            )));
        }
        if let Some(consumer) = po.consumed_by_mo {
            return Err(ServiceError::AlreadyBound(format!(
                "fabric PO {} is already consumed by MO {}",
                po.id, consumer
            )));
        }

        let version = mo.version;
        let txn = db.begin().await?;
        let mut active: manufacturing_order::ActiveModel = mo.into();
        active.po_kain_id = Set(Some(*po_kain_id));
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;

        let mut po_active: purchase_order::ActiveModel = po.into();
        po_active.consumed_by_mo = Set(Some(*mo_id));
        po_active.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PoKainBound {
                mo_id: *mo_id,
                po_id: *po_kain_id,
            })
            .await;

        Ok(updated)
    }

    /// First release trigger: the received fabric PO unlocks Cutting and
    /// Embroidery. The DRAFT -> PARTIAL transition commits before the SPK
    /// fan-out, whose legs retry with backoff and stay idempotent per
    /// (MO, department).
    #[instrument(skip(self))]
    pub async fn release_partial(
        &self,
        mo_id: &Uuid,
        actor_role: Role,
    ) -> Result<manufacturing_order::Model, ServiceError> {
        ensure_can_release(actor_role)?;
        let _guard = self.locks.acquire(*mo_id).await;
        let db = self.connection();
        let mo = self.find_mo(mo_id).await?;

        if mo.status != MoStatus::Draft {
            return Err(ServiceError::InvalidState(format!(
                "partial release requires DRAFT; MO {} is {}",
                mo_id, mo.status
            )));
        }
        let po_kain_id = mo.po_kain_id.ok_or_else(|| {
            ServiceError::PreconditionNotMet(format!("MO {} has no fabric PO bound", mo_id))
        })?;
        let kain = PurchaseOrderEntity::find_by_id(po_kain_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("purchase order {} not found", po_kain_id))
            })?;
        if kain.status != PoStatus::Received {
            return Err(ServiceError::PreconditionNotMet(format!(
                "fabric PO {} has not been received (status {})",
                kain.id, kain.status
            )));
        }

        let version = mo.version;
        let mut active: manufacturing_order::ActiveModel = mo.into();
        active.status = Set(MoStatus::Partial);
        active.version = Set(version + 1);
        let updated = active.update(db).await?;
        self.emit_status_change(mo_id, MoStatus::Draft, MoStatus::Partial)
            .await;

        self.fan_out_departments(&updated, &Department::PARTIAL_RELEASE)
            .await?;

        self.event_sender
            .send_or_log(Event::DepartmentsUnlocked {
                mo_id: *mo_id,
                departments: Department::PARTIAL_RELEASE.to_vec(),
            })
            .await;
        self.event_sender
            .send_or_log(Event::ManufacturingOrderPartiallyReleased(*mo_id))
            .await;

        Ok(updated)
    }

    /// Second release trigger: the received label PO unlocks Sewing,
    /// Finishing and Packing, and kicks off the material-allocation
    /// request from the BOM explosion. The transition to
    /// RELEASED_PENDING_FANOUT commits first; the MO only reaches
    /// RELEASED once every leg has landed, and a failed leg leaves it
    /// re-drivable.
    #[instrument(skip(self))]
    pub async fn release_full(
        &self,
        mo_id: &Uuid,
        actor_role: Role,
    ) -> Result<manufacturing_order::Model, ServiceError> {
        ensure_can_release(actor_role)?;
        let _guard = self.locks.acquire(*mo_id).await;
        let db = self.connection();
        let mo = self.find_mo(mo_id).await?;

        if mo.status != MoStatus::Partial {
            return Err(ServiceError::InvalidState(format!(
                "full release requires PARTIAL; MO {} is {}",
                mo_id, mo.status
            )));
        }

        let label = PurchaseOrderEntity::find_by_id(mo.po_label_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("purchase order {} not found", mo.po_label_id))
            })?;
        if label.status != PoStatus::Received {
            return Err(ServiceError::PreconditionNotMet(format!(
                "label PO {} has not been received (status {})",
                label.id, label.status
            )));
        }

        // Lock in the label's current week/destination; they were only
        // candidates until now.
        let version = mo.version;
        let mut active: manufacturing_order::ActiveModel = mo.into();
        active.status = Set(MoStatus::ReleasedPendingFanout);
        active.week = Set(label.week.clone());
        active.destination = Set(label.destination.clone());
        active.version = Set(version + 1);
        let updated = active.update(db).await?;
        self.emit_status_change(mo_id, MoStatus::Partial, MoStatus::ReleasedPendingFanout)
            .await;

        self.finish_full_release(updated).await
    }

    /// Re-runs the outstanding fan-out legs of a PARTIAL or
    /// RELEASED_PENDING_FANOUT MO. Legs that already landed are skipped.
    #[instrument(skip(self))]
    pub async fn redrive_fanout(
        &self,
        mo_id: &Uuid,
        actor_role: Role,
    ) -> Result<manufacturing_order::Model, ServiceError> {
        ensure_can_release(actor_role)?;
        let _guard = self.locks.acquire(*mo_id).await;
        let mo = self.find_mo(mo_id).await?;

        match mo.status {
            MoStatus::Partial => {
                self.fan_out_departments(&mo, &Department::PARTIAL_RELEASE)
                    .await?;
                Ok(mo)
            }
            MoStatus::ReleasedPendingFanout => self.finish_full_release(mo).await,
            other => Err(ServiceError::InvalidState(format!(
                "nothing to redrive for MO {} in {}",
                mo_id, other
            ))),
        }
    }

    /// Closes a fully released MO once every SPK is done (or cancelled).
    #[instrument(skip(self))]
    pub async fn complete(
        &self,
        mo_id: &Uuid,
        actor_role: Role,
    ) -> Result<manufacturing_order::Model, ServiceError> {
        ensure_can_release(actor_role)?;
        let _guard = self.locks.acquire(*mo_id).await;
        let db = self.connection();
        let mo = self.find_mo(mo_id).await?;

        if mo.status != MoStatus::Released {
            return Err(ServiceError::InvalidState(format!(
                "completion requires RELEASED; MO {} is {}",
                mo_id, mo.status
            )));
        }

        let spks = SpkEntity::find()
            .filter(spk::Column::MoId.eq(*mo_id))
            .all(db)
            .await?;
        let open: Vec<&spk::Model> = spks
            .iter()
            .filter(|s| !matches!(s.status, SpkStatus::Done | SpkStatus::Cancelled))
            .collect();
        if !open.is_empty() {
            return Err(ServiceError::PreconditionNotMet(format!(
                "{} open SPKs remain for MO {}",
                open.len(),
                mo_id
            )));
        }

        let version = mo.version;
        let mut active: manufacturing_order::ActiveModel = mo.into();
        active.status = Set(MoStatus::Completed);
        active.version = Set(version + 1);
        let updated = active.update(db).await?;

        self.emit_status_change(mo_id, MoStatus::Released, MoStatus::Completed)
            .await;
        self.event_sender
            .send_or_log(Event::ManufacturingOrderCompleted(*mo_id))
            .await;

        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn get_mo(
        &self,
        mo_id: &Uuid,
    ) -> Result<Option<manufacturing_order::Model>, ServiceError> {
        let db = self.connection();
        let mo = MoEntity::find_by_id(*mo_id).one(db).await?;
        Ok(mo)
    }

    #[instrument(skip(self))]
    pub async fn list_mos(
        &self,
        status: Option<MoStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<manufacturing_order::Model>, u64), ServiceError> {
        let db = self.connection();
        let limit = limit.max(1);
        let page = page.max(1) - 1;

        let mut query = MoEntity::find();
        if let Some(status) = status {
            query = query.filter(manufacturing_order::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(manufacturing_order::Column::CreatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page).await?;
        Ok((models, total))
    }

    /// The SPKs fanned out for an MO, in department process order.
    #[instrument(skip(self))]
    pub async fn get_mo_spks(&self, mo_id: &Uuid) -> Result<Vec<spk::Model>, ServiceError> {
        let db = self.connection();
        self.find_mo(mo_id).await?;
        let mut spks = SpkEntity::find()
            .filter(spk::Column::MoId.eq(*mo_id))
            .all(db)
            .await?;
        spks.sort_by_key(|s| s.department.process_order());
        Ok(spks)
    }

    /// Shop-floor SPK status change, validated against the SPK's own
    /// small state machine.
    #[instrument(skip(self))]
    pub async fn update_spk_status(
        &self,
        spk_id: &Uuid,
        next: SpkStatus,
    ) -> Result<spk::Model, ServiceError> {
        let db = self.connection();
        let spk = SpkEntity::find_by_id(*spk_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("SPK {} not found", spk_id)))?;

        if spk.status == next {
            return Ok(spk);
        }
        if !spk.status.can_transition_to(next) {
            return Err(ServiceError::InvalidState(format!(
                "SPK {} cannot move {} -> {}",
                spk_id, spk.status, next
            )));
        }

        let old = spk.status;
        let mut active: spk::ActiveModel = spk.into();
        active.status = Set(next);
        let updated = active.update(db).await?;
        info!(spk_id = %spk_id, from = %old, to = %next, "SPK status changed");
        Ok(updated)
    }

    /// Runs the full-release legs and, once all have landed, promotes the
    /// MO to RELEASED. On a failed leg the MO stays
    /// RELEASED_PENDING_FANOUT and the error propagates.
    async fn finish_full_release(
        &self,
        mo: manufacturing_order::Model,
    ) -> Result<manufacturing_order::Model, ServiceError> {
        let db = self.connection();
        self.fan_out_departments(&mo, &Department::FULL_RELEASE)
            .await?;

        if mo.allocation_requested_at.is_none() {
            let leg = with_retry(&self.retry, FanoutRetryPolicy, || {
                self.request_allocation_leg(&mo)
            })
            .await;
            if let Err(err) = leg {
                self.event_sender
                    .send_or_log(Event::FanoutRetryExhausted {
                        mo_id: mo.id,
                        leg: "ALLOCATION".to_string(),
                        attempts: self.retry.max_attempts,
                    })
                    .await;
                return Err(err);
            }
        } else {
            // Rows were requested on an earlier attempt; make sure they
            // all reached the balances.
            self.ledger.commit_pending_allocations(&mo.id).await?;
        }

        let mo_id = mo.id;
        let version = mo.version;
        let mut active: manufacturing_order::ActiveModel = mo.into();
        active.status = Set(MoStatus::Released);
        active.allocation_requested_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        let updated = active.update(db).await?;

        self.emit_status_change(&mo_id, MoStatus::ReleasedPendingFanout, MoStatus::Released)
            .await;
        self.event_sender
            .send_or_log(Event::DepartmentsUnlocked {
                mo_id,
                departments: Department::FULL_RELEASE.to_vec(),
            })
            .await;
        self.event_sender
            .send_or_log(Event::ManufacturingOrderReleased(mo_id))
            .await;

        Ok(updated)
    }

    /// Explodes the article's BOM at finalQty and books the rolled-up
    /// demand as allocation requests. BOM problems are not retryable and
    /// surface as unmet preconditions.
    async fn request_allocation_leg(
        &self,
        mo: &manufacturing_order::Model,
    ) -> Result<(), ServiceError> {
        let report = self
            .bom_resolver
            .explode(
                &mo.article_id,
                Decimal::from(mo.final_qty),
                ExplosionOptions::default(),
            )
            .await
            .map_err(|err| match err {
                ServiceError::DatabaseError(inner) => ServiceError::DatabaseError(inner),
                other => ServiceError::PreconditionNotMet(format!(
                    "material explosion for MO {} failed: {}",
                    mo.id, other
                )),
            })?;

        self.ledger
            .request_allocations(&mo.id, &report.rolled_up)
            .await?;
        self.ledger.commit_pending_allocations(&mo.id).await?;
        Ok(())
    }

    /// One retried, idempotent SPK leg per department.
    async fn fan_out_departments(
        &self,
        mo: &manufacturing_order::Model,
        departments: &[Department],
    ) -> Result<Vec<spk::Model>, ServiceError> {
        let mut spks = Vec::with_capacity(departments.len());
        for department in departments.iter().copied() {
            let leg = with_retry(&self.retry, FanoutRetryPolicy, || {
                self.ensure_spk(mo, department)
            })
            .await;
            match leg {
                Ok((spk, created)) => {
                    if created {
                        self.event_sender
                            .send_or_log(Event::SpkGenerated {
                                mo_id: mo.id,
                                spk_id: spk.id,
                                department,
                                qty: spk.qty,
                            })
                            .await;
                    }
                    spks.push(spk);
                }
                Err(err) => {
                    self.event_sender
                        .send_or_log(Event::FanoutRetryExhausted {
                            mo_id: mo.id,
                            leg: format!("SPK:{}", department),
                            attempts: self.retry.max_attempts,
                        })
                        .await;
                    return Err(err);
                }
            }
        }
        Ok(spks)
    }

    /// Returns the existing SPK for (MO, department) or creates it. The
    /// bool reports whether a row was created on this call.
    async fn ensure_spk(
        &self,
        mo: &manufacturing_order::Model,
        department: Department,
    ) -> Result<(spk::Model, bool), ServiceError> {
        let db = self.connection();
        if let Some(existing) = SpkEntity::find()
            .filter(spk::Column::MoId.eq(mo.id))
            .filter(spk::Column::Department.eq(department))
            .one(db)
            .await?
        {
            return Ok((existing, false));
        }

        let suffix = mo
            .order_number
            .strip_prefix("MO-")
            .unwrap_or(&mo.order_number);
        let model = spk::ActiveModel {
            spk_number: Set(format!("SPK-{}-{}", department.code(), suffix)),
            mo_id: Set(mo.id),
            department: Set(department),
            article_id: Set(mo.article_id),
            article_code: Set(mo.article_code.clone()),
            qty: Set(mo.final_qty),
            ..Default::default()
        };
        let spk = model.insert(db).await?;
        Ok((spk, true))
    }

    async fn find_mo(&self, mo_id: &Uuid) -> Result<manufacturing_order::Model, ServiceError> {
        let db = self.connection();
        MoEntity::find_by_id(*mo_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("manufacturing order {} not found", mo_id)))
    }

    async fn emit_status_change(&self, mo_id: &Uuid, old: MoStatus, new: MoStatus) {
        self.event_sender
            .send_or_log(Event::ManufacturingOrderStatusChanged {
                mo_id: *mo_id,
                old_status: old.to_string(),
                new_status: new.to_string(),
            })
            .await;
    }

    fn connection(&self) -> &DatabaseConnection {
        self.db_pool.as_ref()
    }
}

fn ensure_can_release(role: Role) -> Result<(), ServiceError> {
    if !role.has_capability(Capability::ReleaseMo) {
        return Err(ServiceError::UnauthorizedTransition(format!(
            "role {} cannot release manufacturing orders",
            role
        )));
    }
    Ok(())
}

fn order_number_for(mo_id: &Uuid) -> String {
    let simple = mo_id.simple().to_string();
    format!("MO-{}", simple[..8].to_uppercase())
}

/// finalQty = targetQty plus the half-up-rounded buffer. The buffer
/// percent must sit in [0, 10].
pub fn compute_final_qty(target_qty: i32, buffer_percent: Decimal) -> Result<i32, ServiceError> {
    if buffer_percent < Decimal::ZERO || buffer_percent > dec!(10) {
        return Err(ServiceError::OutOfRange(format!(
            "buffer_percent must be between 0 and 10, got {}",
            buffer_percent
        )));
    }
    let buffer = (Decimal::from(target_qty) * buffer_percent / dec!(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let buffer = buffer.to_i32().ok_or_else(|| {
        ServiceError::InternalError(format!("buffer does not fit an i32: {}", buffer))
    })?;
    Ok(target_qty + buffer)
}
