use crate::{
    db::DbPool,
    entities::{
        department::Department,
        material_debt::{self, Entity as MaterialDebtEntity},
        spk::{self, Entity as SpkEntity, SpkStatus},
        wip_buffer::{self, derive_status, Entity as WipBufferEntity, WipStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    locks::EntityLocks,
};
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Read view of a WIP buffer row with its derived band.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WipSnapshot {
    pub id: Uuid,
    pub spk_id: Uuid,
    pub department: Department,
    pub article_id: Uuid,
    pub article_code: String,
    pub buffer_stock: i32,
    pub cumulative_produced: i32,
    pub cumulative_consumed: i32,
    pub target_qty: i32,
    pub status: WipStatus,
    pub updated_at: DateTime<Utc>,
}

impl From<wip_buffer::Model> for WipSnapshot {
    fn from(model: wip_buffer::Model) -> Self {
        let status = model.derived_status();
        WipSnapshot {
            id: model.id,
            spk_id: model.spk_id,
            department: model.department,
            article_id: model.article_id,
            article_code: model.article_code,
            buffer_stock: model.buffer_stock,
            cumulative_produced: model.cumulative_produced,
            cumulative_consumed: model.cumulative_consumed,
            target_qty: model.target_qty,
            status,
            updated_at: model.updated_at,
        }
    }
}

/// Per-department aggregate used by the bottleneck report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DepartmentThroughput {
    pub department: Department,
    pub cumulative_produced: i64,
    pub cumulative_consumed: i64,
    pub buffer_stock: i64,
    pub entries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BottleneckReport {
    pub article_code: String,
    /// Entry with the lowest cumulative production; earliest department in
    /// the process chain wins ties.
    pub bottleneck: WipSnapshot,
    pub per_department: Vec<DepartmentThroughput>,
}

/// Tracks per-department, per-article WIP buffers between production
/// stages. Buffers are signed: consuming ahead of receipt drives a buffer
/// negative and raises a debt request toward the material ledger.
#[derive(Clone)]
pub struct WipTrackerService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    locks: EntityLocks,
    /// How far below zero a transfer may drive the source buffer.
    wip_debt_allowance: i32,
}

impl WipTrackerService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        wip_debt_allowance: i32,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            locks: EntityLocks::new(),
            wip_debt_allowance,
        }
    }

    /// Records finished pieces for an SPK. Increments bufferStock and
    /// cumulativeProduced; a pending SPK moves to IN_PROGRESS on its first
    /// recorded production.
    ///
    /// Production is refused while the SPK carries an unapproved material
    /// debt that was created with `allow_production_while_pending = false`.
    #[instrument(skip(self))]
    pub async fn record_production(
        &self,
        spk_id: &Uuid,
        qty: i32,
    ) -> Result<WipSnapshot, ServiceError> {
        if qty <= 0 {
            return Err(ServiceError::InvalidQuantity(
                "production qty must be greater than zero".to_string(),
            ));
        }

        let _guard = self.locks.acquire(*spk_id).await;
        let db = self.connection();

        let spk = SpkEntity::find_by_id(*spk_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("SPK {} not found", spk_id)))?;

        match spk.status {
            SpkStatus::Done | SpkStatus::Cancelled => {
                return Err(ServiceError::InvalidState(format!(
                    "SPK {} is {:?} and no longer accepts production",
                    spk.spk_number, spk.status
                )))
            }
            SpkStatus::Pending | SpkStatus::InProgress => {}
        }

        if self.has_blocking_debt(&spk).await? {
            return Err(ServiceError::PreconditionNotMet(format!(
                "production on SPK {} is blocked by an unapproved material debt",
                spk.spk_number
            )));
        }

        let txn = db.begin().await?;

        if spk.status == SpkStatus::Pending {
            let mut active: spk::ActiveModel = spk.clone().into();
            active.status = Set(SpkStatus::InProgress);
            active.update(&txn).await?;
        }

        let (updated, old_status) = apply_delta(&txn, &spk, qty, qty, 0).await?;
        txn.commit().await?;

        // Informational only: the next stage can now draw these pieces.
        if let Some(downstream) = Department::ALL.get(spk.department.process_order() + 1) {
            info!(
                spk_id = %spk.id,
                department = %spk.department,
                downstream = %downstream,
                qty,
                "production recorded, pieces available downstream"
            );
        }

        self.event_sender
            .send_or_log(Event::WipProductionRecorded {
                spk_id: spk.id,
                department: spk.department,
                qty,
            })
            .await;
        self.emit_band_change(&updated, old_status).await;

        Ok(updated.into())
    }

    /// Records pieces drawn from an SPK's buffer by the next stage. The
    /// buffer may go negative; the incremental negative magnitude is
    /// raised to the material ledger as the candidate qtyOwed of a piece
    /// debt. Deepening the shortfall is refused while a blocking debt on
    /// the SPK awaits approval.
    #[instrument(skip(self))]
    pub async fn record_consumption(
        &self,
        spk_id: &Uuid,
        qty: i32,
    ) -> Result<WipSnapshot, ServiceError> {
        if qty <= 0 {
            return Err(ServiceError::InvalidQuantity(
                "consumption qty must be greater than zero".to_string(),
            ));
        }

        let _guard = self.locks.acquire(*spk_id).await;
        let db = self.connection();

        let spk = SpkEntity::find_by_id(*spk_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("SPK {} not found", spk_id)))?;

        let current = WipBufferEntity::find()
            .filter(wip_buffer::Column::SpkId.eq(spk.id))
            .filter(wip_buffer::Column::Department.eq(spk.department))
            .one(db)
            .await?;
        let current_stock = current.as_ref().map_or(0, |e| e.buffer_stock);

        if current_stock - qty < 0 && self.has_blocking_debt(&spk).await? {
            return Err(ServiceError::PreconditionNotMet(format!(
                "consumption would deepen the shortfall on SPK {} while a blocking debt awaits approval",
                spk.spk_number
            )));
        }

        let txn = db.begin().await?;
        let (updated, old_status) = apply_delta(&txn, &spk, -qty, 0, qty).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::WipConsumptionRecorded {
                spk_id: spk.id,
                department: spk.department,
                qty,
            })
            .await;

        // Only the newly created shortfall is owed, not the whole balance.
        let debt_increment = debt_depth(updated.buffer_stock) - debt_depth(current_stock);
        if debt_increment > 0 {
            self.event_sender
                .send_or_log(Event::WipDebtRequested {
                    spk_id: spk.id,
                    article_id: spk.article_id,
                    department: spk.department,
                    qty_owed: debt_increment,
                })
                .await;
        }
        self.emit_band_change(&updated, old_status).await;

        Ok(updated.into())
    }

    /// Moves buffered pieces between two SPKs of the same article:
    /// downstream hand-off when the departments differ, load balancing
    /// when they match. Cumulative counters are untouched; only
    /// bufferStock moves. Refused when the source would fall below the
    /// configured debt allowance.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        from_spk_id: &Uuid,
        to_spk_id: &Uuid,
        qty: i32,
    ) -> Result<(WipSnapshot, WipSnapshot), ServiceError> {
        if qty <= 0 {
            return Err(ServiceError::InvalidQuantity(
                "transfer qty must be greater than zero".to_string(),
            ));
        }
        if from_spk_id == to_spk_id {
            return Err(ServiceError::ValidationError(
                "cannot transfer a buffer onto itself".to_string(),
            ));
        }

        // Lock in id order so two opposing transfers cannot deadlock.
        let (first, second) = if from_spk_id < to_spk_id {
            (*from_spk_id, *to_spk_id)
        } else {
            (*to_spk_id, *from_spk_id)
        };
        let _guard_a = self.locks.acquire(first).await;
        let _guard_b = self.locks.acquire(second).await;

        let db = self.connection();

        let from_spk = SpkEntity::find_by_id(*from_spk_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("SPK {} not found", from_spk_id)))?;
        let to_spk = SpkEntity::find_by_id(*to_spk_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("SPK {} not found", to_spk_id)))?;

        if from_spk.article_id != to_spk.article_id {
            return Err(ServiceError::ValidationError(format!(
                "transfer must stay within one article ({} -> {})",
                from_spk.spk_number, to_spk.spk_number
            )));
        }

        let source = WipBufferEntity::find()
            .filter(wip_buffer::Column::SpkId.eq(from_spk.id))
            .filter(wip_buffer::Column::Department.eq(from_spk.department))
            .one(db)
            .await?;
        let source_stock = source.as_ref().map_or(0, |e| e.buffer_stock);

        if source_stock - qty < -self.wip_debt_allowance {
            return Err(ServiceError::InsufficientBuffer(format!(
                "transferring {} would drive SPK {} buffer to {}, below the allowance of -{}",
                qty,
                from_spk.spk_number,
                source_stock - qty,
                self.wip_debt_allowance
            )));
        }

        let txn = db.begin().await?;
        let (from_updated, from_old) = apply_delta(&txn, &from_spk, -qty, 0, 0).await?;
        let (to_updated, to_old) = apply_delta(&txn, &to_spk, qty, 0, 0).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::WipTransferred {
                from_spk_id: from_spk.id,
                to_spk_id: to_spk.id,
                qty,
            })
            .await;
        self.emit_band_change(&from_updated, from_old).await;
        self.emit_band_change(&to_updated, to_old).await;

        Ok((from_updated.into(), to_updated.into()))
    }

    #[instrument(skip(self))]
    pub async fn get_snapshot(&self, spk_id: &Uuid) -> Result<Option<WipSnapshot>, ServiceError> {
        let db = self.connection();
        let entry = WipBufferEntity::find()
            .filter(wip_buffer::Column::SpkId.eq(*spk_id))
            .one(db)
            .await?;
        Ok(entry.map(WipSnapshot::from))
    }

    /// Returns paginated buffer entries, optionally narrowed to one
    /// article code and/or department.
    #[instrument(skip(self))]
    pub async fn list_wip(
        &self,
        article_code: Option<String>,
        department: Option<Department>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<WipSnapshot>, u64), ServiceError> {
        let db = self.connection();
        let limit = limit.max(1);
        let page = page.max(1) - 1;

        let mut query = WipBufferEntity::find();
        if let Some(code) = article_code {
            query = query.filter(wip_buffer::Column::ArticleCode.eq(code));
        }
        if let Some(department) = department {
            query = query.filter(wip_buffer::Column::Department.eq(department));
        }

        let paginator = query
            .order_by_desc(wip_buffer::Column::UpdatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page).await?;

        Ok((models.into_iter().map(WipSnapshot::from).collect(), total))
    }

    /// Finds the entry holding production back for an article: the buffer
    /// row with the lowest cumulativeProduced, ties broken by process
    /// order (Cutting before Embroidery before Sewing ...).
    #[instrument(skip(self))]
    pub async fn detect_bottleneck(
        &self,
        article_code: &str,
    ) -> Result<BottleneckReport, ServiceError> {
        let db = self.connection();

        let rows = WipBufferEntity::find()
            .filter(wip_buffer::Column::ArticleCode.eq(article_code))
            .all(db)
            .await?;
        if rows.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "no WIP recorded for article {}",
                article_code
            )));
        }

        let bottleneck = pick_bottleneck(&rows)
            .cloned()
            .ok_or_else(|| ServiceError::InternalError("bottleneck pick on empty set".into()))?;

        let mut per_department: Vec<DepartmentThroughput> = Vec::new();
        for department in Department::ALL {
            let dept_rows: Vec<&wip_buffer::Model> =
                rows.iter().filter(|r| r.department == department).collect();
            if dept_rows.is_empty() {
                continue;
            }
            per_department.push(DepartmentThroughput {
                department,
                cumulative_produced: dept_rows.iter().map(|r| r.cumulative_produced as i64).sum(),
                cumulative_consumed: dept_rows.iter().map(|r| r.cumulative_consumed as i64).sum(),
                buffer_stock: dept_rows.iter().map(|r| r.buffer_stock as i64).sum(),
                entries: dept_rows.len() as u64,
            });
        }

        Ok(BottleneckReport {
            article_code: article_code.to_string(),
            bottleneck: bottleneck.into(),
            per_department,
        })
    }

    /// A debt created with `allow_production_while_pending = false` halts
    /// the SPK until its approval track resolves.
    async fn has_blocking_debt(&self, spk: &spk::Model) -> Result<bool, ServiceError> {
        let db = self.connection();
        let debts = MaterialDebtEntity::find()
            .filter(material_debt::Column::SpkId.eq(spk.id))
            .filter(material_debt::Column::AllowProductionWhilePending.eq(false))
            .all(db)
            .await?;
        Ok(debts.iter().any(|d| !d.approval_status.is_terminal()))
    }

    async fn emit_band_change(&self, entry: &wip_buffer::Model, old_status: WipStatus) {
        let new_status = entry.derived_status();
        if new_status != old_status {
            self.event_sender
                .send_or_log(Event::WipStatusChanged {
                    spk_id: entry.spk_id,
                    department: entry.department,
                    old_status: old_status.to_string(),
                    new_status: new_status.to_string(),
                })
                .await;
        }
    }

    fn connection(&self) -> &DatabaseConnection {
        self.db_pool.as_ref()
    }
}

/// Applies stock/produced/consumed deltas to the buffer row for an SPK,
/// creating the row on first touch. Returns the updated row and the band
/// it was in before the change.
async fn apply_delta(
    txn: &DatabaseTransaction,
    spk: &spk::Model,
    stock_delta: i32,
    produced_delta: i32,
    consumed_delta: i32,
) -> Result<(wip_buffer::Model, WipStatus), ServiceError> {
    let existing = WipBufferEntity::find()
        .filter(wip_buffer::Column::SpkId.eq(spk.id))
        .filter(wip_buffer::Column::Department.eq(spk.department))
        .one(txn)
        .await?;

    match existing {
        Some(entry) => {
            let old_status = entry.derived_status();
            let next_stock = entry.buffer_stock + stock_delta;
            let next_produced = entry.cumulative_produced + produced_delta;
            let next_consumed = entry.cumulative_consumed + consumed_delta;

            let mut active: wip_buffer::ActiveModel = entry.into();
            active.buffer_stock = Set(next_stock);
            active.cumulative_produced = Set(next_produced);
            active.cumulative_consumed = Set(next_consumed);
            let updated = active.update(txn).await?;
            Ok((updated, old_status))
        }
        None => {
            let old_status = derive_status(0, spk.qty);
            let model = wip_buffer::ActiveModel {
                department: Set(spk.department),
                article_id: Set(spk.article_id),
                article_code: Set(spk.article_code.clone()),
                spk_id: Set(spk.id),
                buffer_stock: Set(stock_delta),
                cumulative_produced: Set(produced_delta),
                cumulative_consumed: Set(consumed_delta),
                target_qty: Set(spk.qty),
                ..Default::default()
            };
            let inserted = model.insert(txn).await?;
            Ok((inserted, old_status))
        }
    }
}

/// How many pieces a buffer is in the red, zero when non-negative.
fn debt_depth(buffer_stock: i32) -> i32 {
    (-buffer_stock).max(0)
}

/// Minimum cumulativeProduced wins; ties go to the earliest department in
/// the process chain, then to the oldest row for determinism.
fn pick_bottleneck(rows: &[wip_buffer::Model]) -> Option<&wip_buffer::Model> {
    rows.iter().min_by_key(|r| {
        (
            r.cumulative_produced,
            r.department.process_order(),
            r.created_at,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(department: Department, produced: i32) -> wip_buffer::Model {
        wip_buffer::Model {
            id: Uuid::new_v4(),
            department,
            article_id: Uuid::nil(),
            article_code: "ART-01".to_string(),
            spk_id: Uuid::new_v4(),
            buffer_stock: produced,
            cumulative_produced: produced,
            cumulative_consumed: 0,
            target_qty: 1000,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn bottleneck_is_minimum_cumulative_produced() {
        let rows = vec![
            entry(Department::Cutting, 800),
            entry(Department::Sewing, 200),
            entry(Department::Packing, 500),
        ];
        let picked = pick_bottleneck(&rows).unwrap();
        assert_eq!(picked.department, Department::Sewing);
        assert_eq!(picked.cumulative_produced, 200);
    }

    #[test]
    fn bottleneck_tie_goes_to_earliest_department() {
        let rows = vec![
            entry(Department::Packing, 300),
            entry(Department::Embroidery, 300),
            entry(Department::Sewing, 300),
        ];
        let picked = pick_bottleneck(&rows).unwrap();
        assert_eq!(picked.department, Department::Embroidery);
    }

    #[test]
    fn bottleneck_of_empty_set_is_none() {
        assert!(pick_bottleneck(&[]).is_none());
    }

    #[test]
    fn debt_depth_measures_only_the_red() {
        assert_eq!(debt_depth(25), 0);
        assert_eq!(debt_depth(0), 0);
        assert_eq!(debt_depth(-7), 7);
        // Consuming 8 from a stock of 5 creates 3 pieces of new debt.
        assert_eq!(debt_depth(5 - 8) - debt_depth(5), 3);
        // Consuming 8 from a stock of -3 creates 8 more.
        assert_eq!(debt_depth(-3 - 8) - debt_depth(-3), 8);
    }
}
