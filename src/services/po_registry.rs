use crate::{
    db::DbPool,
    entities::purchase_order::{self, Entity as PurchaseOrderEntity, PoKind, PoStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Input payload for registering a purchase order
#[derive(Debug, Clone)]
pub struct CreatePoInput {
    pub po_number: String,
    pub kind: PoKind,
    pub qty: i32,
    pub week: Option<String>,
    pub destination: Option<String>,
}

/// Service for the purchase-order registry backing the dual-trigger release
#[derive(Clone)]
pub struct PoRegistryService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl PoRegistryService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Registers a purchase order.
    ///
    /// Label POs must carry week and destination because a manufacturing
    /// order inherits both at full release.
    #[instrument(skip(self, input))]
    pub async fn create_po(
        &self,
        input: CreatePoInput,
    ) -> Result<purchase_order::Model, ServiceError> {
        let db = self.connection();

        if input.qty <= 0 {
            return Err(ServiceError::InvalidQuantity(
                "purchase order qty must be greater than zero".to_string(),
            ));
        }
        if input.po_number.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "po_number must not be empty".to_string(),
            ));
        }
        if input.kind == PoKind::Label
            && (is_blank(&input.week) || is_blank(&input.destination))
        {
            return Err(ServiceError::ValidationError(
                "label purchase orders require week and destination".to_string(),
            ));
        }

        let duplicate = PurchaseOrderEntity::find()
            .filter(purchase_order::Column::PoNumber.eq(input.po_number.trim()))
            .one(db)
            .await?;
        if duplicate.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "purchase order {} already exists",
                input.po_number.trim()
            )));
        }

        let model = purchase_order::ActiveModel {
            po_number: Set(input.po_number.trim().to_string()),
            kind: Set(input.kind),
            qty: Set(input.qty),
            week: Set(input.week.filter(|w| !w.trim().is_empty())),
            destination: Set(input.destination.filter(|d| !d.trim().is_empty())),
            ..Default::default()
        };

        let po = model.insert(db).await?;
        Ok(po)
    }

    #[instrument(skip(self))]
    pub async fn get_po(&self, po_id: &Uuid) -> Result<Option<purchase_order::Model>, ServiceError> {
        let db = self.connection();
        let po = PurchaseOrderEntity::find_by_id(*po_id).one(db).await?;
        Ok(po)
    }

    /// Returns paginated purchase orders, optionally filtered by kind and status.
    #[instrument(skip(self))]
    pub async fn list_pos(
        &self,
        kind: Option<PoKind>,
        status: Option<PoStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<purchase_order::Model>, u64), ServiceError> {
        let db = self.connection();
        let limit = limit.max(1);
        let page = page.max(1) - 1;

        let mut query = PurchaseOrderEntity::find();
        if let Some(kind) = kind {
            query = query.filter(purchase_order::Column::Kind.eq(kind));
        }
        if let Some(status) = status {
            query = query.filter(purchase_order::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(purchase_order::Column::CreatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page).await?;

        Ok((models, total))
    }

    /// Marks a purchase order as received. This is the trigger that unlocks
    /// partial (kain) or full (label) release on any order bound to it.
    #[instrument(skip(self))]
    pub async fn receive_po(&self, po_id: &Uuid) -> Result<purchase_order::Model, ServiceError> {
        let db = self.connection();

        let po = PurchaseOrderEntity::find_by_id(*po_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("purchase order {} not found", po_id))
            })?;

        match po.status {
            PoStatus::Issued => {}
            PoStatus::Received => {
                return Err(ServiceError::InvalidState(format!(
                    "purchase order {} already received",
                    po.po_number
                )))
            }
            PoStatus::Cancelled => {
                return Err(ServiceError::InvalidState(format!(
                    "purchase order {} is cancelled",
                    po.po_number
                )))
            }
        }

        let po_number = po.po_number.clone();
        let mut active: purchase_order::ActiveModel = po.into();
        active.status = Set(PoStatus::Received);
        active.received_at = Set(Some(Utc::now()));
        let updated = active.update(db).await?;

        self.event_sender
            .send_or_log(Event::PurchaseOrderReceived {
                po_id: updated.id,
                po_number,
            })
            .await;

        Ok(updated)
    }

    /// Cancels a purchase order that has not been received or bound.
    #[instrument(skip(self))]
    pub async fn cancel_po(&self, po_id: &Uuid) -> Result<purchase_order::Model, ServiceError> {
        let db = self.connection();

        let po = PurchaseOrderEntity::find_by_id(*po_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("purchase order {} not found", po_id))
            })?;

        if po.status != PoStatus::Issued {
            return Err(ServiceError::InvalidState(format!(
                "purchase order {} cannot be cancelled from status {:?}",
                po.po_number, po.status
            )));
        }
        if po.consumed_by_mo.is_some() {
            return Err(ServiceError::InvalidState(format!(
                "purchase order {} is bound to a manufacturing order",
                po.po_number
            )));
        }

        let mut active: purchase_order::ActiveModel = po.into();
        active.status = Set(PoStatus::Cancelled);
        let updated = active.update(db).await?;

        Ok(updated)
    }

    fn connection(&self) -> &DatabaseConnection {
        self.db_pool.as_ref()
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
