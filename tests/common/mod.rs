#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use ppic_api::{
    auth::Role,
    config::AppConfig,
    db::{self, DbConfig, DbPool},
    entities::{
        bom::BomType,
        bom_detail::VariantSelectionMode,
        department::Department,
        manufacturing_order,
        purchase_order::{self, PoKind},
        spk,
    },
    events::{self, Event, EventSender},
    handlers::AppServices,
    middleware_helpers::RetryConfig,
    services::{
        bom_resolver::{BomResolverService, CreateBomDetailInput, CreateBomInput},
        material_ledger::MaterialLedgerService,
        po_registry::{CreatePoInput, PoRegistryService},
        release::{CreateMoInput, ReleaseService},
        wip_tracker::WipTrackerService,
    },
    AppState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// The full service stack wired onto a fresh in-memory SQLite database.
/// Every test builds its own engine, so state never leaks across tests.
pub struct TestEngine {
    pub db: Arc<DbPool>,
    pub pos: PoRegistryService,
    pub release: ReleaseService,
    pub boms: BomResolverService,
    pub wip: WipTrackerService,
    pub ledger: MaterialLedgerService,
    /// Receiver half of the event channel. Drain it to assert on emitted
    /// events; sends fall back to logging once it is dropped.
    pub events: mpsc::Receiver<Event>,
}

impl TestEngine {
    pub async fn new() -> Self {
        Self::with_settings(dec!(100), 0).await
    }

    /// Builds the stack with a specific debt escalation threshold and WIP
    /// transfer allowance.
    pub async fn with_settings(escalation_threshold: Decimal, wip_debt_allowance: i32) -> Self {
        let cfg = DbConfig {
            url: "sqlite::memory:".to_string(),
            // A second pooled connection would open its own empty
            // in-memory database.
            max_connections: 1,
            min_connections: 1,
            ..DbConfig::default()
        };
        let pool = db::establish_connection_with_config(&cfg)
            .await
            .expect("connect to in-memory sqlite");
        db::run_migrations(&pool).await.expect("run migrations");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(1024);
        let event_sender = Arc::new(EventSender::new(event_tx));

        let boms = BomResolverService::new(db.clone());
        let ledger =
            MaterialLedgerService::new(db.clone(), event_sender.clone(), escalation_threshold);
        let release = ReleaseService::new(
            db.clone(),
            event_sender.clone(),
            boms.clone(),
            ledger.clone(),
            fast_retry(),
        );
        let pos = PoRegistryService::new(db.clone(), event_sender.clone());
        let wip = WipTrackerService::new(db.clone(), event_sender, wip_debt_allowance);

        Self {
            db,
            pos,
            release,
            boms,
            wip,
            ledger,
            events: event_rx,
        }
    }

    /// Registers a purchase order and marks it received in one step.
    pub async fn received_po(&self, kind: PoKind, qty: i32) -> purchase_order::Model {
        let po = self
            .pos
            .create_po(CreatePoInput {
                po_number: po_number(),
                kind,
                qty,
                week: Some("W34".to_string()),
                destination: Some("JAKARTA".to_string()),
            })
            .await
            .expect("create purchase order");
        self.pos
            .receive_po(&po.id)
            .await
            .expect("receive purchase order")
    }

    /// DRAFT order built from a freshly received label PO.
    pub async fn draft_mo(&self, qty: i32, buffer_percent: Decimal) -> manufacturing_order::Model {
        let label = self.received_po(PoKind::Label, qty).await;
        self.release
            .create_mo(CreateMoInput {
                article_id: Uuid::new_v4(),
                article_code: article_code(),
                po_label_id: label.id,
                buffer_percent: Some(buffer_percent),
                created_by: None,
            })
            .await
            .expect("create manufacturing order")
    }

    /// Order taken through fabric binding and partial release: the
    /// Cutting and Embroidery SPKs exist and are PENDING.
    pub async fn partial_mo(
        &self,
        qty: i32,
        buffer_percent: Decimal,
    ) -> manufacturing_order::Model {
        let mo = self.draft_mo(qty, buffer_percent).await;
        let kain = self.received_po(PoKind::Kain, qty).await;
        self.release
            .bind_po_kain(&mo.id, &kain.id)
            .await
            .expect("bind fabric PO");
        self.release
            .release_partial(&mo.id, Role::Spv)
            .await
            .expect("partial release")
    }

    /// Fully released order over a single-line BOM, with its five SPKs in
    /// process order.
    pub async fn released_mo(&self, qty: i32) -> (manufacturing_order::Model, Vec<spk::Model>) {
        let mo = self.partial_mo(qty, Decimal::ZERO).await;
        self.seed_flat_bom(&mo.article_id).await;
        let mo = self
            .release
            .release_full(&mo.id, Role::Spv)
            .await
            .expect("full release");
        let spks = self.release.get_mo_spks(&mo.id).await.expect("load SPKs");
        (mo, spks)
    }

    /// Single-level BOM for the article: two pieces of one fabric per
    /// unit, no wastage, no variants. Returns the fabric's material id.
    pub async fn seed_flat_bom(&self, product_id: &Uuid) -> Uuid {
        let material_id = Uuid::new_v4();
        self.boms
            .create_bom(CreateBomInput {
                product_id: *product_id,
                bom_type: BomType::Manufacturing,
                qty_output: dec!(1),
                revision: None,
                supports_multi_material: false,
                created_by: None,
                details: vec![CreateBomDetailInput {
                    component_id: material_id,
                    qty_needed: dec!(2),
                    wastage_percent: Decimal::ZERO,
                    department: Some(Department::Cutting),
                    variant_selection_mode: VariantSelectionMode::PrimaryFirst,
                }],
            })
            .await
            .expect("seed BOM");
        material_id
    }

    /// Everything emitted so far, in order.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_factor: 2.0,
    }
}

pub fn po_number() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("PO-{}", &id[..12].to_uppercase())
}

pub fn article_code() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("ART-{}", &id[..8].to_uppercase())
}

/// Application state plus the full /api/v1 router for endpoint tests.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "development".to_string(),
        );
        // A second pooled connection would open its own empty in-memory
        // database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("test database");
        db::run_migrations(&pool).await.expect("migrations");

        let db = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db.clone(), event_sender.clone(), &cfg);
        let state = AppState {
            db,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", ppic_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Send a request against the router, serializing `body` as JSON.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
