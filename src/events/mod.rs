use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::Department;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is down.
    /// Release and ledger paths use this so a lagging consumer never aborts
    /// a committed state change.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Manufacturing order lifecycle
    ManufacturingOrderCreated(Uuid),
    ManufacturingOrderPartiallyReleased(Uuid),
    ManufacturingOrderReleased(Uuid),
    ManufacturingOrderCompleted(Uuid),
    ManufacturingOrderStatusChanged {
        mo_id: Uuid,
        old_status: String,
        new_status: String,
    },
    DepartmentsUnlocked {
        mo_id: Uuid,
        departments: Vec<Department>,
    },
    SpkGenerated {
        mo_id: Uuid,
        spk_id: Uuid,
        department: Department,
        qty: i32,
    },
    FanoutRetryExhausted {
        mo_id: Uuid,
        /// Which fan-out leg gave up: an SPK department or the
        /// material-allocation request.
        leg: String,
        attempts: u32,
    },

    // Purchase order events
    PurchaseOrderReceived {
        po_id: Uuid,
        po_number: String,
    },
    PoKainBound {
        mo_id: Uuid,
        po_id: Uuid,
    },

    // Material ledger events
    MaterialAllocationRequested {
        mo_id: Uuid,
        material_count: usize,
    },
    MaterialReceived {
        material_id: Uuid,
        location: String,
        qty: Decimal,
    },
    MaterialDebtCreated {
        debt_id: Uuid,
        spk_id: Uuid,
        material_id: Uuid,
        qty_owed: Decimal,
    },
    MaterialDebtApproved {
        debt_id: Uuid,
        approval_status: String,
    },
    MaterialDebtRejected(Uuid),
    MaterialDebtSettled {
        debt_id: Uuid,
        qty_received: Decimal,
        debt_status: String,
    },
    ShortfallRegistered {
        spk_id: Uuid,
        material_id: Uuid,
        department: Department,
        qty: Decimal,
    },

    // WIP buffer events
    WipProductionRecorded {
        spk_id: Uuid,
        department: Department,
        qty: i32,
    },
    WipConsumptionRecorded {
        spk_id: Uuid,
        department: Department,
        qty: i32,
    },
    /// Consumption drove a buffer negative. The tracker only requests the
    /// debt; the material ledger owns its creation.
    WipDebtRequested {
        spk_id: Uuid,
        article_id: Uuid,
        department: Department,
        qty_owed: i32,
    },
    WipTransferred {
        from_spk_id: Uuid,
        to_spk_id: Uuid,
        qty: i32,
    },
    WipStatusChanged {
        spk_id: Uuid,
        department: Department,
        old_status: String,
        new_status: String,
    },

    // Generic event data
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// Create a generic event with string data
    pub fn with_data(data: String) -> Self {
        Event::Generic {
            message: data,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

// Function to process incoming events. Consumers that need a durable feed
// (notifications, reporting) hang off this loop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::ManufacturingOrderReleased(mo_id) => {
                if let Err(e) = handle_mo_released(mo_id).await {
                    error!(
                        "Failed to handle MO released event: mo_id={}, error={}",
                        mo_id, e
                    );
                }
            }
            Event::SpkGenerated {
                mo_id,
                spk_id,
                department,
                qty,
            } => {
                info!(
                    "SPK generated: mo_id={}, spk_id={}, department={}, qty={}",
                    mo_id, spk_id, department, qty
                );
            }
            Event::FanoutRetryExhausted {
                mo_id,
                leg,
                attempts,
            } => {
                // Surfaced loudly so operations can re-drive the fan-out.
                error!(
                    "Release fan-out exhausted retries: mo_id={}, leg={}, attempts={}",
                    mo_id, leg, attempts
                );
            }
            Event::ShortfallRegistered {
                spk_id,
                material_id,
                department,
                qty,
            } => {
                warn!(
                    "Material shortfall registered: spk_id={}, material_id={}, department={}, qty={}",
                    spk_id, material_id, department, qty
                );
            }
            Event::WipDebtRequested {
                spk_id,
                article_id,
                department,
                qty_owed,
            } => {
                warn!(
                    "WIP buffer negative, debt requested: spk_id={}, article_id={}, department={}, qty_owed={}",
                    spk_id, article_id, department, qty_owed
                );
            }
            Event::MaterialDebtSettled {
                debt_id,
                qty_received,
                debt_status,
            } => {
                info!(
                    "Material debt settlement: debt_id={}, qty_received={}, status={}",
                    debt_id, qty_received, debt_status
                );
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}

async fn handle_mo_released(mo_id: Uuid) -> Result<(), String> {
    info!("Manufacturing order fully released: mo_id={}", mo_id);
    Ok(())
}
