use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
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

    /// Publishes an event; a closed channel is logged and otherwise ignored.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping domain event");
        }
    }
}

/// Things that happened in the checkout flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Coupon events
    CouponCreated {
        code: String,
    },
    CouponRedeemed {
        code: String,
        used_count: i32,
        max_uses: Option<i32>,
    },

    // Checkout events
    CheckoutStarted {
        checkout_id: String,
        user_id: String,
        amount_minor: i64,
    },
    OrderPlaced {
        checkout_id: String,
        user_id: String,
        payment_mode: String,
        total: Decimal,
    },
    OrderFinalized {
        checkout_id: String,
        user_id: String,
        paid_at: DateTime<Utc>,
    },
    PaymentFailed {
        checkout_id: String,
        reason: String,
    },

    // Follow-up events
    CartReconciled {
        user_id: String,
        lines_removed: u64,
    },
    InventoryIncremented {
        checkout_id: String,
        products: usize,
    },
    FollowUpFailed {
        checkout_id: String,
        step: String,
        error: String,
    },
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Event processor started");

    while let Some(event) = rx.recv().await {
        match event {
            Event::CouponCreated { code } => {
                info!(coupon = %code, "Coupon created");
            }
            Event::CouponRedeemed {
                code,
                used_count,
                max_uses,
            } => {
                info!(coupon = %code, used_count, ?max_uses, "Coupon redeemed");
            }
            Event::CheckoutStarted {
                checkout_id,
                user_id,
                amount_minor,
            } => {
                info!(%checkout_id, %user_id, amount_minor, "Checkout started");
            }
            Event::OrderPlaced {
                checkout_id,
                user_id,
                payment_mode,
                total,
            } => {
                info!(%checkout_id, %user_id, %payment_mode, %total, "Order placed");
            }
            Event::OrderFinalized {
                checkout_id,
                user_id,
                paid_at,
            } => {
                info!(%checkout_id, %user_id, %paid_at, "Order finalized");
            }
            Event::PaymentFailed {
                checkout_id,
                reason,
            } => {
                warn!(%checkout_id, %reason, "Payment failed");
            }
            Event::CartReconciled {
                user_id,
                lines_removed,
            } => {
                info!(%user_id, lines_removed, "Cart reconciled");
            }
            Event::InventoryIncremented {
                checkout_id,
                products,
            } => {
                info!(%checkout_id, products, "Inventory counters incremented");
            }
            Event::FollowUpFailed {
                checkout_id,
                step,
                error,
            } => {
                error!(%checkout_id, %step, %error, "Order follow-up failed");
            }
        }
    }

    info!("Event processor stopped");
}
