use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

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

    /// Sends an event, logging instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            error!("{}", e);
        }
    }
}

// Domain events emitted by the basket, voucher and payment services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    // Basket events
    BasketCreated(Uuid),
    BasketItemAdded {
        basket_id: Uuid,
        item_id: Uuid,
    },
    BasketItemUpdated {
        basket_id: Uuid,
        item_id: Uuid,
    },
    BasketItemRemoved {
        basket_id: Uuid,
        item_id: Uuid,
    },
    BasketReserved(Uuid),
    BasketCheckedOut {
        basket_id: Uuid,
        payment_id: Uuid,
    },
    BasketPaid {
        basket_id: Uuid,
        payment_id: Uuid,
    },
    BasketCancelled(Uuid),
    BasketExpired(Uuid),

    // Voucher events
    VoucherCreated(Uuid),
    VoucherApplied {
        voucher_id: Uuid,
        basket_id: Uuid,
    },
    VoucherReleased {
        voucher_id: Uuid,
        basket_id: Uuid,
    },

    // Payment events
    PaymentCreated(Uuid),
    PaymentStarted {
        payment_id: Uuid,
        attempt_id: String,
        gateway: String,
    },
    PaymentSucceeded(Uuid),
    PaymentFailed {
        payment_id: Uuid,
        reason: String,
    },
    ProposalCreated {
        payment_id: Uuid,
        proposal_id: String,
        amount: Decimal,
    },
    EnrollmentCreated {
        basket_id: Uuid,
        item_id: Uuid,
        enrollment_id: String,
    },
}

/// Drains the event channel, logging every event until all senders are dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::PaymentFailed { payment_id, reason } => {
                warn!(%payment_id, %reason, "Payment failed");
            }
            Event::BasketPaid {
                basket_id,
                payment_id,
            } => {
                info!(%basket_id, %payment_id, "Basket paid");
            }
            Event::ProposalCreated {
                payment_id,
                proposal_id,
                amount,
            } => {
                info!(%payment_id, %proposal_id, %amount, "Funds proposal created");
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    warn!("Event processing loop has ended");
}
