//! Signed, fire-and-forget notifications to the URLs carried by basket items.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::clients::build_http_client;
use crate::errors::ServiceError;
use crate::models::{Basket, BasketItem};

pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

type HmacSha256 = Hmac<Sha256>;

/// HMAC signature generator for webhook authentication
#[derive(Clone)]
pub struct SignatureGenerator {
    secret: String,
}

impl SignatureGenerator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length, so this never fails
        match HmacSha256::new_from_slice(self.secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC can take key of any size"),
        }
    }

    /// Hex HMAC-SHA256 of `"{timestamp}.{body}"`.
    pub fn sign_payload(&self, timestamp: &str, body: &str) -> String {
        let mut mac = self.mac();
        mac.update(format!("{}.{}", timestamp, body).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn verify(&self, timestamp: &str, body: &str, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let mut mac = self.mac();
        mac.update(format!("{}.{}", timestamp, body).as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemEvent {
    /// Stock held at checkout; sent to `reserve_url`
    Reserved,
    /// Hold dropped on cancel; sent to `reserve_url`
    Released,
    /// Basket paid; sent to `webhook_url`
    Purchased,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemNotification {
    pub event: ItemEvent,
    pub tenant_id: String,
    pub basket_id: Uuid,
    pub user_id: String,
    pub item: BasketItem,
    pub timestamp: DateTime<Utc>,
}

impl ItemNotification {
    pub fn new(event: ItemEvent, basket: &Basket, item: &BasketItem) -> Self {
        Self {
            event,
            tenant_id: basket.tenant_id.clone(),
            basket_id: basket.id,
            user_id: basket.user_id.clone(),
            item: item.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Target URL for this event, if the item declares one.
    pub fn target(&self) -> Option<&str> {
        match self.event {
            ItemEvent::Reserved | ItemEvent::Released => self.item.reserve_url.as_deref(),
            ItemEvent::Purchased => self.item.webhook_url.as_deref(),
        }
    }
}

/// Delivers item notifications without blocking the caller.
pub trait ItemNotifier: Send + Sync {
    fn dispatch(&self, notification: ItemNotification);
}

/// Sends one notification per item that has a target for `event`.
pub fn notify_items(notifier: &dyn ItemNotifier, event: ItemEvent, basket: &Basket) {
    for item in basket.items.values() {
        let notification = ItemNotification::new(event, basket, item);
        if notification.target().is_some() {
            notifier.dispatch(notification);
        }
    }
}

/// Webhook delivery with retries and exponential backoff, run on spawned tasks.
#[derive(Clone)]
pub struct HttpItemNotifier {
    client: reqwest::Client,
    signature_generator: Option<Arc<SignatureGenerator>>,
    max_retries: u32,
    base_backoff: Duration,
}

impl HttpItemNotifier {
    pub fn new(
        webhook_secret: Option<String>,
        max_retries: u32,
        timeout_secs: u64,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            signature_generator: webhook_secret.map(|s| Arc::new(SignatureGenerator::new(s))),
            max_retries: max_retries.max(1),
            base_backoff: Duration::from_secs(1),
        })
    }

    pub fn with_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    /// Posts the notification, retrying until it is accepted or retries run out.
    #[instrument(skip(self, notification), fields(event = %notification.event, basket_id = %notification.basket_id))]
    pub async fn deliver(&self, notification: &ItemNotification) -> Result<(), ServiceError> {
        let Some(url) = notification.target() else {
            return Ok(());
        };
        let body = serde_json::to_string(notification)?;
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self
            .signature_generator
            .as_ref()
            .map(|gen| gen.sign_payload(&timestamp, &body));

        for attempt in 1..=self.max_retries {
            let mut request = self
                .client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .header(TIMESTAMP_HEADER, &timestamp)
                .body(body.clone());
            if let Some(sig) = &signature {
                request = request.header(SIGNATURE_HEADER, sig);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    info!(url, "item notification delivered");
                    return Ok(());
                }
                Ok(response) => warn!(
                    url,
                    status = %response.status(),
                    "item notification rejected (attempt {}/{})",
                    attempt,
                    self.max_retries
                ),
                Err(e) => warn!(
                    url,
                    "item notification failed: {} (attempt {}/{})",
                    e,
                    attempt,
                    self.max_retries
                ),
            }

            if attempt < self.max_retries {
                tokio::time::sleep(backoff_delay(self.base_backoff, attempt)).await;
            }
        }

        Err(ServiceError::ExternalServiceError(format!(
            "Failed to deliver item notification to {} after {} attempts",
            url, self.max_retries
        )))
    }
}

/// Upper bound on the wait between two delivery attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Exponential backoff after the given (1-based) failed attempt, capped at [`MAX_BACKOFF`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

impl ItemNotifier for HttpItemNotifier {
    fn dispatch(&self, notification: ItemNotification) {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.deliver(&notification).await {
                error!(error = %e, item_id = %notification.item.id, "dropping item notification");
            }
        });
    }
}
