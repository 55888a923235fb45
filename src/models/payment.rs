use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{sea_query::StringLen, DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::money::Currency;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "INIT")]
    Init,
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "FAILED")]
    Failed,
    #[sea_orm(string_value = "SUCCESS")]
    Success,
    #[sea_orm(string_value = "REFUNDED")]
    Refunded,
}

impl PaymentStatus {
    /// Only open payments and attempts may be started or polled.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Init | Self::Pending)
    }
}

/// One gateway-side transaction of a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: String,
    pub gateway: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub status: PaymentStatus,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub wallet_id: Option<String>,
    pub basket_id: Option<Uuid>,
    pub amount: Decimal,
    pub original_amount: Decimal,
    pub currency: Currency,
    pub description: String,
    pub callback_url: String,
    pub status: PaymentStatus,
    pub tries: BTreeMap<String, PaymentAttempt>,
    pub verified_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    /// Seconds after creation during which the payment may be started
    pub duration_secs: i64,
    pub available_gateways: Vec<String>,
    pub accept_wallet: bool,
    pub voucher_code: Option<String>,
    /// Accounting proposal that moved the funds; set at most once
    pub proposal_id: Option<String>,
    pub meta_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl Payment {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// End of the start window; `None` when it lies beyond the representable range.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        Duration::try_seconds(self.duration_secs)
            .and_then(|window| self.created_at.checked_add_signed(window))
    }

    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.deadline().map_or(false, |deadline| deadline < now)
    }

    pub fn is_overdue(&self) -> bool {
        self.is_overdue_at(Utc::now())
    }

    /// Promotes the payment to SUCCESS. Returns false if it already was.
    pub fn mark_success(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == PaymentStatus::Success {
            return false;
        }
        self.status = PaymentStatus::Success;
        self.verified_at = Some(now);
        self.failure_reason = None;
        self.updated_at = now;
        true
    }

    /// Marks the payment FAILED unless it already succeeded.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> bool {
        if self.status == PaymentStatus::Success {
            return false;
        }
        self.status = PaymentStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.updated_at = Utc::now();
        true
    }

    /// Records a successful attempt; the first success promotes the payment.
    pub fn succeed_attempt(&mut self, attempt_id: &str, now: DateTime<Utc>) -> bool {
        if let Some(attempt) = self.tries.get_mut(attempt_id) {
            attempt.status = PaymentStatus::Success;
            attempt.verified_at = Some(now);
        }
        self.mark_success(now)
    }

    /// Records a failed attempt; the payment fails only once its window has passed.
    pub fn fail_attempt(&mut self, attempt_id: &str, reason: Option<String>, now: DateTime<Utc>) {
        if let Some(attempt) = self.tries.get_mut(attempt_id) {
            attempt.status = PaymentStatus::Failed;
            attempt.failure_reason = reason.clone();
            attempt.verified_at = Some(now);
        }
        if self.is_overdue_at(now) {
            self.mark_failed(reason.unwrap_or_else(|| "Payment is overdue".to_string()));
        }
        self.updated_at = now;
    }

    pub fn open_attempts(&self) -> impl Iterator<Item = &PaymentAttempt> {
        self.tries.values().filter(|attempt| attempt.status.is_open())
    }
}
