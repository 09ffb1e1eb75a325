use serde::{Deserialize, Serialize};

pub const DEFAULT_PAYMENT_METHOD: &str = "CREDIT_CARD";

/// Payment-specific status, tracked separately from the order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Authorized,
    Captured,
    Declined,
    Refunded,
    PartiallyRefunded,
    Failed,
}

/// How the customer pays and what became of the charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub payment_method: String,

    /// Assigned only on successful capture.
    #[serde(default)]
    pub transaction_id: Option<String>,

    #[serde(default)]
    pub payment_status: PaymentStatus,

    #[serde(default)]
    pub card_last_four: Option<String>,

    #[serde(default)]
    pub payment_processor: Option<String>,
}

impl PaymentInfo {
    pub fn new(payment_method: impl Into<String>) -> Self {
        Self {
            payment_method: payment_method.into(),
            transaction_id: None,
            payment_status: PaymentStatus::Pending,
            card_last_four: None,
            payment_processor: None,
        }
    }

    /// Records a successful capture.
    pub fn capture(&mut self, transaction_id: impl Into<String>) {
        self.transaction_id = Some(transaction_id.into());
        self.payment_status = PaymentStatus::Captured;
    }

    pub fn decline(&mut self) {
        self.payment_status = PaymentStatus::Declined;
    }
}

impl Default for PaymentInfo {
    fn default() -> Self {
        Self::new(DEFAULT_PAYMENT_METHOD)
    }
}
