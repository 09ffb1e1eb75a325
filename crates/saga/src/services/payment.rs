//! Payment gateways.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Clock, RandomSource};
use domain::{Money, Order};
use uuid::Uuid;

use crate::error::StageError;
use crate::order_fulfillment::LatencyProfile;

/// Outcome of a charge attempt that reached the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Approved { transaction_id: String },
    Declined { reason: String },
}

/// Charges customers for orders.
///
/// An `Err` means the gateway could not be reached and the charge may be
/// retried; a decline is a regular [`PaymentOutcome`].
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, order: &Order) -> Result<PaymentOutcome, StageError>;
}

/// `TXN-` followed by 32 uppercase hex digits.
pub fn new_transaction_id() -> String {
    format!("TXN-{}", Uuid::new_v4().simple().to_string().to_uppercase())
}

/// Simulated card processor: waits `base + U[0, spread)` and approves 9
/// charges in 10.
#[derive(Debug, Clone)]
pub struct SimulatedPaymentGateway {
    random: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    latency: LatencyProfile,
}

impl SimulatedPaymentGateway {
    pub fn new(random: Arc<dyn RandomSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            random,
            clock,
            latency: LatencyProfile::PAYMENT,
        }
    }

    pub fn with_latency(mut self, latency: LatencyProfile) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn charge(&self, order: &Order) -> Result<PaymentOutcome, StageError> {
        let delay = self.random.latency(self.latency.base, self.latency.spread);
        self.clock.sleep(delay).await;

        if self.random.chance(9, 10) {
            Ok(PaymentOutcome::Approved {
                transaction_id: new_transaction_id(),
            })
        } else {
            tracing::debug!(order_id = %order.order_id, "simulated decline");
            Ok(PaymentOutcome::Declined {
                reason: "Payment declined by processor".to_string(),
            })
        }
    }
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    charges: HashMap<String, (String, Money)>,
    attempts: usize,
    decline_all: bool,
    fail_remaining: u32,
}

/// In-memory gateway for testing. Approves everything unless told otherwise.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_decline_all(&self, decline: bool) {
        self.state.write().unwrap().decline_all = decline;
    }

    /// Makes the next `times` charge calls fail as if the gateway were down.
    pub fn fail_next(&self, times: u32) {
        self.state.write().unwrap().fail_remaining = times;
    }

    /// Number of successful charges.
    pub fn charge_count(&self) -> usize {
        self.state.read().unwrap().charges.len()
    }

    /// Every call to `charge`, including failed and declined ones.
    pub fn attempts(&self) -> usize {
        self.state.read().unwrap().attempts
    }

    pub fn charged_amount(&self, order_id: &str) -> Option<Money> {
        self.state
            .read()
            .unwrap()
            .charges
            .get(order_id)
            .map(|(_, amount)| *amount)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn charge(&self, order: &Order) -> Result<PaymentOutcome, StageError> {
        let mut state = self.state.write().unwrap();
        state.attempts += 1;

        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(StageError::Payment("Gateway timeout".to_string()));
        }
        if state.decline_all {
            return Ok(PaymentOutcome::Declined {
                reason: "Card declined".to_string(),
            });
        }

        let transaction_id = new_transaction_id();
        state.charges.insert(
            order.order_id.to_string(),
            (transaction_id.clone(), order.total_amount),
        );
        Ok(PaymentOutcome::Approved { transaction_id })
    }
}
