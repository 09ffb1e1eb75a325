//! Stock availability policies.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Clock, RandomSource};
use domain::Order;

use crate::error::StageError;
use crate::order_fulfillment::LatencyProfile;

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable,
}

/// Decides whether an order's items can be reserved.
#[async_trait]
pub trait AvailabilityPolicy: Send + Sync {
    /// Reserves every item of the order, or none of them.
    async fn reserve(&self, order: &Order) -> Result<Availability, StageError>;

    /// Returns a reservation made for the order. Releasing an order that
    /// holds no reservation is a no-op.
    async fn release(&self, order: &Order) -> Result<(), StageError>;
}

/// Simulated stock check: waits `base + U[0, spread)` and approves 9 orders
/// in 10.
#[derive(Debug, Clone)]
pub struct ProbabilisticAvailability {
    random: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    latency: LatencyProfile,
}

impl ProbabilisticAvailability {
    pub fn new(random: Arc<dyn RandomSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            random,
            clock,
            latency: LatencyProfile::INVENTORY,
        }
    }

    pub fn with_latency(mut self, latency: LatencyProfile) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl AvailabilityPolicy for ProbabilisticAvailability {
    async fn reserve(&self, order: &Order) -> Result<Availability, StageError> {
        let delay = self.random.latency(self.latency.base, self.latency.spread);
        self.clock.sleep(delay).await;

        let availability = if self.random.chance(9, 10) {
            Availability::Available
        } else {
            Availability::Unavailable
        };
        tracing::debug!(
            order_id = %order.order_id,
            ?availability,
            delay_ms = delay.as_millis() as u64,
            "inventory check finished"
        );
        Ok(availability)
    }

    async fn release(&self, order: &Order) -> Result<(), StageError> {
        tracing::info!(order_id = %order.order_id, "inventory released");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    /// Units on hand per product. Products without an entry are unlimited.
    stock: HashMap<String, u32>,
    reservations: HashMap<String, BTreeMap<String, u32>>,
    released: Vec<String>,
    reserve_calls: usize,
    fail_on_reserve: bool,
    fail_on_release: bool,
}

/// In-memory stock ledger for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the units on hand for a product.
    pub fn set_stock(&self, product_id: &str, units: u32) {
        self.state
            .write()
            .unwrap()
            .stock
            .insert(product_id.to_string(), units);
    }

    pub fn stock(&self, product_id: &str) -> Option<u32> {
        self.state.read().unwrap().stock.get(product_id).copied()
    }

    /// Makes reserve calls fail with a transient error.
    pub fn set_fail_on_reserve(&self, fail: bool) {
        self.state.write().unwrap().fail_on_reserve = fail;
    }

    pub fn set_fail_on_release(&self, fail: bool) {
        self.state.write().unwrap().fail_on_release = fail;
    }

    pub fn has_reservation(&self, order_id: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .reservations
            .contains_key(order_id)
    }

    pub fn reservation_count(&self) -> usize {
        self.state.read().unwrap().reservations.len()
    }

    /// Order ids whose reservation was released, in release order.
    pub fn released(&self) -> Vec<String> {
        self.state.read().unwrap().released.clone()
    }

    pub fn reserve_calls(&self) -> usize {
        self.state.read().unwrap().reserve_calls
    }
}

#[async_trait]
impl AvailabilityPolicy for InMemoryInventory {
    async fn reserve(&self, order: &Order) -> Result<Availability, StageError> {
        let mut state = self.state.write().unwrap();
        state.reserve_calls += 1;

        if state.fail_on_reserve {
            return Err(StageError::Inventory("Inventory service unavailable".into()));
        }

        let order_id = order.order_id.to_string();
        if state.reservations.contains_key(&order_id) {
            return Ok(Availability::Available);
        }

        let wanted = order.quantities_by_product();
        let short = wanted.iter().any(|(product, quantity)| {
            state
                .stock
                .get(product)
                .is_some_and(|on_hand| on_hand < quantity)
        });
        if short {
            return Ok(Availability::Unavailable);
        }

        for (product, quantity) in &wanted {
            if let Some(on_hand) = state.stock.get_mut(product) {
                *on_hand -= quantity;
            }
        }
        state.reservations.insert(order_id, wanted);
        Ok(Availability::Available)
    }

    async fn release(&self, order: &Order) -> Result<(), StageError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_release {
            return Err(StageError::Inventory("Release rejected".into()));
        }

        let order_id = order.order_id.to_string();
        if let Some(reserved) = state.reservations.remove(&order_id) {
            for (product, quantity) in reserved {
                if let Some(on_hand) = state.stock.get_mut(&product) {
                    *on_hand += quantity;
                }
            }
            state.released.push(order_id);
        }
        Ok(())
    }
}
