//! Collaborators the stages call out to, with simulated and in-memory
//! implementations.

pub mod inventory;
pub mod notification;
pub mod payment;

pub use inventory::{Availability, AvailabilityPolicy, InMemoryInventory, ProbabilisticAvailability};
pub use notification::{InMemoryChannel, NotificationChannel, SimulatedChannel};
pub use payment::{
    InMemoryPaymentGateway, PaymentGateway, PaymentOutcome, SimulatedPaymentGateway,
    new_transaction_id,
};
