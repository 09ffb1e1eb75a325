//! Shared primitives for the order fulfillment workspace.
//!
//! - [`OrderId`], the partition key of every order-related message
//! - [`Clock`] and its wall-clock and virtual implementations
//! - [`RandomSource`] for reproducible simulation

pub mod clock;
pub mod random;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use random::{RandomSource, ScriptedRandom, SeededRandom};
pub use types::OrderId;
