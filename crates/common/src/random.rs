//! Pseudo-random source shared by the simulated collaborators.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Thread-safe source of uniformly distributed integers.
///
/// Simulated latency, approval odds and retry jitter all draw from an
/// injected source so a run can be reproduced from a seed.
pub trait RandomSource: Send + Sync + std::fmt::Debug {
    /// Returns a value in `0..bound`. A `bound` of zero yields zero.
    fn next_below(&self, bound: u32) -> u32;

    /// Returns true with probability `numerator / denominator`.
    fn chance(&self, numerator: u32, denominator: u32) -> bool {
        self.next_below(denominator) < numerator
    }

    /// Returns `base + U[0, spread)`.
    fn latency(&self, base: Duration, spread: Duration) -> Duration {
        let spread_ms = u32::try_from(spread.as_millis()).unwrap_or(u32::MAX);
        base + Duration::from_millis(u64::from(self.next_below(spread_ms)))
    }
}

/// [`RandomSource`] backed by a seedable `StdRng`.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Seeds from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_below(&self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.random_range(0..bound),
            Err(poisoned) => poisoned.into_inner().random_range(0..bound),
        }
    }
}

/// Replays a fixed script of values, then repeats `fallback`.
///
/// Each scripted value is reduced modulo the requested bound.
#[derive(Debug)]
pub struct ScriptedRandom {
    values: Mutex<VecDeque<u32>>,
    fallback: u32,
}

impl ScriptedRandom {
    pub fn new(values: impl IntoIterator<Item = u32>, fallback: u32) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
            fallback,
        }
    }

    /// Always returns `value` (modulo the bound).
    pub fn constant(value: u32) -> Self {
        Self::new([], value)
    }
}

impl RandomSource for ScriptedRandom {
    fn next_below(&self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        let next = self
            .values
            .lock()
            .ok()
            .and_then(|mut values| values.pop_front())
            .unwrap_or(self.fallback);
        next % bound
    }
}
