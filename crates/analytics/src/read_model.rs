//! Query access to aggregation state.

/// A view whose current state can be queried while it is being updated.
pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of keys currently held. Returns 0 while the state is locked
    /// for writing.
    fn count(&self) -> usize;
}
