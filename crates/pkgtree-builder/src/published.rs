//! Hand-off list of newly discovered references.

use parking_lot::Mutex;
use pkgtree_core::Reference;

#[derive(Default)]
struct Published {
    generation: u64,
    references: Vec<Reference>,
}

/// Append-only list of discovered references, drained by the front end.
///
/// Each worker publishes its whole batch under one lock, so a batch is
/// never interleaved with another worker's, while batches from different
/// workers may land in any order.
#[derive(Default)]
pub struct EnumeratedReferences {
    inner: Mutex<Published>,
}

impl EnumeratedReferences {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch discovered under `generation`.
    ///
    /// Returns `false` and drops the batch if a reload has started a newer
    /// generation since.
    pub fn publish(&self, generation: u64, batch: impl IntoIterator<Item = Reference>) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        inner.references.extend(batch);
        true
    }

    /// Take every reference published since the last drain.
    pub fn drain(&self) -> Vec<Reference> {
        std::mem::take(&mut self.inner.lock().references)
    }

    /// Number of references waiting to be drained.
    pub fn len(&self) -> usize {
        self.inner.lock().references.len()
    }

    /// Check if nothing is waiting to be drained.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().references.is_empty()
    }

    /// Discard everything and accept batches for `generation` only.
    pub fn reset(&self, generation: u64) {
        let mut inner = self.inner.lock();
        inner.generation = generation;
        inner.references.clear();
    }
}
