// Retention - bounded, ordered timeline of ticks with live artifacts
use crate::domain::tick::{ArtifactKind, TickKey};
use crate::infrastructure::artifact_store::ArtifactStore;
use std::collections::{BTreeSet, VecDeque};

pub const DEFAULT_CAPACITY: usize = 18;

/// Ticks whose frames are currently kept, oldest at the head.
#[derive(Debug, Clone)]
pub struct Timeline {
    keys: VecDeque<TickKey>,
    capacity: usize,
}

impl Timeline {
    pub fn new(capacity: usize) -> Self {
        Self {
            keys: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
        }
    }

    /// Re-derive the timeline from the frames on storage, evicting anything
    /// beyond capacity and removing raw/activity files that no tracked
    /// frame owns.
    pub fn rebuild(store: &ArtifactStore, capacity: usize) -> anyhow::Result<Self> {
        let mut timeline = Self::new(capacity);
        timeline.keys.extend(store.list_keys(ArtifactKind::Frame)?);
        let overflow = timeline.pop_overflow();
        Self::discard(store, &overflow);

        let tracked: BTreeSet<TickKey> = timeline.keys.iter().copied().collect();
        let mut orphans = BTreeSet::new();
        for kind in [ArtifactKind::RawData, ArtifactKind::Activity] {
            orphans.extend(
                store
                    .list_keys(kind)?
                    .into_iter()
                    .filter(|key| !tracked.contains(key)),
            );
        }
        for key in &orphans {
            store.delete_tick(*key);
        }

        tracing::info!(
            "Rebuilt timeline with {} ticks ({} orphaned ticks pruned)",
            timeline.len(),
            orphans.len()
        );
        Ok(timeline)
    }

    /// Track a freshly rendered tick and drop the oldest ticks beyond
    /// capacity. Re-registering a key that is already tracked does not
    /// duplicate it. Returns the dropped keys; their artifacts are still on
    /// storage until passed to [`Timeline::discard`].
    pub fn register(&mut self, key: TickKey) -> Vec<TickKey> {
        if let Err(pos) = self.keys.binary_search(&key) {
            self.keys.insert(pos, key);
        }
        self.pop_overflow()
    }

    /// Delete every artifact of the given ticks. Returns how many files were
    /// removed.
    pub fn discard(store: &ArtifactStore, keys: &[TickKey]) -> usize {
        keys.iter()
            .map(|key| {
                let removed = store.delete_tick(*key);
                tracing::debug!("Evicted tick {} ({} artifacts removed)", key, removed);
                removed
            })
            .sum()
    }

    fn pop_overflow(&mut self) -> Vec<TickKey> {
        let excess = self.keys.len().saturating_sub(self.capacity);
        self.keys.drain(..excess).collect()
    }

    pub fn keys(&self) -> Vec<TickKey> {
        self.keys.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<TickKey> {
        self.keys.back().copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}
