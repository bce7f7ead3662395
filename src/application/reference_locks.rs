use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex, PoisonError, Weak},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Dead entries are first swept once the table grows past this many keys.
const PRUNE_THRESHOLD: usize = 1024;

/// In-process mutual exclusion keyed by an arbitrary value.
///
/// Each key maps to a weakly held async mutex, so a key's slot lives exactly as
/// long as someone holds or waits for its guard.
pub struct ReferenceLocks<K> {
    slots: Mutex<Slots<K>>,
}

struct Slots<K> {
    table: HashMap<K, Weak<AsyncMutex<()>>>,
    /// Table size that triggers the next sweep; doubles with the live set.
    prune_at: usize,
}

impl<K: Eq + Hash + Clone> ReferenceLocks<K> {
    pub fn new() -> Self {
        Self::with_prune_threshold(PRUNE_THRESHOLD)
    }

    fn with_prune_threshold(threshold: usize) -> Self {
        Self {
            slots: Mutex::new(Slots {
                table: HashMap::new(),
                prune_at: threshold,
            }),
        }
    }

    /// Wait until no other task holds the lock for `key`.
    pub async fn acquire(&self, key: &K) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.table.len() >= slots.prune_at {
                slots.table.retain(|_, weak| weak.strong_count() > 0);
                slots.prune_at = slots.prune_at.max(slots.table.len() * 2);
            }
            match slots.table.get(key).and_then(Weak::upgrade) {
                Some(slot) => slot,
                None => {
                    let slot = Arc::new(AsyncMutex::new(()));
                    slots.table.insert(key.clone(), Arc::downgrade(&slot));
                    slot
                }
            }
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    fn active_keys(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .table
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    #[cfg(test)]
    fn table_len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .table
            .len()
    }
}

impl<K: Eq + Hash + Clone> Default for ReferenceLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
