//! Per-character serialisation of interaction processing.
//!
//! At most one interaction per character is between PROCESSING and its
//! terminal state at any time. Waiters are served in arrival order because
//! tokio's mutex is fair. Different characters never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type Registry = StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>;

#[derive(Default)]
pub struct CharacterLocks {
    registry: Arc<Registry>,
}

/// Exclusive right to process one character. Released on drop.
pub struct CharacterLease {
    character_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Arc<Registry>,
}

fn lock_registry(registry: &Registry) -> StdMutexGuard<'_, HashMap<Uuid, Arc<Mutex<()>>>> {
    // The map is only ever left consistent, so a poisoned lock is still usable.
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CharacterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, character_id: Uuid) -> CharacterLease {
        let slot = lock_registry(&self.registry)
            .entry(character_id)
            .or_default()
            .clone();
        let guard = slot.lock_owned().await;
        CharacterLease {
            character_id,
            guard: Some(guard),
            registry: self.registry.clone(),
        }
    }

    /// Characters with a holder or waiters.
    pub fn active(&self) -> usize {
        lock_registry(&self.registry).len()
    }
}

impl CharacterLease {
    pub fn character_id(&self) -> Uuid {
        self.character_id
    }
}

impl Drop for CharacterLease {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        let mut map = lock_registry(&self.registry);
        // One reference in the map, one held by the guard: nobody is waiting.
        if Arc::strong_count(OwnedMutexGuard::mutex(&guard)) <= 2 {
            map.remove(&self.character_id);
        }
        drop(guard);
    }
}
