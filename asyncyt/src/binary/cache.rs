use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock};

use super::ResolvedBinary;

type Slot = Arc<OnceCell<ResolvedBinary>>;

/// Resolved executables of one `Downloader`.
///
/// Each name is populated at most once: concurrent resolutions of the same
/// name share a single initializer and all observe its result. A failed
/// initializer leaves the slot empty so the next caller retries. Entries are
/// only dropped by [`BinaryCache::invalidate`] / [`BinaryCache::clear`].
#[derive(Debug, Default)]
pub struct BinaryCache {
    slots: RwLock<HashMap<String, Slot>>
}

impl BinaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<ResolvedBinary> {
        let slots = self.slots.read().await;
        slots.get(name).and_then(|slot| slot.get().cloned())
    }

    pub async fn get_or_try_init<F, Fut, E>(&self, name: &str, init: F) -> Result<ResolvedBinary, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ResolvedBinary, E>>
    {
        let slot = self.slot(name).await;
        slot.get_or_try_init(init).await.cloned()
    }

    pub async fn invalidate(&self, name: &str) {
        self.slots.write().await.remove(name);
    }

    pub async fn clear(&self) {
        self.slots.write().await.clear();
    }

    async fn slot(&self, name: &str) -> Slot {
        if let Some(slot) = self.slots.read().await.get(name) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}
