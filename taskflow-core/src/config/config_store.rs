//! Versioned, shared settings with change notification.
//!
//! Long-running processors hold a [`ConfigStore`] for reading and a
//! [`ConfigWatcher`] they can `select!` on, so a SIGHUP reload reaches them
//! without a restart.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, RwLockReadGuard, watch};

pub struct ConfigStore<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    value: RwLock<T>,
    version: AtomicU64,
    notify: watch::Sender<u64>,
}

/// Wakes up when the owning [`ConfigStore`] is replaced.
pub struct ConfigWatcher {
    version_rx: watch::Receiver<u64>,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                value: RwLock::new(initial),
                version: AtomicU64::new(0),
                notify,
            }),
        }
    }

    /// Swap in `value` and wake every watcher.
    pub async fn update(&self, value: T) {
        let version = {
            let mut guard = self.inner.value.write().await;
            *guard = value;
            self.inner.version.fetch_add(1, Ordering::Relaxed) + 1
        };
        // send_replace never fails, even with no receivers left
        self.inner.notify.send_replace(version);
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.value.read().await
    }

    /// Number of updates applied since construction.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> ConfigWatcher {
        ConfigWatcher {
            version_rx: self.inner.notify.subscribe(),
        }
    }
}

impl<T: Clone> ConfigStore<T> {
    /// Owned copy of the current value.
    pub async fn snapshot(&self) -> T {
        self.inner.value.read().await.clone()
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ConfigWatcher {
    /// Resolves on the next update; `Err` once the store is gone.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.version_rx.changed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn watcher_sees_updates() {
        let store = ConfigStore::new(1u32);
        let mut watcher = store.subscribe();

        store.update(2).await;
        tokio::time::timeout(Duration::from_secs(1), watcher.changed())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(*store.read().await, 2);
        assert_eq!(store.snapshot().await, 2);
        assert_eq!(store.version(), 1);
    }

    #[tokio::test]
    async fn watcher_errors_when_store_dropped() {
        let store = ConfigStore::new(());
        let mut watcher = store.subscribe();
        drop(store);
        assert!(watcher.changed().await.is_err());
    }
}
