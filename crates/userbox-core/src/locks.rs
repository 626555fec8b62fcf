//! Per-container single-flight locks
//!
//! Mutating operations on the same container are serialized; operations on
//! different containers never wait on each other.

use crate::identity::ContainerName;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

#[derive(Default)]
pub struct ContainerLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ContainerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `name`; released when the guard drops
    pub async fn acquire(&self, name: &ContainerName) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries only referenced by the map are idle
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(name.as_str().to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of containers currently locked or waited on
    pub fn active(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.values().filter(|lock| Arc::strong_count(lock) > 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NamingScheme;
    use std::time::Duration;

    fn name(n: i64) -> ContainerName {
        NamingScheme::default().container_name_for(n).unwrap()
    }

    #[tokio::test]
    async fn test_same_container_is_serialized() {
        let locks = Arc::new(ContainerLocks::new());
        let guard = locks.acquire(&name(1)).await;

        let locks2 = Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            let _guard = locks2.acquire(&name(1)).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_containers_do_not_block() {
        let locks = ContainerLocks::new();
        let _a = locks.acquire(&name(1)).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(&name(2))).await;
        assert!(b.is_ok());
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = ContainerLocks::new();
        for n in 1..=10 {
            let _guard = locks.acquire(&name(n)).await;
        }
        assert_eq!(locks.active(), 0);
        let _guard = locks.acquire(&name(1)).await;
        let map_len = locks.inner.lock().unwrap().len();
        assert_eq!(map_len, 1);
    }
}
