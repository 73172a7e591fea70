//! Named locks serializing runs that write the same artifact.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

/// One async mutex per artifact name.
///
/// Entries nobody holds or waits on are pruned on the next acquire.
#[derive(Debug, Default)]
pub struct ArtifactLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held for as long as a run owns its artifact name.
#[derive(Debug)]
pub struct ArtifactGuard {
    name: String,
    _guard: OwnedMutexGuard<()>,
}

impl ArtifactGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ArtifactLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other run holds `name`, then take it.
    pub async fn acquire(&self, name: &str) -> ArtifactGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(name.to_string()).or_default())
        };

        ArtifactGuard {
            name: name.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of names currently tracked.
    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_name_is_exclusive() {
        let locks = Arc::new(ArtifactLocks::new());
        let first = locks.acquire("patient_records").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire("patient_records").await.name().to_string() })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        assert_eq!(waiter.await.unwrap(), "patient_records");
    }

    #[tokio::test]
    async fn test_distinct_names_do_not_block() {
        let locks = ArtifactLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_secs(1), locks.acquire("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = ArtifactLocks::new();
        drop(locks.acquire("a").await);
        drop(locks.acquire("b").await);
        let _c = locks.acquire("c").await;
        assert_eq!(locks.tracked(), 1);
    }
}
