//! Holder of the published snapshot.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::types::ProjectSnapshot;

/// Publication counter carried on the store's watch channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Revision {
    /// Number of publications so far
    pub number: u64,
    /// Highest refresh request answered by a publication
    pub served: u64,
}

/// The one place a snapshot is published.
///
/// Readers take the read lock only long enough to clone an [`Arc`]; the
/// writer swaps in a fully built snapshot, so nobody observes a partial one.
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Option<Arc<ProjectSnapshot>>>,
    revision: watch::Sender<Revision>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(Revision::default());
        Self {
            current: RwLock::new(None),
            revision,
        }
    }

    /// The latest snapshot, or `None` before the first publication.
    pub fn get(&self) -> Option<Arc<ProjectSnapshot>> {
        self.current.read().clone()
    }

    /// Replaces the snapshot and returns the new revision number.
    ///
    /// `served` is the highest refresh request the snapshot answers, zero
    /// for a periodic refresh.
    pub fn publish(&self, snapshot: ProjectSnapshot, served: u64) -> u64 {
        let snapshot = Arc::new(snapshot);
        *self.current.write() = Some(snapshot);

        let mut number = 0;
        self.revision.send_modify(|revision| {
            revision.number += 1;
            revision.served = revision.served.max(served);
            number = revision.number;
        });
        number
    }

    pub fn revision(&self) -> Revision {
        *self.revision.borrow()
    }

    /// Receiver that changes on every publication.
    pub fn subscribe(&self) -> watch::Receiver<Revision> {
        self.revision.subscribe()
    }

    /// Waits up to `limit` for the first publication satisfying `ready`.
    async fn wait_until(
        &self,
        limit: Duration,
        ready: impl FnMut(&Revision) -> bool,
    ) -> Option<Arc<ProjectSnapshot>> {
        let mut revisions = self.revision.subscribe();
        match tokio::time::timeout(limit, revisions.wait_for(ready)).await {
            Ok(Ok(_)) => self.get(),
            _ => None,
        }
    }

    /// Waits for a publication newer than revision number `after`.
    pub async fn wait_past(&self, after: u64, limit: Duration) -> Option<Arc<ProjectSnapshot>> {
        self.wait_until(limit, |r| r.number > after).await
    }

    /// Waits for a publication that answers refresh request `request`.
    pub async fn wait_served(&self, request: u64, limit: Duration) -> Option<Arc<ProjectSnapshot>> {
        self.wait_until(limit, |r| r.served >= request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BuildStatus, GitStatus, Health, ProjectStructure};
    use chrono::Utc;

    fn snapshot(primary: &str) -> ProjectSnapshot {
        ProjectSnapshot {
            timestamp: Utc::now(),
            structure: ProjectStructure::default(),
            recent_changes: Vec::new(),
            git_status: GitStatus::default(),
            active_errors: Vec::new(),
            build_status: BuildStatus::default(),
            running_processes: Vec::new(),
            dependencies: Vec::new(),
            services: Vec::new(),
            languages: Vec::new(),
            primary_language: primary.to_string(),
            todos: Vec::new(),
            health: Health::default(),
        }
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let store = SnapshotStore::new();
        assert!(store.get().is_none());
        assert_eq!(store.revision(), Revision::default());

        assert_eq!(store.publish(snapshot("python"), 3), 1);
        let first = store.get().unwrap();
        assert_eq!(store.publish(snapshot("go"), 0), 2);
        assert_eq!(store.revision(), Revision { number: 2, served: 3 });

        // Earlier readers keep the snapshot they cloned
        assert_eq!(first.primary_language, "python");
        assert_eq!(store.get().unwrap().primary_language, "go");
    }

    #[tokio::test]
    async fn test_wait_for_publication() {
        let store = Arc::new(SnapshotStore::new());
        assert!(store.wait_past(0, Duration::from_millis(20)).await.is_none());

        let writer = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.publish(snapshot("python"), 0);
            writer.publish(snapshot("rust"), 1);
        });
        let published = store.wait_served(1, Duration::from_secs(5)).await.unwrap();
        assert_eq!(published.primary_language, "rust");
        assert!(store.wait_past(1, Duration::from_millis(20)).await.is_some());
    }
}
