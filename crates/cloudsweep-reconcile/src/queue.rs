//! Thread-safe multiset of resource names with a "finished populating" latch
//!
//! A queue has exactly one producer (which adds names and eventually latches
//! it) and exactly one consumer (which snapshots, removes and waits). Both
//! wake-up channels use stored permits, so a change that happens between the
//! consumer's last look and its next wait is never lost; the consumer simply
//! sees an extra, harmless wake-up at worst.

use crate::error::QueueError;
use crate::name::ResourceName;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Status {
    Populating,
    Finished,
    Failed(String),
}

#[derive(Debug)]
struct QueueState {
    /// name -> number of occurrences
    names: HashMap<ResourceName, usize>,
    /// total occurrences across all names
    len: usize,
    status: Status,
}

/// Unbounded (or optionally bounded) multiset of [`ResourceName`]s.
///
/// Duplicates are tolerated since listings may repeat a name across pages.
/// `finish_populating` and `fail` are one-way latches; once either is set
/// every further write is rejected.
#[derive(Debug)]
pub struct NamedResourceQueue {
    label: String,
    capacity: Option<usize>,
    state: Mutex<QueueState>,
    /// Wakes the consumer on additions, finish and failure
    changed: Notify,
    /// Wakes a producer blocked on capacity
    space: Notify,
    total_added: AtomicUsize,
}

impl NamedResourceQueue {
    /// Create an unbounded queue
    pub fn new(label: impl Into<String>) -> Self {
        Self::build(label.into(), None)
    }

    /// Create a queue holding at most `capacity` names (counting duplicates).
    ///
    /// Writers wait for the consumer to remove names once the queue is full.
    pub fn bounded(label: impl Into<String>, capacity: usize) -> Self {
        Self::build(label.into(), Some(capacity.max(1)))
    }

    fn build(label: String, capacity: Option<usize>) -> Self {
        Self {
            label,
            capacity,
            state: Mutex::new(QueueState {
                names: HashMap::new(),
                len: 0,
                status: Status::Populating,
            }),
            changed: Notify::new(),
            space: Notify::new(),
            total_added: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Insert a single name
    pub async fn add(&self, name: ResourceName) -> Result<(), QueueError> {
        self.add_all([name]).await
    }

    /// Insert every name and wake the consumer.
    ///
    /// In bounded mode this waits for space, inserting as much as fits each
    /// time the consumer frees room.
    pub async fn add_all<I>(&self, names: I) -> Result<(), QueueError>
    where
        I: IntoIterator<Item = ResourceName>,
    {
        let mut pending = names.into_iter().peekable();
        if pending.peek().is_none() {
            return self.ensure_writable();
        }

        loop {
            let inserted = {
                let mut state = self.lock();
                self.check_writable(&state)?;
                let mut inserted = 0usize;
                while self.capacity.is_none_or(|cap| state.len < cap) {
                    let Some(name) = pending.next() else { break };
                    *state.names.entry(name).or_insert(0) += 1;
                    state.len += 1;
                    inserted += 1;
                }
                inserted
            };

            if inserted > 0 {
                self.total_added.fetch_add(inserted, Ordering::Relaxed);
                self.changed.notify_one();
            }

            if pending.peek().is_none() {
                return Ok(());
            }

            self.space.notified().await;
        }
    }

    fn ensure_writable(&self) -> Result<(), QueueError> {
        let state = self.lock();
        self.check_writable(&state)
    }

    fn check_writable(&self, state: &QueueState) -> Result<(), QueueError> {
        match &state.status {
            Status::Populating => Ok(()),
            Status::Finished => Err(QueueError::Closed {
                queue: self.label.clone(),
            }),
            Status::Failed(reason) => Err(QueueError::Failed {
                queue: self.label.clone(),
                reason: reason.clone(),
            }),
        }
    }

    /// Point-in-time copy of the contents, duplicates included. Does not drain.
    pub fn get_all(&self) -> Vec<ResourceName> {
        let state = self.lock();
        state
            .names
            .iter()
            .flat_map(|(name, count)| std::iter::repeat_n(name.clone(), *count))
            .collect()
    }

    /// Remove every occurrence of each given name.
    ///
    /// Names not listed are never touched. Returns the number of occurrences
    /// removed.
    pub fn remove_all<'a, I>(&self, names: I) -> usize
    where
        I: IntoIterator<Item = &'a ResourceName>,
    {
        let removed = {
            let mut state = self.lock();
            let mut removed = 0usize;
            for name in names {
                if let Some(count) = state.names.remove(name) {
                    removed += count;
                }
            }
            state.len -= removed;
            removed
        };

        if removed > 0 {
            self.space.notify_one();
        }
        removed
    }

    /// Atomically take the whole contents (snapshot + removal)
    pub fn drain(&self) -> Vec<ResourceName> {
        let drained: Vec<ResourceName> = {
            let mut state = self.lock();
            state.len = 0;
            state
                .names
                .drain()
                .flat_map(|(name, count)| std::iter::repeat_n(name, count))
                .collect()
        };

        if !drained.is_empty() {
            self.space.notify_one();
        }
        drained
    }

    /// Latch the queue: the producer will add nothing more.
    ///
    /// Has no effect on a queue that already failed.
    pub fn finish_populating(&self) {
        let latched = {
            let mut state = self.lock();
            if state.status == Status::Populating {
                state.status = Status::Finished;
                true
            } else {
                false
            }
        };
        if latched {
            self.changed.notify_one();
        }
    }

    pub fn is_finished_populating(&self) -> bool {
        self.lock().status == Status::Finished
    }

    /// Mark the queue failed. A failed queue never reports finished.
    ///
    /// Returns false if the queue had already finished or failed.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let latched = {
            let mut state = self.lock();
            if state.status == Status::Populating {
                state.status = Status::Failed(reason.into());
                true
            } else {
                false
            }
        };
        if latched {
            self.changed.notify_one();
            self.space.notify_one();
        }
        latched
    }

    /// Failure reason, if the producer failed
    pub fn failure(&self) -> Option<String> {
        match &self.lock().status {
            Status::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Resolves on the next addition, finish or failure (or a stored one).
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    /// Wait up to `timeout` for a change.
    ///
    /// Returns true when woken, false on timeout. Either way the caller must
    /// re-check the queue state.
    pub async fn wait_new_message(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.changed()).await.is_ok()
    }

    /// Number of names currently held, duplicates included
    pub fn len(&self) -> usize {
        self.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of names ever accepted, duplicates included
    pub fn total_added(&self) -> usize {
        self.total_added.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn names(items: &[&str]) -> Vec<ResourceName> {
        items.iter().map(|s| ResourceName::from(*s)).collect()
    }

    fn sorted(mut v: Vec<ResourceName>) -> Vec<ResourceName> {
        v.sort();
        v
    }

    #[tokio::test]
    async fn test_add_and_snapshot_keeps_duplicates() {
        let queue = NamedResourceQueue::new("source");
        queue.add_all(names(&["a", "b", "a"])).await.unwrap();
        queue.add("c".into()).await.unwrap();

        assert_eq!(queue.len(), 4);
        assert_eq!(queue.total_added(), 4);
        assert_eq!(sorted(queue.get_all()), names(&["a", "a", "b", "c"]));
        // Snapshot does not drain
        assert_eq!(queue.len(), 4);
    }

    #[tokio::test]
    async fn test_remove_all_removes_every_occurrence() {
        let queue = NamedResourceQueue::new("source");
        queue.add_all(names(&["a", "b", "a", "c"])).await.unwrap();

        let removed = queue.remove_all(&names(&["a", "zzz"]));
        assert_eq!(removed, 2);
        assert_eq!(sorted(queue.get_all()), names(&["b", "c"]));
    }

    #[tokio::test]
    async fn test_drain_empties_queue() {
        let queue = NamedResourceQueue::new("common");
        queue.add_all(names(&["x", "y"])).await.unwrap();
        assert_eq!(sorted(queue.drain()), names(&["x", "y"]));
        assert!(queue.is_empty());
        assert_eq!(queue.total_added(), 2);
    }

    #[tokio::test]
    async fn test_finish_is_a_one_way_latch_that_rejects_writes() {
        let queue = NamedResourceQueue::new("target");
        queue.add("a".into()).await.unwrap();
        queue.finish_populating();
        assert!(queue.is_finished_populating());

        let err = queue.add("b".into()).await.unwrap_err();
        assert_eq!(
            err,
            QueueError::Closed {
                queue: "target".into()
            }
        );
        assert_eq!(queue.get_all(), names(&["a"]));

        // A later failure cannot undo the latch
        assert!(!queue.fail("too late"));
        assert!(queue.is_finished_populating());
        assert!(queue.failure().is_none());
    }

    #[tokio::test]
    async fn test_failed_queue_never_reports_finished() {
        let queue = NamedResourceQueue::new("source");
        assert!(queue.fail("AccessDenied"));
        queue.finish_populating();

        assert!(!queue.is_finished_populating());
        assert_eq!(queue.failure().as_deref(), Some("AccessDenied"));
        assert!(matches!(
            queue.add_all(names(&["a"])).await,
            Err(QueueError::Failed { .. })
        ));
        // An empty batch still reports the failure
        assert!(queue.add_all(Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_wait_new_message_times_out() {
        let queue = NamedResourceQueue::new("source");
        assert!(!queue.wait_new_message(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_change_before_wait_is_not_lost() {
        let queue = NamedResourceQueue::new("source");
        queue.add("a".into()).await.unwrap();
        // The permit stored by add_all makes this return immediately
        assert!(queue.wait_new_message(Duration::from_secs(5)).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_add_all_wakes_waiter() {
        let queue = Arc::new(NamedResourceQueue::new("source"));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.wait_new_message(Duration::from_secs(10)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.add_all(names(&["a"])).await.unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bounded_writer_waits_for_space() {
        let queue = Arc::new(NamedResourceQueue::bounded("common", 2));
        let writer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.add_all(names(&["a", "b", "c", "d"])).await })
        };

        // The writer can only fit two names at a time
        let mut seen = HashSet::new();
        while seen.len() < 4 {
            queue.changed().await;
            assert!(queue.len() <= 2);
            seen.extend(queue.drain());
        }

        writer.await.unwrap().unwrap();
        assert_eq!(queue.total_added(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fail_releases_blocked_writer() {
        let queue = Arc::new(NamedResourceQueue::bounded("common", 1));
        queue.add("a".into()).await.unwrap();

        let writer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.add("b".into()).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.fail("analyzer gone");
        let result = writer.await.unwrap();
        assert!(matches!(result, Err(QueueError::Failed { .. })));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use proptest::test_runner::TestCaseError;

        proptest! {
            /// Removing a snapshot never removes names added concurrently
            /// under names absent from that snapshot.
            #[test]
            fn remove_all_of_snapshot_spares_unseen_names(
                early in prop::collection::vec("[a-e]", 0..20),
                late_count in 1usize..50,
            ) {
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .enable_all()
                    .build()
                    .unwrap();

                rt.block_on(async {
                    let queue = Arc::new(NamedResourceQueue::new("source"));
                    queue
                        .add_all(early.iter().map(|s| ResourceName::from(s.as_str())))
                        .await
                        .unwrap();

                    let writer = {
                        let queue = queue.clone();
                        tokio::spawn(async move {
                            for i in 0..late_count {
                                queue.add(ResourceName::new(format!("late-{i}"))).await.unwrap();
                                tokio::task::yield_now().await;
                            }
                        })
                    };

                    let snapshot = queue.get_all();
                    queue.remove_all(&snapshot);
                    writer.await.unwrap();

                    let remaining: HashSet<_> = queue.get_all().into_iter().collect();
                    for i in 0..late_count {
                        let late = ResourceName::new(format!("late-{i}"));
                        if !snapshot.contains(&late) {
                            prop_assert!(remaining.contains(&late), "lost {late}");
                        }
                    }
                    Ok::<(), TestCaseError>(())
                })?;
            }

            /// `len` always matches the snapshot size
            #[test]
            fn len_matches_snapshot(
                adds in prop::collection::vec("[a-h]", 0..40),
                removes in prop::collection::vec("[a-h]", 0..10),
            ) {
                let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
                rt.block_on(async {
                    let queue = NamedResourceQueue::new("q");
                    queue.add_all(adds.iter().map(|s| ResourceName::from(s.as_str()))).await.unwrap();
                    let removes: Vec<ResourceName> = removes.iter().map(|s| ResourceName::from(s.as_str())).collect();
                    queue.remove_all(&removes);
                    prop_assert_eq!(queue.len(), queue.get_all().len());
                    for name in &removes {
                        prop_assert!(!queue.get_all().contains(name));
                    }
                    Ok::<(), TestCaseError>(())
                })?;
            }
        }
    }
}
