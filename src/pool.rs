//! Bounded fan-out of transfers over scoped OS threads.
//!
//! Tasks are claimed through an atomic cursor and every task owns one result
//! slot, written exactly once, so workers never contend on a shared collection.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crate::domain::Descriptor;
use crate::transfer::{self, Fetcher, Outcome};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub label: &'static str,
    pub failed: bool,
    pub target: String,
}

pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

/// Sink that drops every event.
pub struct Silent;

impl ProgressSink for Silent {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId(pub usize);

pub struct TransferPool<'a, F: Fetcher + ?Sized> {
    fetcher: &'a F,
    concurrency: usize,
    tasks: Vec<Descriptor>,
}

impl<'a, F: Fetcher + ?Sized> TransferPool<'a, F> {
    /// `concurrency` below 1 is treated as 1.
    pub fn new(fetcher: &'a F, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
            tasks: Vec::new(),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn submit(&mut self, descriptor: Descriptor) -> TaskId {
        self.tasks.push(descriptor);
        TaskId(self.tasks.len() - 1)
    }

    /// Runs every submitted task and blocks until all have an outcome.
    /// Outcomes are indexed by `TaskId`.
    pub fn join(self, sink: &dyn ProgressSink) -> Vec<Outcome> {
        let total = self.tasks.len();
        if total == 0 {
            return Vec::new();
        }
        let slots = (0..total).map(|_| OnceLock::new()).collect::<Vec<_>>();
        let cursor = AtomicUsize::new(0);
        let completed = AtomicUsize::new(0);
        let workers = self.concurrency.min(total);
        let tasks = &self.tasks;
        let fetcher = self.fetcher;

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let idx = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(descriptor) = tasks.get(idx) else {
                            break;
                        };
                        let outcome = transfer::fetch(fetcher, descriptor);
                        let event = ProgressEvent {
                            completed: completed.fetch_add(1, Ordering::Relaxed) + 1,
                            total,
                            label: outcome.label(),
                            failed: outcome.is_failed(),
                            target: descriptor.target_path.to_string(),
                        };
                        let _ = slots[idx].set(outcome);
                        sink.event(event);
                    }
                });
            }
        });

        slots
            .into_iter()
            .zip(tasks)
            .map(|(slot, descriptor)| {
                slot.into_inner().unwrap_or_else(|| Outcome::Failed {
                    source_url: descriptor.source_url.clone(),
                    cause: "worker exited before completing the transfer".to_string(),
                })
            })
            .collect()
    }
}

pub fn run_all<F: Fetcher + ?Sized>(
    fetcher: &F,
    descriptors: Vec<Descriptor>,
    concurrency: usize,
    sink: &dyn ProgressSink,
) -> Vec<Outcome> {
    let mut pool = TransferPool::new(fetcher, concurrency);
    for descriptor in descriptors {
        pool.submit(descriptor);
    }
    pool.join(sink)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::error::SyncError;

    struct Refusing;

    impl Fetcher for Refusing {
        fn fetch_into(&self, url: &str, _sink: &mut dyn Write) -> Result<u64, SyncError> {
            Err(SyncError::Transfer(format!("refused {url}")))
        }
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let pool = TransferPool::new(&Refusing, 0);
        assert_eq!(pool.concurrency(), 1);
    }

    #[test]
    fn empty_pool_joins_immediately() {
        let pool = TransferPool::new(&Refusing, 4);
        assert!(pool.join(&Silent).is_empty());
    }

    #[test]
    fn outcomes_follow_submission_order() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let mut pool = TransferPool::new(&Refusing, 3);
        let ids = (0..5)
            .map(|idx| {
                pool.submit(Descriptor {
                    source_url: format!("https://host/{idx}"),
                    target_path: dir.join(format!("{idx}.gz")),
                    domain: "viral".to_string(),
                })
            })
            .collect::<Vec<_>>();
        assert_eq!(ids[4], TaskId(4));
        let outcomes = pool.join(&Silent);
        for (idx, outcome) in outcomes.iter().enumerate() {
            match outcome {
                Outcome::Failed { source_url, .. } => {
                    assert_eq!(source_url, &format!("https://host/{idx}"))
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }
    }
}
