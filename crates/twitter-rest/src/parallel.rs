//! Ordered parallel map over independent operations.
//!
//! A single-element input runs inline on the caller's task. Larger inputs
//! spawn one tokio task per element, bounded by an optional semaphore, and
//! join the handles by index so `output[i]` always belongs to `input[i]`.
//! Nothing is cancelled: every spawned unit runs to completion before the
//! first error (in input order) is returned.
//!
//! A panic in a spawned unit comes back as a `JoinError` converted into `E`.
//! The inline single-element path is a direct call, so a panic there unwinds
//! into the caller as it would without the helper.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::debug;

/// A not-yet-executed parallel mapping over `items`.
///
/// Building one does nothing; [`map`](Self::map) and
/// [`flat_map`](Self::flat_map) run it and can be called any number of times.
#[derive(Debug, Clone)]
pub struct ParallelMap<T> {
    items: Vec<T>,
    limit: Option<usize>,
}

impl<T> ParallelMap<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().collect(),
            limit: None,
        }
    }

    /// Cap the number of units running at once. A limit of zero is treated
    /// as one.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit.max(1));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Run `op` over every item, returning results in input order.
    pub async fn map<R, E, F, Fut>(&self, op: F) -> Result<Vec<R>, E>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Send + 'static,
        E: From<JoinError> + Send + 'static,
    {
        match self.items.as_slice() {
            [] => Ok(Vec::new()),
            [only] => op(only.clone()).await.map(|r| vec![r]),
            items => {
                debug!(units = items.len(), limit = ?self.limit, "spawning parallel units");
                let op = Arc::new(op);
                let semaphore = self.limit.map(|n| Arc::new(Semaphore::new(n)));

                let handles = items.iter().cloned().map(|item| {
                    let op = Arc::clone(&op);
                    let semaphore = semaphore.clone();
                    tokio::spawn(async move {
                        let _permit = match semaphore {
                            Some(s) => s.acquire_owned().await.ok(),
                            None => None,
                        };
                        op(item).await
                    })
                });

                join_all(handles)
                    .await
                    .into_iter()
                    .map(|joined| joined.unwrap_or_else(|e| Err(E::from(e))))
                    .collect()
            }
        }
    }

    /// Like [`map`](Self::map), then concatenate one level of nesting.
    pub async fn flat_map<R, E, F, Fut>(&self, op: F) -> Result<Vec<R>, E>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<R>, E>> + Send + 'static,
        R: Send + 'static,
        E: From<JoinError> + Send + 'static,
    {
        let nested = self.map(op).await?;
        Ok(nested.into_iter().flatten().collect())
    }
}

/// Run `op` over `items` concurrently, results in input order.
pub async fn parallel_map<T, R, E, F, Fut>(items: Vec<T>, op: F) -> Result<Vec<R>, E>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    ParallelMap::new(items).map(op).await
}

/// [`parallel_map`] followed by a one-level flatten.
pub async fn flat_parallel_map<T, R, E, F, Fut>(items: Vec<T>, op: F) -> Result<Vec<R>, E>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<R>, E>> + Send + 'static,
    R: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    ParallelMap::new(items).flat_map(op).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::error::Error;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_single_element_runs_inline() {
        let caller = thread::current().id();

        let threads = parallel_map(vec![1], |_| async {
            Ok::<_, Error>(thread::current().id())
        })
        .await
        .unwrap();

        assert_eq!(threads, vec![caller]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_multiple_elements_are_spawned() {
        let caller = thread::current().id();

        let threads = parallel_map(vec![1, 2], |_| async {
            Ok::<_, Error>(thread::current().id())
        })
        .await
        .unwrap();

        assert!(threads.iter().all(|id| *id != caller));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_preserves_input_order_despite_completion_order() {
        // "a" finishes last, "c" first
        let delays = [("a", 90_u64), ("b", 45), ("c", 0)];
        let finished = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let log = Arc::clone(&finished);
        let results = parallel_map(delays.to_vec(), move |(name, delay)| {
            let log = Arc::clone(&log);
            async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                log.lock().push(name);
                Ok::<_, Error>(name.to_uppercase())
            }
        })
        .await
        .unwrap();

        assert_eq!(results, vec!["A", "B", "C"]);
        assert_eq!(*finished.lock(), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_first_error_in_input_order_propagates() {
        let result = parallel_map(vec![1, 2, 3, 4], |n| async move {
            if n % 2 == 0 {
                Err(Error::Config(format!("bad {n}")))
            } else {
                Ok(n)
            }
        })
        .await;

        match result {
            Err(Error::Config(msg)) => assert_eq!(msg, "bad 2"),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_siblings_run_to_completion_on_error() {
        let completed = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&completed);
        let result = parallel_map(vec![0_u64, 20, 40], move |delay| {
            let counter = Arc::clone(&counter);
            async move {
                if delay == 0 {
                    return Err(Error::Config("fast failure".into()));
                }
                tokio::time::sleep(Duration::from_millis(delay)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(delay)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_unit_surfaces_as_join_error() {
        let result = parallel_map(vec![1, 2], |n| async move {
            assert!(n != 2, "unit {n} exploded");
            Ok::<_, Error>(n)
        })
        .await;

        assert!(matches!(result, Err(Error::Join(_))));
    }

    #[tokio::test]
    #[should_panic(expected = "only unit exploded")]
    async fn test_inline_unit_panics_into_caller() {
        let _ = parallel_map(vec![1], |n| async move {
            assert!(n != 1, "only unit exploded");
            Ok::<_, Error>(n)
        })
        .await;
    }

    #[test]
    fn test_len_and_is_empty() {
        let mapping = ParallelMap::new(vec!["a", "b"]).with_limit(0);
        assert_eq!(mapping.len(), 2);
        assert!(!mapping.is_empty());
        assert_eq!(mapping.limit, Some(1));
        assert!(ParallelMap::<u8>::new(Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn test_flat_map_concatenates_one_level() {
        let result = flat_parallel_map(vec![1_usize, 2, 3], |n| async move {
            Ok::<_, Error>(vec![vec![n]; n])
        })
        .await
        .unwrap();

        assert_eq!(result, vec![vec![1], vec![2], vec![2], vec![3], vec![3], vec![3]]);
    }

    #[tokio::test]
    async fn test_lazy_map_is_reusable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mapping = ParallelMap::new(vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let doubled = mapping
                .map(move |n| {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, Error>(n * 2)
                    }
                })
                .await
                .unwrap();
            assert_eq!(doubled, vec![2, 4, 6]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_limit_bounds_in_flight_units() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (current, max) = (Arc::clone(&in_flight), Arc::clone(&peak));
        let results = ParallelMap::new(0..8)
            .with_limit(2)
            .map(move |n| {
                let (current, max) = (Arc::clone(&current), Arc::clone(&max));
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    max.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, Error>(n)
                }
            })
            .await
            .unwrap();

        assert_eq!(results, (0..8).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let result = parallel_map(Vec::<u8>::new(), |n| async move { Ok::<_, Error>(n) })
            .await
            .unwrap();
        assert!(result.is_empty());
    }
}
