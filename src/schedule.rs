//! Bounded concurrency over accounts.
//!
//! Two strategies:
//!
//! - `batch`: run accounts in fixed groups of `limit`; the next group starts
//!   only after the whole current group has finished.
//! - `pool`: keep up to `limit` accounts in flight; a finished account frees
//!   its slot immediately.
//!
//! Both run on the calling task, so account futures need not be `Send`.

use clap::ValueEnum;
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    /// Fixed groups; the next group waits for the whole current one
    #[default]
    Batch,
    /// Sliding window; a finished account frees its slot at once
    Pool,
}

/// Run `task(index, item)` for every item with at most `limit` in flight.
///
/// In batch mode results come back in input order; in pool mode in
/// completion order. A `limit` of 0 is treated as 1.
pub async fn run_bounded<I, T, F, Fut>(items: Vec<I>, limit: usize, mode: ScheduleMode, task: F) -> Vec<T>
where
    F: Fn(usize, I) -> Fut,
    Fut: Future<Output = T>,
{
    let limit = limit.max(1);
    match mode {
        ScheduleMode::Batch => {
            let mut results = Vec::with_capacity(items.len());
            let mut items = items.into_iter().enumerate().peekable();
            let mut batch_number = 0;
            while items.peek().is_some() {
                batch_number += 1;
                let batch: Vec<_> = items.by_ref().take(limit).collect();
                tracing::debug!(batch = batch_number, accounts = batch.len(), "starting batch");
                results.extend(join_all(batch.into_iter().map(|(index, item)| task(index, item))).await);
            }
            results
        }
        ScheduleMode::Pool => {
            stream::iter(items.into_iter().enumerate())
                .map(|(index, item)| task(index, item))
                .buffer_unordered(limit)
                .collect()
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;

    struct Gauge {
        current: Cell<usize>,
        peak: Cell<usize>,
    }

    impl Gauge {
        fn new() -> Self {
            Self { current: Cell::new(0), peak: Cell::new(0) }
        }

        async fn hold(&self, millis: u64) {
            self.current.set(self.current.get() + 1);
            self.peak.set(self.peak.get().max(self.current.get()));
            tokio::time::sleep(Duration::from_millis(millis)).await;
            self.current.set(self.current.get() - 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_respects_limit_and_order() {
        let gauge = &Gauge::new();
        let results = run_bounded((0..7).collect(), 3, ScheduleMode::Batch, move |index, item: u64| async move {
            gauge.hold(10 * (7 - item)).await;
            index
        })
        .await;
        assert_eq!(results, (0..7).collect::<Vec<_>>());
        assert_eq!(gauge.peak.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_waits_for_slowest_in_group() {
        let started = tokio::time::Instant::now();
        run_bounded(vec![100u64, 10, 10, 10], 2, ScheduleMode::Batch, |_, millis| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        })
        .await;
        // group one takes 100ms, group two 10ms
        assert_eq!(started.elapsed(), Duration::from_millis(110));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_refills_slots() {
        let gauge = &Gauge::new();
        let started = tokio::time::Instant::now();
        let results = run_bounded(vec![100u64, 10, 10, 10], 2, ScheduleMode::Pool, move |index, millis| async move {
            gauge.hold(millis).await;
            index
        })
        .await;
        let mut sorted = results.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
        assert_eq!(gauge.peak.get(), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_zero_limit_still_runs() {
        let results = run_bounded(vec![1, 2], 0, ScheduleMode::Batch, |_, n| async move { n * 2 }).await;
        assert_eq!(results, vec![2, 4]);
    }

    #[test]
    fn test_mode_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: ScheduleMode,
        }
        let w: Wrapper = toml::from_str(r#"mode = "pool""#).unwrap();
        assert_eq!(w.mode, ScheduleMode::Pool);

        // command line and config file share the same names
        for mode in ScheduleMode::value_variants() {
            let name = mode.to_possible_value().unwrap().get_name().to_string();
            let from_toml: Wrapper = toml::from_str(&format!("mode = \"{}\"", name)).unwrap();
            assert_eq!(from_toml.mode, *mode);
        }
        assert_eq!(ScheduleMode::from_str("batch", false), Ok(ScheduleMode::Batch));
    }
}
