//! Bounded-concurrency fan-out used by group/cluster cascade delete and any
//! other batched Kubernetes/Helm operation. A thin wrapper over a semaphore
//! and a join set: dispatch every task in the batch, never run more than
//! `max_concurrency` at once, and hand back results in the same order the
//! tasks were submitted regardless of completion order.
//!
//! Tasks are boxed futures rather than generic closures: a single cascade
//! batch mixes instance teardown, secret teardown, and namespace deletion,
//! each an `async move` block of a different concrete type, so they need a
//! common trait-object type to live in one `Vec` together.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub type CascadeTask<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

pub async fn fan_out<T>(max_concurrency: usize, tasks: Vec<CascadeTask<T>>) -> Vec<Result<T>>
where
    T: Send + 'static,
{
    let total = tasks.len();
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut set = JoinSet::new();

    for (idx, task) in tasks.into_iter().enumerate() {
        let sem = semaphore.clone();
        set.spawn(async move {
            let _permit = sem.acquire_owned().await.expect("cascade semaphore closed");
            (idx, task.await)
        });
    }

    let mut results: Vec<Option<Result<T>>> = (0..total).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, res)) => results[idx] = Some(res),
            Err(join_err) => tracing::error!(error = %join_err, "cascade task panicked"),
        }
    }

    results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err(anyhow::anyhow!("cascade task did not complete"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn results_preserve_submission_order() {
        let tasks: Vec<CascadeTask<usize>> = (0..20)
            .map(|i| {
                Box::pin(async move {
                    if i % 3 == 0 {
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    }
                    Ok::<usize, anyhow::Error>(i)
                }) as CascadeTask<usize>
            })
            .collect();

        let results = fan_out(4, tasks).await;
        let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn never_exceeds_max_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<CascadeTask<()>> = (0..12)
            .map(|_| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                Box::pin(async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), anyhow::Error>(())
                }) as CascadeTask<()>
            })
            .collect();

        fan_out(3, tasks).await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn a_failing_task_does_not_affect_others() {
        let tasks: Vec<CascadeTask<i32>> = vec![
            Box::pin(async { Err::<i32, anyhow::Error>(anyhow::anyhow!("boom")) }),
            Box::pin(async { Ok::<i32, anyhow::Error>(7) }),
        ];
        let results = fan_out(2, tasks).await;

        assert!(results[0].is_err());
        assert_eq!(*results[1].as_ref().unwrap(), 7);
    }
}
