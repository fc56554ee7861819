//! Bounded-concurrency batch execution.

use std::future::Future;

use futures_util::stream::{self, StreamExt};

use crate::types::{BatchResult, PaymentResult};

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Concurrency must be at least 1")]
    ZeroConcurrency,
}

/// Runs `run` over every request with at most `concurrency` in flight.
/// Results come back in input order regardless of completion order.
pub async fn run_batch<R, F, Fut>(
    requests: Vec<R>,
    concurrency: usize,
    run: F,
) -> Result<BatchResult, BatchError>
where
    F: Fn(R) -> Fut,
    Fut: Future<Output = PaymentResult>,
{
    if concurrency == 0 {
        return Err(BatchError::ZeroConcurrency);
    }
    let results: Vec<PaymentResult> = stream::iter(requests.into_iter().map(run))
        .buffered(concurrency)
        .collect()
        .await;
    Ok(BatchResult::from_results(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::MoneyAmount;
    use crate::types::{PaymentStatus, Route};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn success(tag: &str) -> PaymentResult {
        PaymentResult::succeeded(
            MoneyAmount::from(1u64),
            tag,
            Route::Transfer,
            PaymentStatus::Confirmed,
            format!("tx-{tag}"),
            None,
        )
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        // the first request finishes last; order must still hold
        let delays = vec![("a", 40u64), ("b", 20), ("c", 0)];
        let batch = run_batch(delays, 3, |(tag, delay)| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            success(tag)
        })
        .await
        .unwrap();

        let recipients: Vec<&str> = batch
            .results
            .iter()
            .map(|result| result.recipient.as_str())
            .collect();
        assert_eq!(recipients, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let requests: Vec<usize> = (0..6).collect();
        let batch = run_batch(requests, 2, |index| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(15)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                success(&index.to_string())
            }
        })
        .await
        .unwrap();

        assert_eq!(batch.total, 6);
        assert!(peak.load(Ordering::SeqCst) <= 2, "ran too many at once");
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_refused() {
        let err = run_batch(vec![()], 0, |()| async { success("x") })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Concurrency must be at least 1");
    }

    #[tokio::test]
    async fn test_counts_split_successes_and_failures() {
        let outcomes = vec![true, false, true];
        let batch = run_batch(outcomes, 2, |ok| async move {
            if ok {
                success("ok")
            } else {
                PaymentResult::failed(MoneyAmount::from(1u64), "bad", None, "nope")
            }
        })
        .await
        .unwrap();
        assert_eq!(batch.total, 3);
        assert_eq!(batch.succeeded, 2);
        assert_eq!(batch.failed, 1);
    }
}
