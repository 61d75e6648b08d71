use futures::StreamExt;
use std::future::Future;

/// 以给定并发上限执行一组 future，结果顺序与输入顺序一致
pub async fn do_parallel_with_limit<I, F>(futures: I, max_parallels: usize) -> Vec<F::Output>
where
    I: IntoIterator<Item = F>,
    F: Future,
{
    futures::stream::iter(futures)
        .buffered(max_parallels.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let futures = (0..5u64).map(|i| async move {
            // 让靠前的任务更晚结束
            tokio::time::sleep(Duration::from_millis(10 * (5 - i))).await;
            i
        });
        let results = do_parallel_with_limit(futures, 3).await;
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_limit_is_respected() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let futures = (0..8).map(|_| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        });
        do_parallel_with_limit(futures, 2).await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_zero_limit_still_runs() {
        let results = do_parallel_with_limit((0..3).map(|i| async move { i * 2 }), 0).await;
        assert_eq!(results, vec![0, 2, 4]);
    }
}
