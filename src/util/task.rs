use futures::FutureExt;
use std::panic::AssertUnwindSafe;

/// Wraps a future to catch panics and convert them to errors.
///
/// Instead of a spawned task silently disappearing (caught by Tokio's runtime
/// but never reported to its owner), panics are converted to `Err(String)`
/// containing the panic message so the owner can clear its bookkeeping.
///
/// # Example
///
/// ```ignore
/// tokio::spawn(async move {
///     let result = match catch_task_panic(fetch(query)).await {
///         Ok(result) => result.map_err(FeedError::from),
///         Err(panic_msg) => Err(FeedError::TaskPanicked(panic_msg)),
///     };
///     let _ = tx.send(FeedEvent::PageLoaded { generation, result }).await;
/// });
/// ```
pub async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                format!("Unknown panic: {:?}", (*panic).type_id())
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_through_output() {
        assert_eq!(catch_task_panic(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn test_captures_str_panic() {
        let result = catch_task_panic(async { panic!("boom") }).await;
        assert_eq!(result, Err::<(), _>("boom".to_string()));
    }

    #[tokio::test]
    async fn test_captures_formatted_panic() {
        let id = 42;
        let result = catch_task_panic(async move {
            if id == 42 {
                panic!("bad id {id}");
            }
        })
        .await;
        assert_eq!(result, Err("bad id 42".to_string()));
    }
}
