// Panic isolation for job execution
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed
    Success(T),
    /// Execution panicked
    Panicked(String),
}

/// Human-readable message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Await a future on the current task, catching any panic it raises.
pub async fn execute_guarded_async<F, T>(future: F) -> PanicGuardResult<T>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => PanicGuardResult::Success(value),
        Err(payload) => {
            let panic_msg = panic_message(payload.as_ref());
            error!(panic_msg = %panic_msg, "Job panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}

/// Run a future on its own Tokio task so a panic cannot unwind into the caller.
pub async fn execute_isolated<F, T>(future: F) -> PanicGuardResult<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn(future).await {
        Ok(value) => PanicGuardResult::Success(value),
        Err(join_err) => {
            let panic_msg = if join_err.is_panic() {
                panic_message(join_err.into_panic().as_ref())
            } else {
                "Job task was cancelled".to_string()
            };
            error!(panic_msg = %panic_msg, "Isolated job task failed");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guarded_async_catches_panic() {
        let result = execute_guarded_async(async {
            panic!("inline boom");
        })
        .await;
        match result {
            PanicGuardResult::<()>::Panicked(msg) => assert_eq!(msg, "inline boom"),
            PanicGuardResult::Success(_) => panic!("expected a caught panic"),
        }
    }

    #[tokio::test]
    async fn test_isolated_catches_formatted_panic() {
        let result = execute_isolated(async {
            let code = 7;
            if code == 7 {
                panic!("isolated boom {}", code);
            }
            code
        })
        .await;
        match result {
            PanicGuardResult::Panicked(msg) => assert_eq!(msg, "isolated boom 7"),
            PanicGuardResult::Success(_) => panic!("expected a caught panic"),
        }
    }

    #[tokio::test]
    async fn test_success_passes_value_through() {
        assert!(matches!(
            execute_isolated(async { 42 }).await,
            PanicGuardResult::Success(42)
        ));
        assert!(matches!(
            execute_guarded_async(async { "ok" }).await,
            PanicGuardResult::Success("ok")
        ));
    }
}
