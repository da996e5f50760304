use std::future::Future;

use tokio::task::JoinHandle;

/// Spawn a fire-and-forget task whose panic is logged instead of lost.
///
/// The returned handle resolves once the task has ended either way.
pub fn spawn_supervised<F>(label: &'static str, fut: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let inner = tokio::spawn(fut);
    tokio::spawn(async move {
        match inner.await {
            Ok(()) => {}
            Err(e) if e.is_panic() => {
                tracing::error!(task = label, "background task panicked: {e}");
            }
            Err(e) => {
                tracing::warn!(task = label, "background task cancelled: {e}");
            }
        }
    })
}
