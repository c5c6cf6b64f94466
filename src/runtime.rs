use std::future::Future;

/// Spawns a background task for best-effort cleanup work (e.g. the `killCursors` scheduled when
/// an unexhausted cursor is dropped). Outside of an async runtime there is nothing to drive the
/// work, so it is skipped; resource release on the server then falls to its cursor timeout.
pub(crate) fn spawn<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        let _ = handle.spawn(future);
    }
}

/// Drives a future to completion on a standalone runtime, for the blocking API.
#[cfg(feature = "sync")]
pub(crate) fn block_on<F, T>(future: F) -> T
where
    F: Future<Output = T>,
{
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime for blocking call")
        .block_on(future)
}
