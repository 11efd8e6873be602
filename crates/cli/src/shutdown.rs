use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

/// Listens for SIGINT/SIGTERM and flags that a shutdown was requested.
///
/// The migration loop has no cooperative cancellation points (spec §5: "no
/// cancellation tokens crossing operation boundaries") — a signal does not
/// interrupt an in-flight `migrate()` call. It only changes the exit code
/// the process reports once `migrate()` returns, and the operator relies on
/// the next run resuming from the last persisted checkpoint.
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    requested: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handlers(&self) {
        let requested = self.requested.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                signal::ctrl_c().await.expect("failed to install SIGINT handler");
            };

            #[cfg(unix)]
            let terminate = async {
                signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler")
                    .recv()
                    .await;
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => info!("received SIGINT, will exit once the current batch settles"),
                _ = terminate => info!("received SIGTERM, will exit once the current batch settles"),
            }

            requested.store(true, Ordering::SeqCst);
        });
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Process exit codes (spec §6: 0 on clean completion, non-zero on
/// unrecoverable init error).
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    ShutdownRequested = 130,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
