//! Interrupt-driven shutdown hook
//!
//! Listens for SIGINT (Ctrl+C) on a dedicated thread. Each delivery runs
//! the callback; when it reports that a session was stopped, its profile is
//! already flushed and the process exits with status 0. Otherwise the
//! interrupt is ignored and the listener keeps waiting.
//!
//! The signal handler is registered before [`install`] returns, so an
//! interrupt that arrives right after `start` is not lost.

use tokio::runtime::{Builder, Runtime};

use crate::domain::ProfileError;

/// Name of the listener thread
pub const THREAD_NAME: &str = "profile-sigint";

/// Start a listener that calls `on_interrupt` for every SIGINT.
///
/// # Errors
/// Returns [`ProfileError::ShutdownHook`] if the signal listener or its
/// thread cannot be set up
pub fn install<F>(mut on_interrupt: F) -> Result<(), ProfileError>
where
    F: FnMut() -> bool + Send + 'static,
{
    let runtime =
        Builder::new_current_thread().enable_all().build().map_err(ProfileError::ShutdownHook)?;
    let mut interrupt = Interrupt::register(&runtime).map_err(ProfileError::ShutdownHook)?;

    std::thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || {
            runtime.block_on(async move {
                while interrupt.recv().await {
                    if on_interrupt() {
                        std::process::exit(0);
                    }
                }
            });
        })
        .map_err(ProfileError::ShutdownHook)?;
    Ok(())
}

#[cfg(unix)]
struct Interrupt(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Interrupt {
    fn register(runtime: &Runtime) -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let _guard = runtime.enter();
        signal(SignalKind::interrupt()).map(Self)
    }

    async fn recv(&mut self) -> bool {
        self.0.recv().await.is_some()
    }
}

#[cfg(not(unix))]
struct Interrupt;

#[cfg(not(unix))]
impl Interrupt {
    #[allow(clippy::unnecessary_wraps)]
    fn register(_runtime: &Runtime) -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> bool {
        tokio::signal::ctrl_c().await.is_ok()
    }
}
