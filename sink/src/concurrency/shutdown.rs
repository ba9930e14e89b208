//! Broadcast shutdown signal.
//!
//! The loader triggers it on `SIGINT` or `SIGTERM`. Whoever reads the input stops at the next
//! message boundary and shuts the engine down, which waits for in-flight flushes and
//! discards buffered rows.

use tokio::sync::watch;

/// Sending side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Notifies every subscribed receiver.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Receiving side of the shutdown signal. `changed()` resolves once shutdown was requested.
pub type ShutdownRx = watch::Receiver<()>;

/// Whether an operation ran to completion or was cut short by a shutdown.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ShutdownResult<T, I> {
    Ok(T),
    Shutdown(I),
}

impl<T, I> ShutdownResult<T, I> {
    pub fn should_shutdown(&self) -> bool {
        matches!(self, ShutdownResult::Shutdown(_))
    }
}

pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}
