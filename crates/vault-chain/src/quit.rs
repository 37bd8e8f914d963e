use std::sync::Arc;

use tokio::sync::watch;

/// Create a linked quit handle and signal.
pub fn quit_channel() -> (QuitHandle, QuitSignal) {
    let (tx, rx) = watch::channel(false);
    (QuitHandle { tx: Arc::new(tx) }, QuitSignal { rx: Some(rx) })
}

/// Raises the quit signal. Cloning gives another handle to the same signal.
#[derive(Clone, Debug)]
pub struct QuitHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl QuitHandle {
    /// Ask every holder of the signal to stop at its next check.
    pub fn raise(&self) {
        self.tx.send_replace(true);
    }

    /// A new signal observing this handle.
    pub fn signal(&self) -> QuitSignal {
        QuitSignal {
            rx: Some(self.tx.subscribe()),
        }
    }
}

/// Cooperative cancellation flag, polled between blocks.
///
/// Once raised it stays raised.
#[derive(Clone, Debug)]
pub struct QuitSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl QuitSignal {
    /// A signal that is never raised.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_raised(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

impl Default for QuitSignal {
    fn default() -> Self {
        Self::never()
    }
}
