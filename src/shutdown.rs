//! Cooperative cancellation shared by the monitor loops and the prober

use tokio::sync::watch;

/// Cloneable cancellation signal. Loops check it at their wait points;
/// nothing is interrupted mid-operation.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`Shutdown::cancel`] has been called on any clone
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Errors only once every sender handle is dropped
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
