//! Page teardown signal: the only way an in-flight request gets aborted.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct PageLifetime {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for PageLifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl PageLifetime {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Unloads the page. Idempotent.
    pub fn teardown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_torn_down(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the page has been torn down.
    pub async fn torn_down(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on teardown.
        let _ = rx.wait_for(|down| *down).await;
    }
}
