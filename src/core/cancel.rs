use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Cooperative cancellation flag, polled at step boundaries and while
/// waiting on local processes.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel on Ctrl-C. Only one handler can be installed per process.
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            log_status!("cancel", "Cancellation requested, stopping after the current step");
            token.cancel();
        })
        .map_err(|e| Error::internal_unexpected(format!("Failed to install Ctrl-C handler: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
