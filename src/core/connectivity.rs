use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Tracks online/offline transitions reported by the runtime.
///
/// Clones share the same state. Transitions are pushed through
/// [`ConnectivityMonitor::set_online`]; nothing polls.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state_tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    /// `initially_online` is the runtime's reachability flag at construction time.
    pub fn new(initially_online: bool) -> Self {
        let (state_tx, _) = watch::channel(initially_online);
        Self {
            state_tx: Arc::new(state_tx),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.state_tx.borrow()
    }

    /// Records a transition. Repeating the current value notifies nobody.
    pub fn set_online(&self, online: bool) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });

        if changed {
            info!(online, "Connectivity changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state_tx.subscribe()
    }

    /// Resolves immediately when online, otherwise at the next transition to online.
    pub async fn wait_until_online(&self) {
        let mut state_rx = self.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = state_rx.wait_for(|online| *online).await;
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
