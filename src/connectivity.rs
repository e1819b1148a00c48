//! Decides whether the remote service is usable right now.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::api::RemoteService;

pub struct ConnectivityGate {
    remote: Arc<dyn RemoteService>,
    network_reachable: AtomicBool,
    timeout: Duration,
}

impl ConnectivityGate {
    pub fn new(remote: Arc<dyn RemoteService>, timeout: Duration) -> Self {
        Self {
            remote,
            network_reachable: AtomicBool::new(true),
            timeout,
        }
    }

    /// Reachability as reported by the host platform's network callback.
    pub fn set_network_reachable(&self, reachable: bool) {
        let previous = self.network_reachable.swap(reachable, Ordering::SeqCst);
        if previous != reachable {
            debug!(reachable, "network reachability changed");
        }
    }

    pub fn network_reachable(&self) -> bool {
        self.network_reachable.load(Ordering::SeqCst)
    }

    /// Reachable network and an accepted session, checked within the
    /// configured timeout. Any failure counts as unavailable.
    pub async fn is_remote_available(&self) -> bool {
        if !self.network_reachable() {
            return false;
        }
        match tokio::time::timeout(self.timeout, self.remote.is_authenticated()).await {
            Ok(authenticated) => authenticated,
            Err(_) => {
                debug!(timeout_ms = self.timeout.as_millis() as u64, "session check timed out");
                false
            }
        }
    }
}
