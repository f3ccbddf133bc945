//! Re-optimization watcher
//!
//! Listens for published snapshot ids and checks stored strategies against
//! them on the blocking pool, forwarding any alerts.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::ReoptimizationAlert;

use super::StrategyManager;

/// Run until cancelled or the published-snapshot channel closes.
pub async fn run_reoptimization_watcher(
    manager: Arc<StrategyManager>,
    mut published: mpsc::Receiver<String>,
    alerts: mpsc::Sender<ReoptimizationAlert>,
    cancel: CancellationToken,
) {
    info!("Re-optimization watcher started");

    loop {
        let snapshot_id = tokio::select! {
            () = cancel.cancelled() => {
                debug!("Re-optimization watcher cancelled");
                return;
            }
            msg = published.recv() => match msg {
                Some(id) => id,
                None => {
                    debug!("Published-snapshot channel closed, stopping watcher");
                    return;
                }
            },
        };

        let m = Arc::clone(&manager);
        let id = snapshot_id.clone();
        let found = match tokio::task::spawn_blocking(move || m.on_snapshot_published(&id)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                warn!(snapshot_id = %snapshot_id, error = %e, "Strategy check failed");
                continue;
            }
            Err(e) => {
                warn!(snapshot_id = %snapshot_id, error = %e, "Strategy check task panicked");
                continue;
            }
        };

        debug!(snapshot_id = %snapshot_id, alerts = found.len(), "Strategies checked");
        for alert in found {
            if alerts.send(alert).await.is_err() {
                debug!("Alert channel closed, stopping watcher");
                return;
            }
        }
    }
}
