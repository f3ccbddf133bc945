//! Async price publisher.
//!
//! Consumes already-normalized snapshots from the ingestion side and
//! publishes them into the cache, forwarding each published id downstream
//! (typically to the re-optimization watcher).

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{PriceCache, PriceSnapshot};

/// Run the publisher loop until cancelled or the inbound channel closes.
///
/// Rejected snapshots (invalid or duplicate) are logged and skipped; the
/// cache keeps serving the previous ledger.
pub async fn run_price_publisher(
    cache: Arc<PriceCache>,
    mut inbound: mpsc::Receiver<PriceSnapshot>,
    published: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    info!("Price publisher started");

    loop {
        let snapshot = tokio::select! {
            () = cancel.cancelled() => {
                debug!("Price publisher cancelled");
                return;
            }
            msg = inbound.recv() => match msg {
                Some(s) => s,
                None => {
                    debug!("Price feed channel closed, stopping publisher");
                    return;
                }
            },
        };

        let snapshot_id = snapshot.snapshot_id.clone();
        match cache.publish(snapshot) {
            Ok(_) => {
                if published.send(snapshot_id).await.is_err() {
                    debug!("Published-snapshot channel closed, stopping publisher");
                    return;
                }
            }
            Err(e) => {
                warn!(snapshot_id = %snapshot_id, error = %e, "Rejected price snapshot");
            }
        }
    }
}
