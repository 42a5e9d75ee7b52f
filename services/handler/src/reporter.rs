//! Periodic droplet status report.

use std::sync::Arc;

use tracing::info;

use crate::handler::Handler;

/// Log the known droplets at the configured interval, forever. Reads a
/// registry snapshot; never touches the droplets themselves.
pub async fn run_report_loop(handler: Arc<Handler>) {
    let interval = handler.config().timings.report_interval();
    loop {
        tokio::time::sleep(interval).await;
        let snapshot = handler.registry().snapshot().await;
        info!(count = snapshot.len(), "-- BEGIN REPORT --");
        for droplet in &snapshot {
            info!(
                identifier = %droplet.identifier(),
                identified = droplet.identified(),
                "Droplet"
            );
        }
        info!("-- END REPORT --");
    }
}
