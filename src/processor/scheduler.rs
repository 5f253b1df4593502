use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use super::poll_cycle::PollCycle;

#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub initial_delay: Duration,
    /// Pause between the end of one cycle and the start of the next.
    pub frequency: Duration,
}

/// Runs poll cycles back to back with a fixed delay in between until
/// `shutdown` flips to true. Only this task drives cycles, so two cycles never
/// run at the same time.
pub async fn run_scheduler(cycle: PollCycle, schedule: Schedule, mut shutdown: watch::Receiver<bool>) {
    info!(
        "Nautical warnings poller initialized, polling every {} minutes",
        schedule.frequency.as_secs() / 60
    );

    if !wait(schedule.initial_delay, &mut shutdown).await {
        return;
    }

    loop {
        let report = cycle.run(Utc::now()).await;
        if let Some(poll) = &report.poll {
            info!(
                fetched = poll.fetched,
                filtered_out = poll.filtered_out,
                purged = report.purged.unwrap_or(0),
                retried = report.retry.as_ref().map_or(0, |r| r.attempted),
                new = poll.new_ids.len(),
                expired = poll.expired_ids.len(),
                skipped = poll.skipped_ids.len(),
                failed_deliveries = poll.failed_deliveries.len(),
                "Poll cycle finished"
            );
        } else {
            warn!("Poll cycle finished without polling, retrying on next trigger");
        }

        if !wait(schedule.frequency, &mut shutdown).await {
            break;
        }
    }
}

/// Sleeps for `delay`. Returns false if shutdown was requested instead.
async fn wait(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        info!("Shutdown requested, stopping poller");
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.changed() => {
            info!("Shutdown requested, stopping poller");
            false
        }
    }
}
