//! Scheduled purge of expired tokens

use anyhow::{Result, anyhow};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::service::DispatchService;

/// Start the retention job.
///
/// Every run deletes tokens that were never consumed and expired more than
/// `retention_hours` ago. The returned scheduler must be kept alive.
pub async fn start_retention(
    service: DispatchService,
    schedule: &str,
    retention_hours: i64,
) -> Result<JobScheduler> {
    let retention = chrono::Duration::try_hours(retention_hours)
        .ok_or_else(|| anyhow!("retention of {} hours is out of range", retention_hours))?;
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_, _| {
        let service = service.clone();
        Box::pin(async move {
            match service.purge_expired_tokens(retention).await {
                Ok(rows) => info!(rows, "Purged expired tokens"),
                Err(e) => error!("Token retention run failed: {}", e),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    info!(schedule, retention_hours, "Started token retention job");
    Ok(scheduler)
}
