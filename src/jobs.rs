use crate::errors::GateError;
use crate::storage;
use sea_orm::DatabaseConnection;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Every hour at 15 minutes past.
pub const TOKEN_CLEANUP_SCHEDULE: &str = "0 15 * * * *";

/// Deletes expired and revoked access tokens.
pub async fn cleanup_access_tokens(db: &DatabaseConnection) -> Result<u64, GateError> {
    let count = storage::cleanup_expired_access_tokens(db).await?;
    info!("Cleaned up {} expired or revoked access tokens", count);
    Ok(count)
}

/// Initialize and start the job scheduler with all background tasks
pub async fn init_scheduler(db: DatabaseConnection) -> Result<JobScheduler, GateError> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| GateError::Other(format!("Failed to create job scheduler: {}", e)))?;

    let cleanup_tokens_job = Job::new_async(TOKEN_CLEANUP_SCHEDULE, move |_uuid, _l| {
        let db = db.clone();
        Box::pin(async move {
            info!("Running cleanup_access_tokens job");
            if let Err(e) = cleanup_access_tokens(&db).await {
                error!("Failed to cleanup access tokens: {}", e);
            }
        })
    })
    .map_err(|e| GateError::Other(format!("Failed to create cleanup tokens job: {}", e)))?;

    sched
        .add(cleanup_tokens_job)
        .await
        .map_err(|e| GateError::Other(format!("Failed to add cleanup tokens job: {}", e)))?;

    sched
        .start()
        .await
        .map_err(|e| GateError::Other(format!("Failed to start job scheduler: {}", e)))?;

    info!("Job scheduler started");

    Ok(sched)
}
