/// Background SLA monitor service
///
/// Runs `Orchestrator::check_sla` on a cron schedule using
/// tokio-cron-scheduler, so live executions get an `sla_breached` timeline
/// entry as soon as their incident misses a deadline.

use crate::orchestrator::Orchestrator;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

pub struct SlaMonitorService {
    scheduler: Arc<RwLock<JobScheduler>>,
    /// UUID of the registered job, kept for removal on stop
    job_uuid: Arc<RwLock<Option<Uuid>>>,
    orchestrator: Arc<Orchestrator>,
    schedule: String,
}

impl SlaMonitorService {
    pub async fn new(orchestrator: Arc<Orchestrator>, schedule: impl Into<String>) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            job_uuid: Arc::new(RwLock::new(None)),
            orchestrator,
            schedule: schedule.into(),
        })
    }

    /// Register the SLA job and start ticking
    pub async fn start(&self) -> Result<()> {
        tracing::info!("⏰ Starting SLA monitor ({})", self.schedule);

        let orchestrator = Arc::clone(&self.orchestrator);
        let job = Job::new_async(self.schedule.as_str(), move |_uuid, _l| {
            let orchestrator = Arc::clone(&orchestrator);
            Box::pin(async move {
                tracing::debug!("🔔 SLA check tick");
                match orchestrator.check_sla(Utc::now()).await {
                    Ok(0) => {}
                    Ok(breaches) => tracing::warn!("⏱️ Recorded {} new SLA breaches", breaches),
                    Err(e) => tracing::error!("❌ SLA check failed: {}", e),
                }
            })
        })?;

        let job_uuid = {
            let scheduler = self.scheduler.write().await;
            scheduler.add(job).await?
        };
        *self.job_uuid.write().await = Some(job_uuid);

        {
            let scheduler = self.scheduler.read().await;
            scheduler.start().await?;
        }

        tracing::info!("✅ SLA monitor started");
        Ok(())
    }

    /// Run one check immediately, outside the schedule
    pub async fn run_once(&self) -> Result<usize> {
        Ok(self.orchestrator.check_sla(Utc::now()).await?)
    }

    pub async fn stop(&self) -> Result<()> {
        tracing::info!("⏹️ Stopping SLA monitor");

        if let Some(job_uuid) = self.job_uuid.write().await.take() {
            let scheduler = self.scheduler.read().await;
            if let Err(e) = scheduler.remove(&job_uuid).await {
                tracing::warn!("⚠️ Failed to remove SLA job {}: {}", job_uuid, e);
            }
        }

        {
            let mut scheduler = self.scheduler.write().await;
            scheduler.shutdown().await?;
        }

        tracing::info!("✅ SLA monitor stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::MemoryIncidentGateway;
    use crate::runtime::executor::DryRunExecutor;
    use crate::runtime::policy::RetryPolicy;
    use crate::store::MemoryExecutionStore;
    use crate::workflow::registry::WorkflowRegistry;

    fn orchestrator() -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            Arc::new(WorkflowRegistry::in_memory()),
            Arc::new(DryRunExecutor::registry()),
            Arc::new(MemoryIncidentGateway::new()),
            Arc::new(MemoryExecutionStore::new()),
            RetryPolicy::default(),
        ))
    }

    #[tokio::test]
    async fn malformed_schedule_fails_to_start() {
        let monitor = SlaMonitorService::new(orchestrator(), "every minute please").await.unwrap();
        assert!(monitor.start().await.is_err());
    }

    #[tokio::test]
    async fn run_once_with_nothing_live_records_nothing() {
        let monitor = SlaMonitorService::new(orchestrator(), "0 * * * * *").await.unwrap();
        assert_eq!(monitor.run_once().await.unwrap(), 0);
    }
}
