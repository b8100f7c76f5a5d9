//! Background execution of one job
//!
//! A [`JobRunner`] is spawned per admitted job and owns the job's
//! [`LockLease`]. It walks every (round, platform) step in order, writes
//! cursors and progress through the [`StatusStore`], and releases the lease only
//! after the job record has reached a terminal state.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use super::delay::{DelayPolicy, DelayRange};
use super::error::{OrchestratorError, OrchestratorResult};
use super::lock::LockLease;
use super::resolve::{ConfigResolver, CrawlerConfigOverlay};
use super::status::{JobStatus, StatusStore};
use super::JobEvent;
use crate::crawler::CrawlerRegistry;
use crate::metrics;
use crate::models::{CrawlMetadata, Platform};
use crate::storage::ResultStore;

/// Collaborators a job needs while it runs
pub(crate) struct JobContext {
    pub status: Arc<StatusStore>,
    pub registry: CrawlerRegistry,
    pub store: Arc<dyn ResultStore>,
    pub resolver: Arc<ConfigResolver>,
    pub delays: DelayPolicy,
    pub events: broadcast::Sender<JobEvent>,
    pub shutdown: watch::Receiver<bool>,
}

pub(crate) struct JobRunner {
    job_id: String,
    ctx: JobContext,
}

impl JobRunner {
    pub(crate) fn new(job_id: String, ctx: JobContext) -> Self {
        Self { job_id, ctx }
    }

    /// Drive the job to a terminal state, then free the slot
    pub(crate) async fn run(self, mut lease: LockLease) {
        let runner = Arc::new(self);
        let worker = Arc::clone(&runner);

        // Run the steps in their own task so a panicking crawler still
        // leaves a failed record behind.
        let outcome = match tokio::spawn(async move { worker.execute().await }).await {
            Ok(outcome) => outcome,
            Err(e) => Err(OrchestratorError::Aborted {
                reason: e.to_string(),
            }),
        };

        let recorded = runner.record_outcome(outcome).await;
        lease.release();

        let task_id = runner.job_id.clone();
        let event = match recorded {
            Ok(()) => {
                metrics::record_job_finished(JobStatus::Completed.as_str());
                JobEvent::Completed { task_id }
            }
            Err(error) => {
                metrics::record_job_finished(JobStatus::Failed.as_str());
                JobEvent::Failed { task_id, error }
            }
        };
        runner.emit(event);
    }

    /// Write the terminal state; `Err` carries the recorded error message
    async fn record_outcome(&self, outcome: OrchestratorResult<()>) -> Result<(), String> {
        let id = self.job_id.as_str();
        let error = match outcome {
            Ok(()) => match self.ctx.status.update(id, |job| job.mark_completed()).await {
                Ok(_) => {
                    tracing::info!(task_id = %id, "Crawl task completed");
                    return Ok(());
                }
                Err(e) => e,
            },
            Err(e) => e,
        };

        let message = error.to_string();
        tracing::error!(task_id = %id, error = %message, "Crawl task failed");

        let recorded = message.clone();
        if let Err(e) = self
            .ctx
            .status
            .update(id, |job| job.mark_failed(recorded))
            .await
        {
            tracing::error!(task_id = %id, error = %e, "Failed to record failure");
        }
        Err(message)
    }

    async fn execute(&self) -> OrchestratorResult<()> {
        let id = self.job_id.as_str();
        let job = self.ctx.status.update(id, |job| job.mark_running()).await?;
        metrics::record_job_started();

        let total_steps = job.total_steps();
        let total_rounds = job.total_rounds();
        tracing::info!(
            task_id = %id,
            platforms = ?job.platforms,
            total_rounds,
            "Crawl task started"
        );
        self.emit(JobEvent::Started {
            task_id: id.to_string(),
            total_steps,
        });

        let mut completed_steps = 0;
        for (round_index, keywords) in job.rounds.iter().enumerate() {
            let round = round_index + 1;
            tracing::info!(task_id = %id, round, total_rounds, keywords = ?keywords, "Starting round");

            for (platform_index, &platform) in job.platforms.iter().enumerate() {
                self.ctx
                    .status
                    .update(id, |job| job.enter_step(round, platform))
                    .await?;
                self.emit(JobEvent::StepStarted {
                    task_id: id.to_string(),
                    round,
                    platform,
                });

                let saved = self.run_step(round, platform, keywords, &job.config).await?;
                completed_steps += 1;

                // The final step's progress lands together with `completed`.
                let progress = if completed_steps < total_steps {
                    self.ctx
                        .status
                        .update(id, |job| job.record_progress(completed_steps))
                        .await?
                        .progress
                } else {
                    100.0
                };
                self.emit(JobEvent::StepCompleted {
                    task_id: id.to_string(),
                    round,
                    platform,
                    posts_saved: saved,
                    progress,
                });

                if platform_index + 1 < job.platforms.len() {
                    self.pause(self.ctx.delays.between_platforms).await?;
                }
            }

            if round < total_rounds {
                self.pause(self.ctx.delays.between_rounds).await?;
            }
        }

        Ok(())
    }

    async fn run_step(
        &self,
        round: usize,
        platform: Platform,
        keywords: &[String],
        overlay: &CrawlerConfigOverlay,
    ) -> OrchestratorResult<usize> {
        let _timer = metrics::start_step_timer(platform.code());
        let result = self.crawl_and_save(round, platform, keywords, overlay).await;

        match &result {
            Ok(saved) => {
                metrics::record_step(platform.code(), true, *saved);
                tracing::info!(task_id = %self.job_id, round, platform = %platform, saved, "Step finished");
            }
            Err(_) => metrics::record_step(platform.code(), false, 0),
        }
        result
    }

    async fn crawl_and_save(
        &self,
        round: usize,
        platform: Platform,
        keywords: &[String],
        overlay: &CrawlerConfigOverlay,
    ) -> OrchestratorResult<usize> {
        let effective = self.ctx.resolver.resolve(platform, overlay);
        let crawler = self
            .ctx
            .registry
            .get(platform)
            .map_err(|source| OrchestratorError::CrawlFailure { platform, source })?;

        let posts = self
            .interruptible(crawler.run(platform, keywords, &effective))
            .await?
            .map_err(|source| OrchestratorError::CrawlFailure { platform, source })?;

        let metadata = CrawlMetadata::now(self.job_id.clone(), round, keywords.to_vec());
        self.ctx
            .store
            .upsert_all(platform, posts, &metadata)
            .await
            .map_err(|source| OrchestratorError::PersistenceFailure { platform, source })
    }

    async fn pause(&self, range: DelayRange) -> OrchestratorResult<()> {
        let delay = range.sample();
        if delay.is_zero() {
            return Ok(());
        }
        tracing::info!(task_id = %self.job_id, delay_secs = delay.as_secs(), "Waiting before next step");
        self.interruptible(tokio::time::sleep(delay)).await
    }

    /// Run `fut` unless shutdown is signalled first
    async fn interruptible<F: Future>(&self, fut: F) -> OrchestratorResult<F::Output> {
        let mut shutdown = self.ctx.shutdown.clone();
        if *shutdown.borrow_and_update() {
            return Err(OrchestratorError::Interrupted);
        }

        tokio::select! {
            output = fut => Ok(output),
            _ = wait_for_shutdown(&mut shutdown) => Err(OrchestratorError::Interrupted),
        }
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.ctx.events.send(event);
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if rx.changed().await.is_err() {
            // Sender gone: nobody can signal shutdown any more.
            std::future::pending::<()>().await;
        }
        if *rx.borrow_and_update() {
            return;
        }
    }
}
