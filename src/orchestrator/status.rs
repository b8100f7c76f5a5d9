//! Job records and the in-memory status table
//!
//! [`StatusStore`] is the single source of truth for what the orchestrator is
//! doing. The background loop mutates a job only through
//! [`StatusStore::update`], which applies the whole mutation under one write
//! lock, so readers always see progress and cursors that belong together.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::error::{OrchestratorError, OrchestratorResult};
use super::resolve::CrawlerConfigOverlay;
use crate::models::Platform;

/// Default number of finished jobs kept in memory
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

// ============================================================================
// Job Status
// ============================================================================

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, background loop not started yet
    Pending,
    /// Background loop in progress
    Running,
    /// Every step finished
    Completed,
    /// Aborted by a step failure or shutdown
    Failed,
}

impl JobStatus {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Job
// ============================================================================

/// One orchestration run over rounds × platforms
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier
    pub id: String,

    /// Optional caller-supplied label
    pub name: Option<String>,

    /// Platforms visited in order within each round
    pub platforms: Vec<Platform>,

    /// Keyword group per round
    pub rounds: Vec<Vec<String>>,

    /// Caller-supplied configuration overlay
    pub config: CrawlerConfigOverlay,

    /// Lifecycle state
    pub status: JobStatus,

    /// 1-based round of the step in progress (or last attempted)
    pub current_round: Option<usize>,

    /// Platform of the step in progress (or last attempted)
    pub current_platform: Option<Platform>,

    /// Completed steps as a percentage of all steps
    pub progress: f64,

    /// Failure description, set only when failed
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job
    pub fn new(
        id: impl Into<String>,
        name: Option<String>,
        platforms: Vec<Platform>,
        rounds: Vec<Vec<String>>,
        config: CrawlerConfigOverlay,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name,
            platforms,
            rounds,
            config,
            status: JobStatus::Pending,
            current_round: None,
            current_platform: None,
            progress: 0.0,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// Number of keyword rounds
    pub fn total_rounds(&self) -> usize {
        self.rounds.len()
    }

    /// Number of (round, platform) steps
    pub fn total_steps(&self) -> usize {
        self.rounds.len() * self.platforms.len()
    }

    /// Whether the job reached a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to running
    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Point the cursors at a step
    pub fn enter_step(&mut self, round: usize, platform: Platform) {
        self.current_round = Some(round);
        self.current_platform = Some(platform);
    }

    /// Record completed steps; progress never moves backwards
    pub fn record_progress(&mut self, completed_steps: usize) {
        let total = self.total_steps();
        if total == 0 {
            return;
        }
        let progress = (completed_steps as f64 / total as f64) * 100.0;
        if progress > self.progress {
            self.progress = progress;
        }
    }

    /// Finish successfully
    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.progress = 100.0;
        self.finished_at = Some(Utc::now());
    }

    /// Finish with an error; cursors and progress stay where they were
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        self.finished_at = Some(Utc::now());
    }
}

// ============================================================================
// Status Store
// ============================================================================

/// In-memory table of job records
pub struct StatusStore {
    jobs: RwLock<HashMap<String, Job>>,

    /// Finished jobs kept before the oldest are evicted
    history_limit: usize,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl StatusStore {
    /// Create an empty store
    pub fn new(history_limit: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            history_limit: history_limit.max(1),
        }
    }

    /// Insert a new job record
    pub async fn create(&self, job: Job) -> OrchestratorResult<()> {
        let mut jobs = self.jobs.write().await;

        if jobs.contains_key(&job.id) {
            return Err(OrchestratorError::validation(format!(
                "task_id '{}' is already in use",
                job.id
            )));
        }

        jobs.insert(job.id.clone(), job);
        Self::evict_finished(&mut jobs, self.history_limit);
        Ok(())
    }

    /// Snapshot of a job
    pub async fn get(&self, id: &str) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Whether a job id is known
    pub async fn contains(&self, id: &str) -> bool {
        self.jobs.read().await.contains_key(id)
    }

    /// Apply `mutator` to a job atomically and return the new snapshot
    ///
    /// Terminal jobs are immutable and reject updates.
    pub async fn update<F>(&self, id: &str, mutator: F) -> OrchestratorResult<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::not_found(id))?;

        if job.is_terminal() {
            return Err(OrchestratorError::TerminalJob {
                task_id: id.to_string(),
            });
        }

        mutator(job);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    /// Job currently in the running state, if any
    pub async fn running(&self) -> Option<Job> {
        self.jobs
            .read()
            .await
            .values()
            .find(|job| job.status == JobStatus::Running)
            .cloned()
    }

    /// Number of stored jobs
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Whether the store holds no jobs
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    fn evict_finished(jobs: &mut HashMap<String, Job>, limit: usize) {
        let mut finished: Vec<(DateTime<Utc>, String)> = jobs
            .values()
            .filter(|job| job.is_terminal())
            .map(|job| (job.finished_at.unwrap_or(job.updated_at), job.id.clone()))
            .collect();

        if finished.len() <= limit {
            return;
        }

        finished.sort();
        let excess = finished.len() - limit;
        for (_, id) in finished.into_iter().take(excess) {
            jobs.remove(&id);
            tracing::debug!(task_id = %id, "Evicted finished job from status store");
        }
    }
}
