//! Crawl job orchestration
//!
//! The orchestrator admits at most one job at a time and runs it in the
//! background, one (round, platform) step after another.
//!
//! # Architecture
//!
//! ```text
//! submit ──► validate ──► GlobalLock::try_acquire ──► StatusStore::create
//!                                                          │
//!                                                          ▼
//!                                               JobRunner (tokio task)
//!                                                          │
//!          ┌──────────────────────┬────────────────────────┤
//!          ▼                      ▼                        ▼
//!   ConfigResolver        PlatformCrawler::run     ResultStore::upsert_all
//! ```
//!
//! Callers get the job id back immediately. Everything the background task
//! learns is published through the [`StatusStore`] and as [`JobEvent`]s.
//!
//! # Modules
//!
//! - [`lock`] - single-slot admission gate
//! - [`status`] - job records and the in-memory status table
//! - [`resolve`] - per-platform config merging
//! - [`delay`] - randomized pauses between steps
//! - [`error`] - orchestrator error types

pub mod delay;
pub mod error;
pub mod lock;
pub mod resolve;
pub mod status;

mod runner;

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::crawler::CrawlerRegistry;
use crate::metrics;
use crate::models::Platform;
use crate::storage::ResultStore;

pub use delay::{DelayPolicy, DelayRange};
pub use error::{OrchestratorError, OrchestratorResult};
pub use lock::{GlobalLock, LockLease};
pub use resolve::{ConfigResolver, CrawlerConfigOverlay, CrawlerSettings, EffectiveConfig};
pub use status::{Job, JobStatus, StatusStore};

use runner::{JobContext, JobRunner};

// ============================================================================
// Requests and Events
// ============================================================================

/// A job submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlRequest {
    /// Platform codes, visited in order each round
    pub platforms: Vec<String>,

    /// One keyword group per round
    pub keyword_groups: Vec<Vec<String>>,

    /// Overlay applied to every platform's baseline
    #[serde(default)]
    pub config: CrawlerConfigOverlay,

    /// Caller-chosen job id; generated when absent
    #[serde(default)]
    pub task_id: Option<String>,

    #[serde(default)]
    pub task_name: Option<String>,
}

impl CrawlRequest {
    pub fn new(platforms: &[&str], keyword_groups: &[&[&str]]) -> Self {
        Self {
            platforms: platforms.iter().map(|p| p.to_string()).collect(),
            keyword_groups: keyword_groups
                .iter()
                .map(|group| group.iter().map(|k| k.to_string()).collect())
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_config(mut self, config: CrawlerConfigOverlay) -> Self {
        self.config = config;
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_task_name(mut self, task_name: impl Into<String>) -> Self {
        self.task_name = Some(task_name.into());
        self
    }
}

/// Acknowledgement of an admitted job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitReceipt {
    pub task_id: String,
    pub platforms: Vec<Platform>,
    pub total_rounds: usize,
}

/// Progress notifications published while a job runs
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Started {
        task_id: String,
        total_steps: usize,
    },
    StepStarted {
        task_id: String,
        round: usize,
        platform: Platform,
    },
    StepCompleted {
        task_id: String,
        round: usize,
        platform: Platform,
        posts_saved: usize,
        progress: f64,
    },
    Completed {
        task_id: String,
    },
    Failed {
        task_id: String,
        error: String,
    },
}

impl JobEvent {
    pub fn task_id(&self) -> &str {
        match self {
            Self::Started { task_id, .. }
            | Self::StepStarted { task_id, .. }
            | Self::StepCompleted { task_id, .. }
            | Self::Completed { task_id }
            | Self::Failed { task_id, .. } => task_id,
        }
    }

    /// Whether this is the last event of a job
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Single-slot crawl job orchestrator
pub struct Orchestrator {
    lock: GlobalLock,
    status: Arc<StatusStore>,
    registry: CrawlerRegistry,
    store: Arc<dyn ResultStore>,
    resolver: Arc<ConfigResolver>,
    delays: DelayPolicy,
    events: broadcast::Sender<JobEvent>,
    shutdown: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    current: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Create an orchestrator with default baselines, delays and history
    pub fn new(registry: CrawlerRegistry, store: Arc<dyn ResultStore>) -> Self {
        let (events, _) = broadcast::channel(256);
        let (shutdown, shutdown_rx) = watch::channel(false);

        Self {
            lock: GlobalLock::new(),
            status: Arc::new(StatusStore::default()),
            registry,
            store,
            resolver: Arc::new(ConfigResolver::default()),
            delays: DelayPolicy::default(),
            events,
            shutdown,
            shutdown_rx,
            current: Mutex::new(None),
        }
    }

    /// Set per-platform baselines
    pub fn with_resolver(mut self, resolver: ConfigResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Set inter-step delays
    pub fn with_delays(mut self, delays: DelayPolicy) -> Self {
        self.delays = delays;
        self
    }

    /// Set how many finished jobs stay queryable
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.status = Arc::new(StatusStore::new(limit));
        self
    }

    /// Validate and admit a job, then start it in the background
    ///
    /// Fails with [`OrchestratorError::Validation`] before touching any state,
    /// or with [`OrchestratorError::AdmissionConflict`] if a job is running.
    pub async fn submit(&self, request: CrawlRequest) -> OrchestratorResult<SubmitReceipt> {
        if *self.shutdown_rx.borrow() {
            return Err(OrchestratorError::Interrupted);
        }

        // Resubmitting the running job's id is a conflict, not a bad request.
        if let Some(running_task) = self.lock.holder() {
            if request.task_id.as_deref().map(str::trim) == Some(running_task.as_str()) {
                metrics::record_submission("conflict");
                tracing::warn!(running_task = %running_task, "Crawl request rejected: task already running");
                return Err(OrchestratorError::AdmissionConflict {
                    running_task: Some(running_task),
                });
            }
        }

        let validated = match self.validate(&request).await {
            Ok(v) => v,
            Err(e) => {
                metrics::record_submission("invalid");
                tracing::warn!(error = %e, "Rejected crawl request");
                return Err(e);
            }
        };

        let Some(lease) = self.lock.try_acquire(validated.task_id.clone()) else {
            metrics::record_submission("conflict");
            let running_task = self.lock.holder();
            tracing::warn!(running_task = ?running_task, "Crawl request rejected: slot busy");
            return Err(OrchestratorError::AdmissionConflict { running_task });
        };

        let job = Job::new(
            validated.task_id.clone(),
            request.task_name.clone(),
            validated.platforms.clone(),
            validated.rounds,
            request.config.clone(),
        );
        let total_rounds = job.total_rounds();

        // Dropping the lease on error frees the slot again.
        self.status.create(job).await?;
        metrics::record_submission("accepted");

        let runner = JobRunner::new(
            validated.task_id.clone(),
            JobContext {
                status: Arc::clone(&self.status),
                registry: self.registry.clone(),
                store: Arc::clone(&self.store),
                resolver: Arc::clone(&self.resolver),
                delays: self.delays,
                events: self.events.clone(),
                shutdown: self.shutdown_rx.clone(),
            },
        );
        let handle = tokio::spawn(runner.run(lease));
        *self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);

        tracing::info!(
            task_id = %validated.task_id,
            platforms = ?validated.platforms,
            total_rounds,
            "Crawl task admitted"
        );

        Ok(SubmitReceipt {
            task_id: validated.task_id,
            platforms: validated.platforms,
            total_rounds,
        })
    }

    async fn validate(&self, request: &CrawlRequest) -> OrchestratorResult<ValidatedRequest> {
        if request.platforms.is_empty() {
            return Err(OrchestratorError::validation("platforms must not be empty"));
        }
        if request.keyword_groups.is_empty() {
            return Err(OrchestratorError::validation(
                "keyword_groups must not be empty",
            ));
        }

        let mut platforms = Vec::with_capacity(request.platforms.len());
        for code in &request.platforms {
            let platform: Platform = code.trim().parse().map_err(OrchestratorError::validation)?;
            if !self.registry.supports(platform) {
                return Err(OrchestratorError::validation(format!(
                    "No crawler available for platform: {platform}"
                )));
            }
            platforms.push(platform);
        }

        let reserved = request.config.reserved_keys();
        if !reserved.is_empty() {
            return Err(OrchestratorError::validation(format!(
                "config must not set reserved keys: {}",
                reserved.join(", ")
            )));
        }

        let mut rounds = Vec::with_capacity(request.keyword_groups.len());
        for (index, group) in request.keyword_groups.iter().enumerate() {
            if group.is_empty() {
                return Err(OrchestratorError::validation(format!(
                    "keyword group {} is empty",
                    index + 1
                )));
            }
            let mut keywords = Vec::with_capacity(group.len());
            for keyword in group {
                let keyword = keyword.trim();
                if keyword.is_empty() {
                    return Err(OrchestratorError::validation(format!(
                        "keyword group {} contains a blank keyword",
                        index + 1
                    )));
                }
                keywords.push(keyword.to_string());
            }
            rounds.push(keywords);
        }

        let task_id = match request.task_id.as_deref().map(str::trim) {
            Some("") => return Err(OrchestratorError::validation("task_id must not be blank")),
            Some(id) => {
                if self.status.contains(id).await {
                    return Err(OrchestratorError::validation(format!(
                        "task_id '{id}' is already in use"
                    )));
                }
                id.to_string()
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        Ok(ValidatedRequest {
            task_id,
            platforms,
            rounds,
        })
    }

    /// Snapshot of a job
    pub async fn status(&self, task_id: &str) -> OrchestratorResult<Job> {
        self.status
            .get(task_id)
            .await
            .ok_or_else(|| OrchestratorError::not_found(task_id))
    }

    /// Whether a job currently holds the slot
    pub fn is_running(&self) -> bool {
        self.lock.is_held()
    }

    /// Snapshot of the job holding the slot, while it is still unfinished
    ///
    /// `None` during the short windows where the slot is held but the
    /// record is not created yet or has already reached a terminal state.
    pub async fn current_task(&self) -> Option<Job> {
        let holder = self.lock.holder()?;
        self.status
            .get(&holder)
            .await
            .filter(|job| !job.is_terminal())
    }

    /// Subscribe to job events
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Result store jobs write into
    pub fn store(&self) -> Arc<dyn ResultStore> {
        Arc::clone(&self.store)
    }

    /// Platforms with a registered crawler
    pub fn platforms(&self) -> Vec<Platform> {
        self.registry.platforms()
    }

    /// Stop accepting jobs and interrupt the running one
    ///
    /// Waits until the interrupted job has been recorded as failed.
    pub async fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        tracing::info!("Orchestrator shutting down");

        let handle = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Job task ended abnormally during shutdown");
            }
        }
    }
}

struct ValidatedRequest {
    task_id: String,
    platforms: Vec<Platform>,
    rounds: Vec<Vec<String>>,
}
