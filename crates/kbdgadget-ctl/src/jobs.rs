//! The script job manager: runs automation scripts as independently
//! cancellable, resumable units of work.
//!
//! A [`ScriptJob`] is a reusable VM slot, not a single-shot task: it
//! keeps its id across sequential runs and walks an explicit state
//! machine, `Idle → Running → {Completed, Failed, Cancelled}`, with a
//! reset back to `Running` on re-run. Never two concurrent runs of the
//! same job.
//!
//! State is published through a `watch` channel, which buys the two
//! trickiest guarantees for free: any number of `wait_result` callers
//! block on the same channel and all observe the same stored terminal
//! state, and cancellation never deadlocks against them because
//! cancelling only flips a flag that the running script observes at
//! its next host-call boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::keyboard::KeyboardController;
use crate::led::LedMonitor;
use crate::script::{EngineError, ScriptEngine, ScriptHost};

/// Error type for job operations and job outcomes.
#[derive(Debug, Error)]
pub enum JobError {
    /// No tracked job carries this id.
    #[error("script job {0} not found")]
    NotFound(u64),

    /// The operation needs the job to be idle, but it is running.
    #[error("script job {0} is already running")]
    AlreadyRunning(u64),

    /// The job was cancelled; every result waiter receives this.
    #[error("script job cancelled")]
    Cancelled,

    /// The script failed to evaluate.
    #[error("script job failed: {0}")]
    Failed(String),
}

/// Lifecycle state of one script job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    /// Created but never run.
    Idle,
    Running,
    Completed(Value),
    Failed(String),
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed(_) | JobState::Failed(_) | JobState::Cancelled
        )
    }
}

/// One reusable script VM slot.
pub struct ScriptJob {
    id: u64,
    cancel: Arc<AtomicBool>,
    state: watch::Sender<JobState>,
}

impl ScriptJob {
    fn new(id: u64) -> Arc<Self> {
        let (state, _) = watch::channel(JobState::Idle);
        Arc::new(Self {
            id,
            cancel: Arc::new(AtomicBool::new(false)),
            state,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Non-blocking: is the job currently running?
    pub fn is_working(&self) -> bool {
        matches!(*self.state.borrow(), JobState::Running)
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    /// Signals cooperative cancellation. The running script observes
    /// the flag at its next host-call boundary; an in-flight device
    /// write is never interrupted.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Atomically transitions to `Running`, resetting the cancel flag
    /// and discarding any prior result.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::AlreadyRunning`] if a run is in progress.
    fn try_begin_run(&self) -> Result<(), JobError> {
        let mut began = false;
        self.state.send_if_modified(|state| {
            if matches!(state, JobState::Running) {
                false
            } else {
                *state = JobState::Running;
                began = true;
                true
            }
        });
        if began {
            self.cancel.store(false, Ordering::SeqCst);
            Ok(())
        } else {
            Err(JobError::AlreadyRunning(self.id))
        }
    }

    /// Stores the terminal state for this run and releases all result
    /// waiters.
    fn finish(&self, outcome: Result<Value, EngineError>) {
        let terminal = match outcome {
            Ok(value) => JobState::Completed(value),
            Err(err) if err.is_cancelled() => JobState::Cancelled,
            Err(err) => JobState::Failed(err.to_string()),
        };
        debug!(job = self.id, state = ?terminal, "script job finished");
        self.state.send_replace(terminal);
    }

    /// Blocks until the job reaches a terminal state and returns the
    /// stored result. Safe to call from any number of tasks and after
    /// the job already finished.
    ///
    /// # Errors
    ///
    /// [`JobError::Cancelled`] or [`JobError::Failed`] mirroring the
    /// terminal state.
    pub async fn wait_result(&self) -> Result<Value, JobError> {
        let mut rx = self.state.subscribe();
        loop {
            let snapshot = rx.borrow_and_update().clone();
            match snapshot {
                JobState::Completed(value) => return Ok(value),
                JobState::Failed(message) => return Err(JobError::Failed(message)),
                JobState::Cancelled => return Err(JobError::Cancelled),
                JobState::Idle | JobState::Running => {}
            }
            rx.changed()
                .await
                .map_err(|_| JobError::Failed("job state channel closed".to_string()))?;
        }
    }
}

/// Creates, starts, tracks, cancels and reaps script jobs.
pub struct JobManager {
    engine: Arc<dyn ScriptEngine>,
    keyboard: Arc<KeyboardController>,
    leds: Arc<LedMonitor>,
    next_id: AtomicU64,
    jobs: StdMutex<HashMap<u64, Arc<ScriptJob>>>,
}

impl JobManager {
    pub fn new(
        engine: Arc<dyn ScriptEngine>,
        keyboard: Arc<KeyboardController>,
        leds: Arc<LedMonitor>,
    ) -> Self {
        Self {
            engine,
            keyboard,
            leds,
            next_id: AtomicU64::new(0),
            jobs: StdMutex::new(HashMap::new()),
        }
    }

    /// Allocates and registers a fresh job with a unique, monotonic id.
    pub fn create_job(&self) -> Arc<ScriptJob> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let job = ScriptJob::new(id);
        self.jobs.lock().unwrap().insert(id, Arc::clone(&job));
        job
    }

    /// Looks up a tracked job.
    pub fn get(&self, id: u64) -> Option<Arc<ScriptJob>> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    /// Evaluates a script synchronously on the caller's task, blocking
    /// until it finishes. The run still goes through a registered job,
    /// so it shows up in `running_ids` and can be cancelled.
    pub async fn run_sync(&self, script: &str) -> Result<Value, JobError> {
        let job = self.create_job();
        self.run_sync_on(&job, script).await
    }

    /// Runs a script synchronously on an existing job instance.
    ///
    /// # Errors
    ///
    /// [`JobError::AlreadyRunning`] if that instance is mid-run.
    pub async fn run_sync_on(&self, job: &Arc<ScriptJob>, script: &str) -> Result<Value, JobError> {
        job.try_begin_run()?;
        let host = ScriptHost::new(
            Arc::clone(&self.keyboard),
            Arc::clone(&self.leds),
            job.cancel_flag(),
            job.id(),
        );
        let outcome = self.engine.eval(script, &host).await;
        job.finish(outcome);
        job.wait_result().await
    }

    /// Starts a script on a fresh background job and returns
    /// immediately with its id and handle.
    pub fn start_background(&self, script: &str) -> (u64, Arc<ScriptJob>) {
        let job = self.create_job();
        // A fresh idle job can always begin a run.
        let _ = self.start_background_on(&job, script);
        (job.id(), job)
    }

    /// Starts (or re-runs) a script on an existing job instance as a
    /// background task. The prior result is discarded.
    ///
    /// # Errors
    ///
    /// [`JobError::AlreadyRunning`] if that instance is mid-run;
    /// the current run is unaffected.
    pub fn start_background_on(
        &self,
        job: &Arc<ScriptJob>,
        script: &str,
    ) -> Result<(), JobError> {
        job.try_begin_run()?;

        let engine = Arc::clone(&self.engine);
        let keyboard = Arc::clone(&self.keyboard);
        let leds = Arc::clone(&self.leds);
        let job = Arc::clone(job);
        let script = script.to_string();
        info!(job = job.id(), "starting background script job");
        tokio::spawn(async move {
            let host = ScriptHost::new(keyboard, leds, job.cancel_flag(), job.id());
            let outcome = engine.eval(&script, &host).await;
            job.finish(outcome);
        });
        Ok(())
    }

    /// Signals cancellation to one job.
    ///
    /// # Errors
    ///
    /// [`JobError::NotFound`] for an untracked id.
    pub fn cancel(&self, id: u64) -> Result<(), JobError> {
        match self.get(id) {
            Some(job) => {
                info!(job = id, "cancelling script job");
                job.cancel();
                Ok(())
            }
            None => Err(JobError::NotFound(id)),
        }
    }

    /// Signals cancellation to every tracked job.
    pub fn cancel_all(&self) {
        let jobs: Vec<Arc<ScriptJob>> = self.jobs.lock().unwrap().values().cloned().collect();
        info!(count = jobs.len(), "cancelling all script jobs");
        for job in jobs {
            job.cancel();
        }
    }

    /// Blocks until the job with `id` leaves `Running` and returns its
    /// stored result.
    ///
    /// # Errors
    ///
    /// [`JobError::NotFound`] for an untracked id, otherwise the job's
    /// terminal outcome.
    pub async fn wait_result(&self, id: u64) -> Result<Value, JobError> {
        let job = self.get(id).ok_or(JobError::NotFound(id))?;
        job.wait_result().await
    }

    /// Ids of all jobs currently in `Running` state, ascending.
    pub fn running_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| job.is_working())
            .map(|job| job.id())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Reaps a finished job from the registry.
    ///
    /// # Errors
    ///
    /// [`JobError::NotFound`] for an untracked id,
    /// [`JobError::AlreadyRunning`] if the job is still running.
    pub fn remove(&self, id: u64) -> Result<(), JobError> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get(&id) {
            Some(job) if job.is_working() => Err(JobError::AlreadyRunning(id)),
            Some(_) => {
                jobs.remove(&id);
                Ok(())
            }
            None => Err(JobError::NotFound(id)),
        }
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        let jobs = self.jobs.lock().unwrap();
        let running = jobs.values().filter(|j| j.is_working()).count();
        if running > 0 {
            warn!(running, "job manager dropped with running jobs; signalling cancellation");
            for job in jobs.values() {
                job.cancel();
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
