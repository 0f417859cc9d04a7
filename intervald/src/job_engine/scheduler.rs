// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_channel::{Receiver, Sender};
use async_io::Timer;
use futures::executor::LocalPool;
use futures::future::{self, Either};
use futures::task::LocalSpawnExt;
use log::{debug, info, warn};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::history::{JobHistory, JobStatus};
use super::job::{is_misfire, Job, JobRun, JobSpec, Outcome};
use super::running_set::{RunPermit, RunningSet};
use super::worker_pool::{Task, WorkerPool};
use crate::error::SchedulerError;
use crate::logging::LogFacility;

pub const DEFAULT_MAX_WORKERS: usize = 20;

const SCHEDULER_THREAD_NAME: &str = "intervald-scheduler";
const WORKER_THREAD_PREFIX: &str = "intervald-worker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub max_workers: usize,
    /// Merge ticks missed in one wake-up into a single evaluation of the latest one.
    pub coalesce: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            coalesce: false,
        }
    }
}

struct ScheduledJob {
    spec: JobSpec,
    running: RunningSet,
    history: Mutex<JobHistory>,
    ticks: AtomicU64,
}

impl ScheduledJob {
    fn new(spec: JobSpec) -> Self {
        let running = RunningSet::new(spec.max_instances());
        Self {
            spec,
            running,
            history: Mutex::new(JobHistory::default()),
            ticks: AtomicU64::new(0),
        }
    }

    fn id(&self) -> &str {
        self.spec.id()
    }

    fn next_tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn history(&self) -> MutexGuard<'_, JobHistory> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, run: JobRun) {
        self.history().record(run);
    }

    fn status(&self) -> JobStatus {
        let history = self.history();
        JobStatus {
            id: self.spec.id().to_string(),
            interval_secs: self.spec.interval().as_secs_f64(),
            misfire_grace_time_secs: self.spec.misfire_grace_time().as_secs_f64(),
            max_instances: self.spec.max_instances(),
            running: self.running.current(),
            counts: history.counts(),
            last_run: history.last().cloned(),
        }
    }
}

/// A dispatched run whose outcome is not known yet.
struct PendingRun {
    job: Arc<ScheduledJob>,
    tick: u64,
    scheduled_time: OffsetDateTime,
    actual_start_time: Option<OffsetDateTime>,
}

impl PendingRun {
    fn into_run(self, outcome: Outcome) -> (Arc<ScheduledJob>, JobRun) {
        let run = JobRun {
            job_id: self.job.id().to_string(),
            tick: self.tick,
            scheduled_time: self.scheduled_time,
            actual_start_time: self.actual_start_time,
            finished_time: OffsetDateTime::now_utc(),
            outcome,
        };
        (self.job, run)
    }
}

/// State shared by the scheduling thread and the workers while running.
struct Shared {
    logger: Arc<dyn LogFacility>,
    accepting: AtomicBool,
    in_flight: Mutex<HashMap<u64, PendingRun>>,
    drained: Condvar,
    next_run_id: AtomicU64,
    origin: Instant,
    origin_wall: OffsetDateTime,
}

fn display_time(t: OffsetDateTime) -> String {
    t.format(&Rfc3339)
        .unwrap_or_else(|_| t.unix_timestamp().to_string())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

impl Shared {
    fn new(logger: Arc<dyn LogFacility>) -> Self {
        Self {
            logger,
            accepting: AtomicBool::new(true),
            in_flight: Mutex::new(HashMap::new()),
            drained: Condvar::new(),
            next_run_id: AtomicU64::new(1),
            origin: Instant::now(),
            origin_wall: OffsetDateTime::now_utc(),
        }
    }

    fn wall_time(&self, instant: Instant) -> OffsetDateTime {
        self.origin_wall + instant.saturating_duration_since(self.origin)
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<u64, PendingRun>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_unstarted(&self, job: &ScheduledJob, tick: u64, scheduled: Instant, outcome: Outcome) {
        job.record(JobRun {
            job_id: job.id().to_string(),
            tick,
            scheduled_time: self.wall_time(scheduled),
            actual_start_time: None,
            finished_time: OffsetDateTime::now_utc(),
            outcome,
        });
    }

    /// Never waits for a job.
    fn fire(self: &Arc<Self>, job: &Arc<ScheduledJob>, scheduled: Instant, queue: &Sender<Task>) {
        let tick = job.next_tick();
        let grace = job.spec.misfire_grace_time();

        let permit = match decide_tick(scheduled, Instant::now(), grace, &job.running) {
            TickDecision::Run(permit) => permit,
            TickDecision::Misfire(late_by) => {
                self.record_unstarted(job, tick, scheduled, Outcome::Misfired);
                self.logger.warning(&format!(
                    "Run time of job \"{}\" was missed by {:?}",
                    job.id(),
                    late_by
                ));
                return;
            }
            TickDecision::Skip => {
                self.record_unstarted(job, tick, scheduled, Outcome::Skipped);
                self.logger.warning(&format!(
                    "Execution of job \"{}\" skipped: maximum number of running instances reached ({})",
                    job.id(),
                    job.running.limit()
                ));
                return;
            }
        };

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        self.in_flight().insert(
            run_id,
            PendingRun {
                job: job.clone(),
                tick,
                scheduled_time: self.wall_time(scheduled),
                actual_start_time: None,
            },
        );

        let task: Task = {
            let shared = self.clone();
            let job = job.clone();
            Box::new(move || shared.execute(run_id, &job, scheduled, permit))
        };
        if let Err(rejected) = queue.try_send(task) {
            // the pool is closed; dropping the task releases the permit
            drop(rejected.into_inner());
            self.finish(run_id, Outcome::Aborted);
        }
    }

    /// Runs on a worker thread.
    fn execute(&self, run_id: u64, job: &ScheduledJob, scheduled: Instant, permit: RunPermit) {
        if !self.accepting.load(Ordering::Acquire) {
            drop(permit);
            self.finish(run_id, Outcome::Aborted);
            return;
        }

        let now = Instant::now();
        if is_misfire(scheduled, now, job.spec.misfire_grace_time()) {
            drop(permit);
            self.finish(run_id, Outcome::Misfired);
            self.logger.warning(&format!(
                "Run time of job \"{}\" was missed by {:?} while waiting for a worker",
                job.id(),
                now.saturating_duration_since(scheduled)
            ));
            return;
        }

        if !self.mark_started(run_id) {
            return;
        }
        debug!("Running job {:?} (run {})", job.id(), run_id);

        let result = panic::catch_unwind(AssertUnwindSafe(|| job.spec.run()));
        drop(permit);

        let outcome = match result {
            Ok(Ok(())) => Outcome::Completed,
            Ok(Err(err)) => Outcome::Failed(format!("{err:#}")),
            Err(payload) => Outcome::Failed(panic_message(payload.as_ref())),
        };
        if let Outcome::Failed(reason) = &outcome {
            self.logger.error(&format!(
                "Job \"{}\" raised an error (tick scheduled at {}): {}",
                job.id(),
                display_time(self.wall_time(scheduled)),
                reason
            ));
        }

        if !self.finish(run_id, outcome) {
            debug!(
                "Discarding late result of job {:?} (run {}), it was aborted at shutdown",
                job.id(),
                run_id
            );
        }
    }

    fn mark_started(&self, run_id: u64) -> bool {
        match self.in_flight().get_mut(&run_id) {
            Some(pending) => {
                pending.actual_start_time = Some(OffsetDateTime::now_utc());
                true
            }
            None => false,
        }
    }

    /// Records the outcome of a pending run. Returns false if the run was
    /// already given up by `stop`.
    fn finish(&self, run_id: u64, outcome: Outcome) -> bool {
        let pending = {
            let mut in_flight = self.in_flight();
            let pending = in_flight.remove(&run_id);
            if in_flight.is_empty() {
                self.drained.notify_all();
            }
            pending
        };
        match pending {
            Some(pending) => {
                let (job, run) = pending.into_run(outcome);
                job.record(run);
                true
            }
            None => false,
        }
    }

    /// Waits until no run is pending or `deadline` passes, then hands out
    /// whatever is still pending. Without a deadline it waits for all runs.
    fn drain_until(&self, deadline: Option<Instant>) -> Vec<(u64, PendingRun)> {
        let mut in_flight = self.in_flight();
        loop {
            if in_flight.is_empty() {
                return Vec::new();
            }
            in_flight = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    self.drained
                        .wait_timeout(in_flight, deadline - now)
                        .map(|(guard, _timeout)| guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner().0)
                }
                None => self
                    .drained
                    .wait(in_flight)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            };
        }
        let mut abandoned: Vec<(u64, PendingRun)> = in_flight.drain().collect();
        abandoned.sort_by_key(|(run_id, _)| *run_id);
        abandoned
    }
}

#[derive(Debug)]
pub(crate) enum TickDecision {
    Run(RunPermit),
    /// Late by more than the grace time.
    Misfire(Duration),
    /// All `max_instances` slots are taken.
    Skip,
}

/// Run / skip / misfire for a tick scheduled at `scheduled` and evaluated at
/// `now`. A misfire wins over a skip; `Run` holds the taken slot.
pub(crate) fn decide_tick(
    scheduled: Instant,
    now: Instant,
    grace: Duration,
    running: &RunningSet,
) -> TickDecision {
    if is_misfire(scheduled, now, grace) {
        return TickDecision::Misfire(now.saturating_duration_since(scheduled));
    }
    match running.try_acquire() {
        Some(permit) => TickDecision::Run(permit),
        None => TickDecision::Skip,
    }
}

/// Ticks due at `now`, oldest first, starting at `*next`. Advances `*next`
/// to the first tick after `now`, or to `None` once the next tick is beyond
/// the range of `Instant`. With `coalesce` only the latest is kept.
pub(crate) fn due_ticks(
    next: &mut Option<Instant>,
    now: Instant,
    interval: Duration,
    coalesce: bool,
) -> Vec<Instant> {
    let mut due = Vec::new();
    while let Some(tick) = *next {
        if tick > now {
            break;
        }
        due.push(tick);
        *next = tick.checked_add(interval);
    }
    if coalesce && due.len() > 1 {
        debug!("Coalescing {} missed ticks", due.len());
        due.drain(..due.len() - 1);
    }
    due
}

/// The tick loop of one job on the scheduling thread.
async fn job_tick_loop(
    job: Arc<ScheduledJob>,
    shared: Arc<Shared>,
    queue: Sender<Task>,
    stop_rx: Receiver<()>,
    coalesce: bool,
) {
    let interval = job.spec.interval();
    let mut next = shared.origin.checked_add(interval);
    debug!("Starting tick loop for job {:?}", job.id());

    loop {
        let Some(at) = next else {
            shared.logger.warning(&format!(
                "Next run time of job \"{}\" is out of range, no further runs",
                job.id()
            ));
            let _ = stop_rx.recv().await;
            break;
        };
        let stopped = Box::pin(stop_rx.recv());
        if let Either::Right(_) = future::select(Timer::at(at), stopped).await {
            break;
        }

        for scheduled in due_ticks(&mut next, Instant::now(), interval, coalesce) {
            shared.fire(&job, scheduled, &queue);
        }
    }
    debug!("Tick loop for job {:?} ended", job.id());
}

fn run_scheduling_thread(
    jobs: Vec<Arc<ScheduledJob>>,
    shared: Arc<Shared>,
    queue: Sender<Task>,
    stop_rx: Receiver<()>,
    coalesce: bool,
) {
    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    for job in jobs {
        let tick_loop = job_tick_loop(
            job,
            shared.clone(),
            queue.clone(),
            stop_rx.clone(),
            coalesce,
        );
        if let Err(e) = spawner.spawn_local(tick_loop) {
            warn!("Failed to spawn tick loop: {e}");
        }
    }
    drop(queue);
    pool.run(); // blocks until every tick loop has ended
    debug!("Scheduling thread shutting down");
}

struct Runtime {
    shared: Arc<Shared>,
    stop_tx: Sender<()>,
    scheduling_thread: Option<JoinHandle<()>>,
    pool: WorkerPool,
}

impl Runtime {
    fn shutdown(mut self, drain_timeout: Duration) -> usize {
        // beyond the range of `Instant` means no deadline
        let deadline = Instant::now().checked_add(drain_timeout);
        self.shared.accepting.store(false, Ordering::Release);
        self.stop_tx.close();
        if let Some(handle) = self.scheduling_thread.take() {
            if handle.join().is_err() {
                warn!("Scheduling thread panicked");
            }
        }
        self.pool.close();

        let abandoned = self.shared.drain_until(deadline);
        let count = abandoned.len();
        for (run_id, pending) in abandoned {
            let (job, run) = pending.into_run(Outcome::Aborted);
            self.shared.logger.warning(&format!(
                "Run {} of job \"{}\" (tick scheduled at {}) still pending at shutdown, abandoned",
                run_id,
                job.id(),
                display_time(run.scheduled_time)
            ));
            job.record(run);
        }
        count
    }
}

enum State {
    Idle,
    Running(Runtime),
    Stopped,
}

/// Fires registered jobs at fixed intervals on a bounded worker pool.
///
/// Jobs are registered before `start()`. Each job gets its own tick loop on a
/// single scheduling thread; the loops only decide and enqueue, the callables
/// run on the worker threads.
pub struct TaskScheduler {
    config: SchedulerConfig,
    logger: Arc<dyn LogFacility>,
    jobs: Vec<Arc<ScheduledJob>>,
    state: State,
}

impl TaskScheduler {
    pub fn new(config: SchedulerConfig, logger: Arc<dyn LogFacility>) -> Self {
        Self {
            config,
            logger,
            jobs: Vec::new(),
            state: State::Idle,
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    pub fn register(&mut self, spec: JobSpec) -> Result<(), SchedulerError> {
        match self.state {
            State::Idle => {}
            State::Running(_) => return Err(SchedulerError::AlreadyStarted),
            State::Stopped => return Err(SchedulerError::Stopped),
        }
        spec.validate()?;
        if self.jobs.iter().any(|job| job.id() == spec.id()) {
            return Err(SchedulerError::DuplicateJob(spec.id().to_string()));
        }
        debug!("Registered {:?}", spec);
        self.jobs.push(Arc::new(ScheduledJob::new(spec)));
        Ok(())
    }

    /// Registration with plain seconds, as read from configuration.
    pub fn register_interval<F>(
        &mut self,
        id: &str,
        interval_seconds: f64,
        misfire_grace_time_seconds: f64,
        max_instances: usize,
        callable: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let interval = Duration::try_from_secs_f64(interval_seconds)
            .map_err(|_| SchedulerError::InvalidInterval { id: id.to_string() })?;
        let grace = Duration::try_from_secs_f64(misfire_grace_time_seconds)
            .map_err(|_| SchedulerError::InvalidMisfireGraceTime { id: id.to_string() })?;
        self.register(
            JobSpec::new(id, interval, callable)
                .with_misfire_grace_time(grace)
                .with_max_instances(max_instances),
        )
    }

    /// Registers an already shared job implementation.
    pub fn register_job(
        &mut self,
        id: &str,
        interval: Duration,
        misfire_grace_time: Duration,
        max_instances: usize,
        job: Arc<dyn Job>,
    ) -> Result<(), SchedulerError> {
        self.register(
            JobSpec::from_arc(id, interval, job)
                .with_misfire_grace_time(misfire_grace_time)
                .with_max_instances(max_instances),
        )
    }

    /// Starts the worker pool and the tick loops. Calling it while running does nothing.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        match self.state {
            State::Idle => {}
            State::Running(_) => return Ok(()),
            State::Stopped => return Err(SchedulerError::Stopped),
        }
        if self.config.max_workers == 0 {
            return Err(SchedulerError::InvalidPoolSize);
        }

        let pool = WorkerPool::spawn(self.config.max_workers, WORKER_THREAD_PREFIX)
            .map_err(SchedulerError::Spawn)?;
        let shared = Arc::new(Shared::new(self.logger.clone()));
        let (stop_tx, stop_rx) = async_channel::bounded::<()>(1);

        let jobs = self.jobs.clone();
        let shared_for_thread = shared.clone();
        let queue = pool.queue();
        let coalesce = self.config.coalesce;
        let scheduling_thread = thread::Builder::new()
            .name(SCHEDULER_THREAD_NAME.to_string())
            .spawn(move || run_scheduling_thread(jobs, shared_for_thread, queue, stop_rx, coalesce))
            .map_err(|e| {
                pool.close();
                SchedulerError::Spawn(e)
            })?;

        info!(
            "Scheduler started with {} job(s) on {} worker(s)",
            self.jobs.len(),
            pool.size()
        );
        self.state = State::Running(Runtime {
            shared,
            stop_tx,
            scheduling_thread: Some(scheduling_thread),
            pool,
        });
        Ok(())
    }

    /// Stops firing, waits up to `drain_timeout` for pending runs and records
    /// the ones still pending after that as aborted. Returns their number.
    /// Running callables are left to finish on their own.
    pub fn stop(&mut self, drain_timeout: Duration) -> usize {
        match std::mem::replace(&mut self.state, State::Stopped) {
            State::Running(runtime) => {
                let aborted = runtime.shutdown(drain_timeout);
                info!("Scheduler stopped, {} run(s) aborted", aborted);
                aborted
            }
            State::Idle => {
                self.state = State::Idle;
                0
            }
            State::Stopped => 0,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    pub fn job_ids(&self) -> Vec<String> {
        self.jobs.iter().map(|job| job.id().to_string()).collect()
    }

    pub fn history(&self, id: &str) -> Option<Vec<JobRun>> {
        self.find(id).map(|job| job.history().runs())
    }

    pub fn job_status(&self, id: &str) -> Option<JobStatus> {
        self.find(id).map(|job| job.status())
    }

    pub fn status(&self) -> Vec<JobStatus> {
        self.jobs.iter().map(|job| job.status()).collect()
    }

    fn find(&self, id: &str) -> Option<&Arc<ScheduledJob>> {
        self.jobs.iter().find(|job| job.id() == id)
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop(Duration::ZERO);
        }
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("config", &self.config)
            .field("jobs", &self.job_ids())
            .field("running", &self.is_running())
            .finish()
    }
}
