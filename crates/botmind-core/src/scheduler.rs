//! Cross-agent priority task scheduler.
//!
//! Tasks carry an agent, a priority in `[0, 1]`, and a monotonic
//! [`TaskId`]. [`TaskScheduler::process_cycle`] runs every task queued
//! when the cycle starts, highest priority first and, among equal
//! priorities, in submission order. Tasks submitted while a cycle runs
//! wait for the next one.
//!
//! Cancellation is cooperative and scoped to the owning agent: a cancelled
//! task stays in the heap and is discarded when the cycle reaches it. A
//! task whose agent is unknown to the state machine or disconnected is
//! skipped without running. A task that panics is recorded as errored and
//! the cycle carries on.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeSet, BinaryHeap, HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use botmind_types::{ActivityState, AgentId, TaskId, clamp_unit};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::TimeSource;
use crate::state_machine::StateMachine;
use crate::world::{CollaboratorError, panic_message};

/// Why a task did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The task reported a failure of its own.
    #[error("task failed: {message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },

    /// A collaborator failed while the task ran.
    #[error("collaborator failed: {source}")]
    Collaborator {
        /// The underlying collaborator error.
        #[from]
        source: CollaboratorError,
    },

    /// The task panicked.
    #[error("task panicked: {message}")]
    Panicked {
        /// The panic payload, when it was a string.
        message: String,
    },
}

/// Why the scheduler refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// The scheduler has been shut down.
    #[error("scheduler is stopped")]
    Stopped,
}

/// A unit of work run on behalf of an agent.
///
/// `Ok(true)` is a completion, `Ok(false)` a failure, `Err` a failure with
/// a cause.
pub trait Task: Send + Sync {
    /// Run the task for `agent`.
    fn run(&self, agent: AgentId) -> Result<bool, TaskError>;
}

impl<F> Task for F
where
    F: Fn(AgentId) -> Result<bool, TaskError> + Send + Sync,
{
    fn run(&self, agent: AgentId) -> Result<bool, TaskError> {
        self(agent)
    }
}

/// How a dequeued task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The task ran and reported success.
    Completed,
    /// The task ran and reported failure.
    Failed,
    /// The task ran and returned an error or panicked.
    Errored,
    /// The task was dropped because its agent is unregistered or
    /// disconnected.
    Skipped,
}

/// One entry of the execution history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    /// The task.
    pub id: TaskId,
    /// Its agent.
    pub agent: AgentId,
    /// Its priority.
    pub priority: f64,
    /// How it ended.
    pub outcome: TaskOutcome,
    /// When it was submitted.
    pub scheduled_at: DateTime<Utc>,
    /// When it left the queue.
    pub finished_at: DateTime<Utc>,
}

/// Aggregate scheduler counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Whether the scheduler accepts tasks.
    pub running: bool,
    /// Tasks waiting and not cancelled.
    pub queued: usize,
    /// Tasks accepted since construction.
    pub submitted: u64,
    /// Tasks that ran.
    pub executed: u64,
    /// Tasks that ran and succeeded.
    pub completed: u64,
    /// Tasks that ran and failed, with or without an error.
    pub failed: u64,
    /// Tasks that ran and returned an error.
    pub errors: u64,
    /// Tasks cancelled before running.
    pub cancelled: u64,
    /// Tasks dropped for an unregistered or disconnected agent.
    pub skipped: u64,
}

/// Per-agent scheduler counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgentTaskStats {
    /// Tasks waiting and not cancelled.
    pub queued: usize,
    /// Tasks accepted for this agent.
    pub submitted: u64,
    /// Tasks that ran and succeeded.
    pub completed: u64,
    /// Tasks that ran and failed.
    pub failed: u64,
    /// Tasks cancelled before running.
    pub cancelled: u64,
    /// Tasks dropped without running.
    pub skipped: u64,
}

/// A heap entry.
struct QueuedTask {
    id: TaskId,
    agent: AgentId,
    priority: f64,
    scheduled_at: DateTime<Utc>,
    cancelled: Arc<AtomicBool>,
    task: Arc<dyn Task>,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    /// Higher priority is greater; among equals, the older id is greater.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Bookkeeping for a task that has not left the queue.
#[derive(Debug)]
struct Pending {
    agent: AgentId,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct Inner {
    queue: BinaryHeap<QueuedTask>,
    pending: HashMap<TaskId, Pending>,
    by_agent: HashMap<AgentId, BTreeSet<TaskId>>,
    agent_stats: HashMap<AgentId, AgentTaskStats>,
    history: VecDeque<TaskRecord>,
}

impl Inner {
    /// Forget a pending task. Returns its bookkeeping if it was pending.
    fn release(&mut self, id: TaskId) -> Option<Pending> {
        let pending = self.pending.remove(&id)?;
        if let Some(ids) = self.by_agent.get_mut(&pending.agent) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_agent.remove(&pending.agent);
            }
        }
        Some(pending)
    }

    fn agent_entry(&mut self, agent: AgentId) -> &mut AgentTaskStats {
        self.agent_stats.entry(agent).or_default()
    }
}

/// Global priority queue of agent tasks.
pub struct TaskScheduler {
    states: Arc<StateMachine>,
    clock: Arc<dyn TimeSource>,
    history_limit: usize,
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    running: AtomicBool,
    submitted: AtomicU64,
    executed: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    errors: AtomicU64,
    cancelled: AtomicU64,
    skipped: AtomicU64,
}

impl core::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("statistics", &self.statistics())
            .finish_non_exhaustive()
    }
}

impl TaskScheduler {
    /// Create a running scheduler keeping the newest `history_limit`
    /// execution records.
    pub fn new(states: Arc<StateMachine>, clock: Arc<dyn TimeSource>, history_limit: usize) -> Self {
        Self {
            states,
            clock,
            history_limit,
            inner: Mutex::new(Inner::default()),
            next_id: AtomicU64::new(1),
            running: AtomicBool::new(true),
            submitted: AtomicU64::new(0),
            executed: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Accept tasks again after a shutdown.
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::AcqRel) {
            info!("Task scheduler started");
        }
    }

    /// Stop accepting tasks and cancel everything queued. Returns the
    /// number of tasks cancelled.
    pub fn shutdown(&self) -> usize {
        self.running.store(false, Ordering::Release);
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let ids: Vec<TaskId> = inner.pending.keys().copied().collect();
        let count = ids
            .into_iter()
            .filter(|&id| Self::cancel_locked(&mut inner, id))
            .count();
        drop(inner);
        self.add_cancelled(count);
        info!(cancelled = count, "Task scheduler shut down");
        count
    }

    /// Whether the scheduler accepts tasks.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Queue a task. The priority is clamped into `[0, 1]`.
    pub fn add_task<T>(&self, agent: AgentId, task: T, priority: f64) -> Result<TaskId, SchedulerError>
    where
        T: Task + 'static,
    {
        if !self.is_running() {
            return Err(SchedulerError::Stopped);
        }
        let id = TaskId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let priority = clamp_unit(priority);
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.queue.push(QueuedTask {
            id,
            agent,
            priority,
            scheduled_at: self.clock.now(),
            cancelled: Arc::clone(&cancelled),
            task: Arc::new(task),
        });
        inner.pending.insert(id, Pending { agent, cancelled });
        inner.by_agent.entry(agent).or_default().insert(id);
        let stats = inner.agent_entry(agent);
        stats.submitted = stats.submitted.saturating_add(1);
        drop(inner);

        self.submitted.fetch_add(1, Ordering::Relaxed);
        debug!(%agent, task = %id, priority, "Task scheduled");
        Ok(id)
    }

    /// Cancel one of an agent's queued tasks. Returns `false` if the task
    /// already ran, was already cancelled, never existed, or belongs to
    /// another agent.
    pub fn cancel_task(&self, agent: AgentId, id: TaskId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let owned = inner.pending.get(&id).is_some_and(|p| p.agent == agent);
        let cancelled = owned && Self::cancel_locked(&mut inner, id);
        drop(inner);
        if cancelled {
            self.add_cancelled(1);
            debug!(%agent, task = %id, "Task cancelled");
        }
        cancelled
    }

    /// Cancel every queued task of an agent. Returns how many were cancelled.
    pub fn cancel_all(&self, agent: AgentId) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let ids: Vec<TaskId> = inner
            .by_agent
            .get(&agent)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        let count = ids
            .into_iter()
            .filter(|&id| Self::cancel_locked(&mut inner, id))
            .count();
        drop(inner);
        self.add_cancelled(count);
        if count > 0 {
            debug!(%agent, cancelled = count, "Agent tasks cancelled");
        }
        count
    }

    /// Cancel an agent's queued tasks and drop its counters. Returns how
    /// many tasks were cancelled.
    pub fn forget_agent(&self, agent: AgentId) -> usize {
        let cancelled = self.cancel_all(agent);
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .agent_stats
            .remove(&agent);
        debug!(%agent, cancelled, "Agent forgotten by scheduler");
        cancelled
    }

    /// Run every task queued at the start of the cycle. Returns how many
    /// tasks were executed; cancelled and skipped tasks are not counted.
    pub fn process_cycle(&self) -> usize {
        if !self.is_running() {
            return 0;
        }
        let batch = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            core::mem::take(&mut inner.queue).into_sorted_vec()
        };

        let mut executed = 0_usize;
        for queued in batch.into_iter().rev() {
            if queued.cancelled.load(Ordering::Acquire) {
                continue;
            }
            if !self.dequeue(queued.id) {
                continue;
            }

            let outcome = if self.agent_reachable(queued.agent) {
                executed = executed.saturating_add(1);
                self.execute(&queued)
            } else {
                debug!(agent = %queued.agent, task = %queued.id, "Task skipped, agent unavailable");
                TaskOutcome::Skipped
            };
            self.record(&queued, outcome);
        }

        if executed > 0 {
            debug!(executed, "Scheduler cycle processed");
        }
        executed
    }

    /// Tasks waiting and not cancelled.
    pub fn queued(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }

    /// Ids of an agent's queued tasks, oldest first.
    pub fn pending_tasks(&self, agent: AgentId) -> Vec<TaskId> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_agent
            .get(&agent)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Execution history, oldest first.
    pub fn history(&self) -> Vec<TaskRecord> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.history.iter().cloned().collect()
    }

    /// Aggregate counters.
    pub fn statistics(&self) -> SchedulerStats {
        SchedulerStats {
            running: self.is_running(),
            queued: self.queued(),
            submitted: self.submitted.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    /// Counters for one agent, if it ever had a task.
    pub fn agent_stats(&self, agent: AgentId) -> Option<AgentTaskStats> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stats = inner.agent_stats.get(&agent)?.clone();
        stats.queued = inner.by_agent.get(&agent).map_or(0, BTreeSet::len);
        Some(stats)
    }

    fn cancel_locked(inner: &mut Inner, id: TaskId) -> bool {
        let Some(pending) = inner.release(id) else {
            return false;
        };
        pending.cancelled.store(true, Ordering::Release);
        let stats = inner.agent_entry(pending.agent);
        stats.cancelled = stats.cancelled.saturating_add(1);
        true
    }

    /// Remove a task from the pending set as it leaves the heap. Returns
    /// `false` if it was cancelled in the meantime.
    fn dequeue(&self, id: TaskId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.release(id).is_some()
    }

    fn agent_reachable(&self, agent: AgentId) -> bool {
        self.states
            .state(agent)
            .is_some_and(|state| state != ActivityState::Disconnected)
    }

    fn execute(&self, queued: &QueuedTask) -> TaskOutcome {
        self.executed.fetch_add(1, Ordering::Relaxed);
        let result = panic::catch_unwind(AssertUnwindSafe(|| queued.task.run(queued.agent)))
            .unwrap_or_else(|payload| {
                Err(TaskError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            });
        match result {
            Ok(true) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                TaskOutcome::Completed
            }
            Ok(false) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                debug!(agent = %queued.agent, task = %queued.id, "Task reported failure");
                TaskOutcome::Failed
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(agent = %queued.agent, task = %queued.id, error = %e, "Task errored");
                TaskOutcome::Errored
            }
        }
    }

    fn record(&self, queued: &QueuedTask, outcome: TaskOutcome) {
        if outcome == TaskOutcome::Skipped {
            self.skipped.fetch_add(1, Ordering::Relaxed);
        }
        let record = TaskRecord {
            id: queued.id,
            agent: queued.agent,
            priority: queued.priority,
            outcome,
            scheduled_at: queued.scheduled_at,
            finished_at: self.clock.now(),
        };

        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let stats = inner.agent_entry(queued.agent);
        match outcome {
            TaskOutcome::Completed => stats.completed = stats.completed.saturating_add(1),
            TaskOutcome::Failed | TaskOutcome::Errored => {
                stats.failed = stats.failed.saturating_add(1);
            }
            TaskOutcome::Skipped => stats.skipped = stats.skipped.saturating_add(1),
        }
        if self.history_limit > 0 {
            while inner.history.len() >= self.history_limit {
                inner.history.pop_front();
            }
            inner.history.push_back(record);
        }
    }

    fn add_cancelled(&self, count: usize) {
        let count = u64::try_from(count).unwrap_or(u64::MAX);
        self.cancelled.fetch_add(count, Ordering::Relaxed);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    struct Fixture {
        states: Arc<StateMachine>,
        scheduler: Arc<TaskScheduler>,
    }

    fn fixture(history_limit: usize) -> Fixture {
        let clock: Arc<dyn TimeSource> = Arc::new(ManualClock::at_epoch());
        let states = Arc::new(StateMachine::new(Arc::clone(&clock), 100));
        let scheduler = Arc::new(TaskScheduler::new(Arc::clone(&states), clock, history_limit));
        Fixture { states, scheduler }
    }

    fn registered(f: &Fixture, raw: u64) -> AgentId {
        let agent = AgentId::new(raw);
        assert!(f.states.register(agent).is_ok());
        agent
    }

    type Log = Arc<Mutex<Vec<u32>>>;

    fn logging_task(log: &Log, label: u32) -> impl Task + 'static {
        let log = Arc::clone(log);
        move |_agent: AgentId| -> Result<bool, TaskError> {
            log.lock().unwrap_or_else(PoisonError::into_inner).push(label);
            Ok(true)
        }
    }

    fn entries(log: &Log) -> Vec<u32> {
        log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[test]
    fn runs_by_priority_then_submission_order() {
        let f = fixture(16);
        let agent = registered(&f, 1);
        let log: Log = Arc::default();
        for (label, priority) in [(1, 0.2), (2, 0.9), (3, 0.5), (4, 0.9), (5, 0.2)] {
            assert!(f.scheduler.add_task(agent, logging_task(&log, label), priority).is_ok());
        }

        assert_eq!(f.scheduler.process_cycle(), 5);
        assert_eq!(entries(&log), vec![2, 4, 3, 1, 5]);
        assert_eq!(f.scheduler.queued(), 0);
    }

    #[test]
    fn ids_are_monotonic_and_priorities_clamped() {
        let f = fixture(16);
        let agent = registered(&f, 1);
        let log: Log = Arc::default();
        let a = f.scheduler.add_task(agent, logging_task(&log, 1), 7.0);
        let b = f.scheduler.add_task(agent, logging_task(&log, 2), -1.0);
        assert!(matches!((a, b), (Ok(a), Ok(b)) if a < b));

        f.scheduler.process_cycle();
        let history = f.scheduler.history();
        assert_eq!(history.len(), 2);
        assert!(history.first().is_some_and(|r| (r.priority - 1.0).abs() < 1e-9));
        assert!(history.get(1).is_some_and(|r| r.priority.abs() < 1e-9));
    }

    #[test]
    fn cancelled_tasks_never_run() {
        let f = fixture(16);
        let agent = registered(&f, 1);
        let log: Log = Arc::default();
        assert!(f.scheduler.add_task(agent, logging_task(&log, 1), 0.5).is_ok());
        let drop_me = f.scheduler.add_task(agent, logging_task(&log, 2), 0.9).unwrap();

        assert!(f.scheduler.cancel_task(agent, drop_me));
        assert!(!f.scheduler.cancel_task(agent, drop_me), "second cancel is a no-op");
        assert_eq!(f.scheduler.process_cycle(), 1);
        assert_eq!(entries(&log), vec![1]);

        let stats = f.scheduler.statistics();
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.executed, 1);
    }

    #[test]
    fn cancel_is_scoped_to_the_owning_agent() {
        let f = fixture(16);
        let owner = registered(&f, 1);
        let other = registered(&f, 2);
        let log: Log = Arc::default();
        let id = f.scheduler.add_task(owner, logging_task(&log, 1), 0.5).unwrap();

        assert!(!f.scheduler.cancel_task(other, id));
        assert_eq!(f.scheduler.pending_tasks(owner), vec![id]);
        assert_eq!(f.scheduler.statistics().cancelled, 0);

        assert!(f.scheduler.cancel_task(owner, id));
        assert_eq!(f.scheduler.process_cycle(), 0);
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn panicking_task_does_not_strand_the_cycle() {
        let f = fixture(16);
        let agent = registered(&f, 1);
        let log: Log = Arc::default();
        #[allow(clippy::panic)]
        let crash = |_: AgentId| -> Result<bool, TaskError> { panic!("task body crashed") };
        assert!(f.scheduler.add_task(agent, crash, 0.9).is_ok());
        assert!(f.scheduler.add_task(agent, logging_task(&log, 2), 0.5).is_ok());

        assert_eq!(f.scheduler.process_cycle(), 2);
        assert_eq!(entries(&log), vec![2]);
        assert_eq!(f.scheduler.queued(), 0);
        assert!(f.scheduler.pending_tasks(agent).is_empty());

        let stats = f.scheduler.statistics();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.errors, 1);
        let outcomes: Vec<TaskOutcome> = f.scheduler.history().iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes, vec![TaskOutcome::Errored, TaskOutcome::Completed]);
    }

    #[test]
    fn forget_agent_cancels_and_drops_counters() {
        let f = fixture(16);
        let gone = registered(&f, 1);
        let stays = registered(&f, 2);
        let log: Log = Arc::default();
        assert!(f.scheduler.add_task(gone, logging_task(&log, 1), 0.5).is_ok());
        assert!(f.scheduler.add_task(gone, logging_task(&log, 2), 0.5).is_ok());
        assert!(f.scheduler.add_task(stays, logging_task(&log, 3), 0.5).is_ok());

        assert_eq!(f.scheduler.forget_agent(gone), 2);
        assert!(f.scheduler.agent_stats(gone).is_none());
        assert!(f.scheduler.agent_stats(stays).is_some());
        assert_eq!(f.scheduler.process_cycle(), 1);
        assert_eq!(entries(&log), vec![3]);
        assert_eq!(f.scheduler.forget_agent(gone), 0);
    }

    #[test]
    fn cancel_all_targets_one_agent() {
        let f = fixture(16);
        let a = registered(&f, 1);
        let b = registered(&f, 2);
        let log: Log = Arc::default();
        for label in 0..3 {
            assert!(f.scheduler.add_task(a, logging_task(&log, label), 0.5).is_ok());
        }
        assert!(f.scheduler.add_task(b, logging_task(&log, 10), 0.1).is_ok());
        assert_eq!(f.scheduler.pending_tasks(a).len(), 3);

        assert_eq!(f.scheduler.cancel_all(a), 3);
        assert_eq!(f.scheduler.cancel_all(a), 0);
        assert_eq!(f.scheduler.process_cycle(), 1);
        assert_eq!(entries(&log), vec![10]);

        let stats_a = f.scheduler.agent_stats(a);
        assert_eq!(stats_a.as_ref().map(|s| s.cancelled), Some(3));
        assert_eq!(stats_a.map(|s| s.queued), Some(0));
    }

    #[test]
    fn unavailable_agents_are_skipped() {
        let f = fixture(16);
        let online = registered(&f, 1);
        let offline = registered(&f, 2);
        let ghost = AgentId::new(3);
        assert!(f.states.transition(offline, ActivityState::Disconnected, "Logout"));

        let log: Log = Arc::default();
        assert!(f.scheduler.add_task(online, logging_task(&log, 1), 0.5).is_ok());
        assert!(f.scheduler.add_task(offline, logging_task(&log, 2), 0.9).is_ok());
        assert!(f.scheduler.add_task(ghost, logging_task(&log, 3), 0.9).is_ok());

        assert_eq!(f.scheduler.process_cycle(), 1);
        assert_eq!(entries(&log), vec![1]);
        let stats = f.scheduler.statistics();
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.queued, 0);
        assert_eq!(
            f.scheduler.agent_stats(offline).map(|s| s.skipped),
            Some(1)
        );
    }

    #[test]
    fn failures_and_errors_are_accounted() {
        let f = fixture(16);
        let agent = registered(&f, 1);
        assert!(f.scheduler.add_task(agent, |_: AgentId| -> Result<bool, TaskError> { Ok(true) }, 0.5).is_ok());
        assert!(f.scheduler.add_task(agent, |_: AgentId| -> Result<bool, TaskError> { Ok(false) }, 0.5).is_ok());
        assert!(
            f.scheduler
                .add_task(
                    agent,
                    |a: AgentId| -> Result<bool, TaskError> {
                        Err(CollaboratorError::UnknownAgent { agent: a }.into())
                    },
                    0.5,
                )
                .is_ok()
        );

        assert_eq!(f.scheduler.process_cycle(), 3);
        let stats = f.scheduler.statistics();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.errors, 1);
        let outcomes: Vec<TaskOutcome> = f.scheduler.history().iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![TaskOutcome::Completed, TaskOutcome::Failed, TaskOutcome::Errored]
        );
    }

    #[test]
    fn tasks_added_during_a_cycle_wait_for_the_next() {
        let f = fixture(16);
        let agent = registered(&f, 1);
        let log: Log = Arc::default();
        let scheduler = Arc::clone(&f.scheduler);
        let inner_log = Arc::clone(&log);
        let spawner = move |a: AgentId| -> Result<bool, TaskError> {
            let follow_up = logging_task(&inner_log, 2);
            scheduler
                .add_task(a, follow_up, 1.0)
                .map(|_| true)
                .map_err(|e| TaskError::Failed {
                    message: e.to_string(),
                })
        };
        assert!(f.scheduler.add_task(agent, spawner, 0.5).is_ok());

        assert_eq!(f.scheduler.process_cycle(), 1);
        assert!(entries(&log).is_empty());
        assert_eq!(f.scheduler.process_cycle(), 1);
        assert_eq!(entries(&log), vec![2]);
    }

    #[test]
    fn history_keeps_the_newest_records() {
        let f = fixture(2);
        let agent = registered(&f, 1);
        let mut ids = Vec::new();
        for _ in 0..4 {
            if let Ok(id) = f.scheduler.add_task(agent, |_: AgentId| -> Result<bool, TaskError> { Ok(true) }, 0.5) {
                ids.push(id);
            }
        }
        f.scheduler.process_cycle();
        let kept: Vec<TaskId> = f.scheduler.history().iter().map(|r| r.id).collect();
        assert_eq!(kept, ids.get(2..).map(<[TaskId]>::to_vec).unwrap_or_default());
    }

    #[test]
    fn shutdown_cancels_and_rejects_until_restarted() {
        let f = fixture(16);
        let agent = registered(&f, 1);
        let log: Log = Arc::default();
        assert!(f.scheduler.add_task(agent, logging_task(&log, 1), 0.5).is_ok());
        assert!(f.scheduler.add_task(agent, logging_task(&log, 2), 0.5).is_ok());

        assert_eq!(f.scheduler.shutdown(), 2);
        assert!(!f.scheduler.is_running());
        assert_eq!(
            f.scheduler.add_task(agent, logging_task(&log, 3), 0.5),
            Err(SchedulerError::Stopped)
        );
        assert_eq!(f.scheduler.process_cycle(), 0);

        f.scheduler.start();
        assert!(f.scheduler.add_task(agent, logging_task(&log, 4), 0.5).is_ok());
        assert_eq!(f.scheduler.process_cycle(), 1);
        assert_eq!(entries(&log), vec![4]);
    }
}
