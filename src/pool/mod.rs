//! Task dispatch pool for parsing export documents off the caller's thread.
//!
//! # Architecture
//!
//! ```text
//! dispatch() ─► round-robin ─► unit 0 ─┐
//!                           └► unit 1 ─┼─► complete() ─► TaskHandle
//!                           └► unit N ─┘        │
//!                                               └─► PoolEvent broadcast
//! ```
//!
//! Units are started on first dispatch and never resized. When background
//! units are disabled or cannot be spawned, tasks run synchronously inside
//! `dispatch` with the same progress stages and cancellation checks.
//!
//! Every task resolves exactly once: with a snapshot, a structured failure,
//! or `Canceled`. Bookkeeping lives behind a mutex so several callers may
//! dispatch and cancel concurrently.

pub mod cancel;
pub mod events;
pub mod pipeline;
pub mod stats;
pub mod task;
mod unit;

pub use cancel::CancellationToken;
pub use events::{PoolEvent, ProgressStage};
pub use pipeline::{run_pipeline, OtlpJsonParser, SnapshotParser};
pub use stats::{PoolStats, PoolStatsSnapshot};
pub use task::{FailureKind, ParseTask, ParserFailure, TaskContext, TaskHandle, TaskId, TaskOutcome};

use crate::core::PoolConfig;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use unit::{Control, Job, PingGuard, UnitHandle, UnitMessage};

/// Bookkeeping for a task that has not resolved yet
struct InFlight {
    context: TaskContext,
    /// `None` when running on the synchronous path
    unit: Option<usize>,
    token: CancellationToken,
    responder: oneshot::Sender<TaskOutcome>,
    ping: Option<PingGuard>,
}

/// State shared between the pool handle and its units
pub(crate) struct PoolShared {
    config: PoolConfig,
    pub(crate) parser: Arc<dyn SnapshotParser>,
    in_flight: Mutex<HashMap<TaskId, InFlight>>,
    units: OnceCell<Vec<UnitHandle>>,
    next_unit: AtomicUsize,
    terminated: AtomicBool,
    events: broadcast::Sender<PoolEvent>,
    stats: PoolStats,
}

impl PoolShared {
    fn emit(&self, event: PoolEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn is_in_flight(&self, task_id: &TaskId) -> bool {
        self.in_flight.lock().contains_key(task_id)
    }

    /// Publishes progress unless the task was canceled or already resolved
    pub(crate) fn emit_progress(&self, ctx: &TaskContext, percent: u8, stage: ProgressStage) {
        let live = self
            .in_flight
            .lock()
            .get(&ctx.task_id)
            .map(|entry| !entry.token.is_canceled())
            .unwrap_or(false);
        if !live {
            return;
        }

        tracing::trace!(task_id = %ctx.task_id, percent, stage = %stage, "Task progress");
        self.emit(PoolEvent::TaskProgress {
            task_id: ctx.task_id.clone(),
            file_name: ctx.file_name.clone(),
            percent,
            stage,
        });
    }

    /// Resolves a task with the result its unit produced.
    ///
    /// Results for tasks that were canceled or terminated meanwhile are dropped.
    pub(crate) fn complete(&self, ctx: &TaskContext, outcome: TaskOutcome) {
        let entry = self.in_flight.lock().remove(&ctx.task_id);
        match entry {
            Some(entry) => self.deliver(entry, outcome),
            None => {
                tracing::debug!(task_id = %ctx.task_id, "Discarding result of task no longer in flight");
            },
        }
    }

    /// Fails every task assigned to a unit that crashed.
    pub(crate) fn fail_unit(&self, index: usize, message: &str) {
        tracing::warn!(unit = index, error = message, "Parser unit crashed");
        self.stats.record_unit_fault();

        let affected: Vec<InFlight> = {
            let mut in_flight = self.in_flight.lock();
            let ids: Vec<TaskId> = in_flight
                .iter()
                .filter(|(_, entry)| entry.unit == Some(index))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| in_flight.remove(id)).collect()
        };

        for entry in affected {
            let failure = entry.context.unit_fault(message);
            self.deliver(entry, TaskOutcome::Failure(failure));
        }
    }

    fn deliver(&self, mut entry: InFlight, outcome: TaskOutcome) {
        entry.ping.take();
        let ctx = &entry.context;

        match &outcome {
            TaskOutcome::Success(snapshot) => {
                self.stats.record_completed();
                tracing::debug!(
                    task_id = %ctx.task_id,
                    file_name = %ctx.file_name,
                    series = snapshot.series_count(),
                    "Task completed"
                );
                self.emit(PoolEvent::TaskCompleted {
                    task_id: ctx.task_id.clone(),
                    snapshot_id: ctx.snapshot_id.clone(),
                    file_name: ctx.file_name.clone(),
                    series_count: snapshot.series_count(),
                });
            },
            TaskOutcome::Failure(failure) => {
                self.stats.record_failed();
                tracing::debug!(
                    task_id = %ctx.task_id,
                    file_name = %ctx.file_name,
                    kind = ?failure.kind,
                    error = %failure.message,
                    "Task failed"
                );
                self.emit(PoolEvent::TaskFailed {
                    task_id: ctx.task_id.clone(),
                    file_name: ctx.file_name.clone(),
                    kind: failure.kind,
                    message: failure.message.clone(),
                });
            },
            TaskOutcome::Canceled => {
                self.stats.record_canceled();
                tracing::debug!(task_id = %ctx.task_id, file_name = %ctx.file_name, "Task canceled");
                self.emit(PoolEvent::TaskCanceled {
                    task_id: ctx.task_id.clone(),
                    file_name: ctx.file_name.clone(),
                });
            },
        }

        // The caller may have dropped its handle
        let _ = entry.responder.send(outcome);
    }
}

/// Pool of parse units.
///
/// Dropping the pool terminates it.
pub struct ParserPool {
    shared: Arc<PoolShared>,
}

impl ParserPool {
    /// Creates a pool running the OTLP/JSON parser
    pub fn new(config: PoolConfig) -> Self {
        Self::with_parser(config, Arc::new(OtlpJsonParser))
    }

    /// Creates a pool running a custom parser
    pub fn with_parser(config: PoolConfig, parser: Arc<dyn SnapshotParser>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            shared: Arc::new(PoolShared {
                config,
                parser,
                in_flight: Mutex::new(HashMap::new()),
                units: OnceCell::new(),
                next_unit: AtomicUsize::new(0),
                terminated: AtomicBool::new(false),
                events,
                stats: PoolStats::default(),
            }),
        }
    }

    /// Subscribes to lifecycle events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.shared.events.subscribe()
    }

    /// Submits a task and returns the handle its outcome is delivered to.
    ///
    /// With background units this returns immediately. On the synchronous
    /// path the task has already resolved when this returns.
    pub fn dispatch(&self, task: ParseTask) -> TaskHandle {
        let shared = &self.shared;
        let context = TaskContext {
            task_id: TaskId::generate(),
            snapshot_id: task.snapshot_id,
            file_name: task.file_name,
        };
        let (responder, receiver) = oneshot::channel();
        let handle = TaskHandle {
            context: context.clone(),
            receiver,
        };
        shared.stats.record_dispatched();

        if self.is_terminated() {
            tracing::debug!(task_id = %context.task_id, "Dispatch after terminate");
            shared.stats.record_failed();
            let _ = responder.send(TaskOutcome::Failure(context.terminated()));
            return handle;
        }

        shared.emit(PoolEvent::TaskStarted {
            task_id: context.task_id.clone(),
            file_name: context.file_name.clone(),
            file_size: task.size_bytes,
        });

        let token = CancellationToken::new();
        let units = self.units();
        if units.is_empty() {
            self.run_sync(context, task.raw_text, token, responder);
            return handle;
        }

        let index = shared.next_unit.fetch_add(1, Ordering::Relaxed) % units.len();
        let unit = &units[index];

        let ping = if task.size_bytes > shared.config.progress_ping_threshold_bytes {
            match unit::start_ping(
                context.task_id.clone(),
                unit.control.clone(),
                shared.config.progress_ping_interval,
            ) {
                Ok(guard) => Some(guard),
                Err(e) => {
                    tracing::warn!(task_id = %context.task_id, error = %e, "Failed to start liveness ping");
                    None
                },
            }
        } else {
            None
        };

        shared.in_flight.lock().insert(
            context.task_id.clone(),
            InFlight {
                context: context.clone(),
                unit: Some(index),
                token: token.clone(),
                responder,
                ping,
            },
        );

        tracing::debug!(
            task_id = %context.task_id,
            unit = unit.index,
            file_name = %context.file_name,
            size = task.size_bytes,
            "Task dispatched"
        );

        let job = Job {
            context: context.clone(),
            raw_text: task.raw_text,
            token,
        };
        if unit.jobs.send(UnitMessage::Run(job)).is_err() {
            shared.complete(&context, TaskOutcome::Failure(context.unit_fault("unit is not running")));
        }

        handle
    }

    /// Cancels an in-flight task. Returns false for unknown or resolved ids.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        let shared = &self.shared;
        let Some(mut entry) = shared.in_flight.lock().remove(task_id) else {
            return false;
        };

        entry.token.cancel();
        entry.ping.take();
        if let Some(index) = entry.unit {
            if let Some(unit) = shared.units.get().and_then(|units| units.get(index)) {
                // Best effort; the unit may already be done
                let _ = unit.control.send(Control::Cancel(task_id.clone()));
            }
        }

        shared.deliver(entry, TaskOutcome::Canceled);
        true
    }

    /// Fails every in-flight task with `PoolTerminated` and stops the units.
    ///
    /// Later dispatches resolve immediately as `PoolTerminated`.
    pub fn terminate_all(&self) {
        let shared = &self.shared;
        if shared.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        let entries: Vec<InFlight> = shared.in_flight.lock().drain().map(|(_, e)| e).collect();
        let pending = entries.len();
        for entry in entries {
            entry.token.cancel();
            let failure = entry.context.terminated();
            shared.deliver(entry, TaskOutcome::Failure(failure));
        }

        if let Some(units) = shared.units.get() {
            for unit in units {
                unit.shutdown();
            }
        }

        tracing::info!(pending, "Parser pool terminated");
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::SeqCst)
    }

    /// Number of tasks that have not resolved yet
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.lock().len()
    }

    /// Number of running units; 0 before the first dispatch and on the
    /// synchronous path
    pub fn unit_count(&self) -> usize {
        self.shared.units.get().map(Vec::len).unwrap_or(0)
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.shared.stats.snapshot()
    }

    fn units(&self) -> &[UnitHandle] {
        if !self.shared.config.parallel {
            return &[];
        }
        self.shared.units.get_or_init(|| spawn_units(&self.shared))
    }

    fn run_sync(
        &self,
        context: TaskContext,
        raw_text: String,
        token: CancellationToken,
        responder: oneshot::Sender<TaskOutcome>,
    ) {
        let shared = &self.shared;
        shared.in_flight.lock().insert(
            context.task_id.clone(),
            InFlight {
                context: context.clone(),
                unit: None,
                token: token.clone(),
                responder,
                ping: None,
            },
        );
        tracing::debug!(task_id = %context.task_id, file_name = %context.file_name, "Running task synchronously");

        let result = catch_unwind(AssertUnwindSafe(|| {
            run_pipeline(shared.parser.as_ref(), &context, &raw_text, &token, &mut |percent, stage| {
                shared.emit_progress(&context, percent, stage)
            })
        }));
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => TaskOutcome::Failure(context.unit_fault("parser panicked on the synchronous path")),
        };
        shared.complete(&context, outcome);
    }
}

impl Drop for ParserPool {
    fn drop(&mut self) {
        self.terminate_all();
    }
}

fn spawn_units(shared: &Arc<PoolShared>) -> Vec<UnitHandle> {
    let count = shared.config.resolved_units();
    let mut units = Vec::with_capacity(count);

    for index in 0..count {
        match unit::spawn_unit(index, Arc::clone(shared)) {
            Ok(handle) => units.push(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to spawn parser unit, using synchronous parsing");
                for unit in &units {
                    unit.shutdown();
                }
                return Vec::new();
            },
        }
    }

    tracing::info!(units = count, "Parser pool started");
    units
}
