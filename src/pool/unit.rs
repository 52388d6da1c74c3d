//! Background execution units.
//!
//! Each unit is an OS thread with two inboxes: a job queue processed in
//! order, and a control channel for cancel signals and liveness pings that
//! is drained at every progress checkpoint.

use crate::pool::cancel::CancellationToken;
use crate::pool::events::ProgressStage;
use crate::pool::pipeline::run_pipeline;
use crate::pool::task::{TaskContext, TaskId, TaskOutcome};
use crate::pool::PoolShared;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use std::any::Any;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Work item shipped to a unit
pub(crate) struct Job {
    pub context: TaskContext,
    pub raw_text: String,
    pub token: CancellationToken,
}

pub(crate) enum UnitMessage {
    Run(Job),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Control {
    Cancel(TaskId),
    Ping(TaskId),
}

/// Pool-side handle of a running unit
pub(crate) struct UnitHandle {
    pub index: usize,
    pub jobs: Sender<UnitMessage>,
    pub control: Sender<Control>,
}

impl UnitHandle {
    pub fn shutdown(&self) {
        // A unit that already exited has nothing left to stop
        let _ = self.jobs.send(UnitMessage::Shutdown);
    }
}

pub(crate) fn spawn_unit(index: usize, shared: Arc<PoolShared>) -> io::Result<UnitHandle> {
    let (jobs_tx, jobs_rx) = unbounded();
    let (control_tx, control_rx) = unbounded();

    thread::Builder::new()
        .name(format!("intellimetric-unit-{}", index))
        .spawn(move || unit_loop(index, shared, jobs_rx, control_rx))?;

    Ok(UnitHandle {
        index,
        jobs: jobs_tx,
        control: control_tx,
    })
}

fn unit_loop(
    index: usize,
    shared: Arc<PoolShared>,
    jobs: Receiver<UnitMessage>,
    control: Receiver<Control>,
) {
    tracing::debug!(unit = index, "Unit started");

    while let Ok(message) = jobs.recv() {
        let job = match message {
            UnitMessage::Run(job) => job,
            UnitMessage::Shutdown => break,
        };

        // Canceled, terminated or failed by an earlier fault while queued
        if !shared.is_in_flight(&job.context.task_id) {
            tracing::debug!(unit = index, task_id = %job.context.task_id, "Skipping task no longer in flight");
            continue;
        }

        tracing::debug!(
            unit = index,
            task_id = %job.context.task_id,
            file_name = %job.context.file_name,
            "Unit picked up task"
        );

        let result = catch_unwind(AssertUnwindSafe(|| execute(&shared, &job, &control)));
        match result {
            Ok(outcome) => shared.complete(&job.context, outcome),
            Err(panic) => shared.fail_unit(index, &panic_message(panic.as_ref())),
        }
    }

    tracing::debug!(unit = index, "Unit stopped");
}

fn execute(shared: &PoolShared, job: &Job, control: &Receiver<Control>) -> TaskOutcome {
    let ctx = &job.context;
    let mut last: Option<(u8, ProgressStage)> = None;

    let mut progress = |percent: u8, stage: ProgressStage| {
        while let Ok(signal) = control.try_recv() {
            match signal {
                Control::Ping(id) if id == ctx.task_id => {
                    if let Some((p, s)) = last {
                        shared.emit_progress(ctx, p, s);
                    }
                },
                Control::Cancel(id) if id == ctx.task_id => {
                    tracing::debug!(task_id = %id, "Unit received cancel signal");
                },
                // Signals for tasks that already left this unit
                _ => {},
            }
        }
        shared.emit_progress(ctx, percent, stage);
        last = Some((percent, stage));
    };

    run_pipeline(shared.parser.as_ref(), ctx, &job.raw_text, &job.token, &mut progress)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "Unknown worker error".to_string()
    }
}

/// Keeps a liveness ping running until dropped
pub(crate) struct PingGuard {
    _stop: Sender<()>,
}

/// Sends [`Control::Ping`] for `task_id` every `interval` until the guard drops.
pub(crate) fn start_ping(
    task_id: TaskId,
    control: Sender<Control>,
    interval: Duration,
) -> io::Result<PingGuard> {
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
    let ticker = crossbeam_channel::tick(interval);

    thread::Builder::new()
        .name("intellimetric-ping".to_string())
        .spawn(move || loop {
            select! {
                recv(stop_rx) -> _ => break,
                recv(ticker) -> _ => {
                    if control.send(Control::Ping(task_id.clone())).is_err() {
                        break;
                    }
                },
            }
        })?;

    Ok(PingGuard { _stop: stop_tx })
}
