//! Priority-ordered task pool with bounded concurrency

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Instant;

use super::worker::{PendingResult, WorkerPool};
use crate::core::{Error, Result, StreamParams};
use crate::services::Services;
use crate::streaming::Priority;
use crate::task::Task;

/// Outcome of a task collected by [`TaskPool::poll`]
#[derive(Debug)]
pub enum Completion {
    /// Body succeeded; dependents are attached to the task
    Succeeded(Task),
    /// Body or `finished` failed; the task has no dependents
    Failed { task: Task, error: Error },
}

impl Completion {
    pub fn task(&self) -> &Task {
        match self {
            Self::Succeeded(task) | Self::Failed { task, .. } => task,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// Heap entry: higher priority first, then earlier insertion
struct QueuedTask {
    priority: Priority,
    seq: u64,
    task: Task,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedTask {}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct RunningTask {
    task: Task,
    pending: PendingResult,
    started: Instant,
}

/// Queued tasks waiting for one of a fixed number of worker slots
pub struct TaskPool {
    workers: WorkerPool,
    queued: BinaryHeap<QueuedTask>,
    running: Vec<RunningTask>,
    next_seq: u64,
}

impl TaskPool {
    /// Pool named `name` with `worker_count` slots
    pub fn new(name: &str, worker_count: usize, services: Arc<Services>) -> Result<Self> {
        Ok(Self {
            workers: WorkerPool::new(name, worker_count, services)?,
            queued: BinaryHeap::new(),
            running: Vec::with_capacity(worker_count),
            next_seq: 0,
        })
    }

    pub fn name(&self) -> &str {
        self.workers.name()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.size()
    }

    pub fn params(&self) -> StreamParams {
        self.workers.services().params
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    /// Nothing queued and nothing running
    pub fn is_empty(&self) -> bool {
        self.queued.is_empty() && self.running.is_empty()
    }

    pub fn add_task(&mut self, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        log::trace!("{}: queued {} at priority {:.3e}", self.name(), task.id(), task.priority().value());
        self.queued.push(QueuedTask {
            priority: task.priority(),
            seq,
            task,
        });
    }

    /// Collect finished work, start queued work in free slots, then finalize
    /// what was collected. Never blocks.
    pub fn poll(&mut self) -> Vec<Completion> {
        let mut collected = Vec::new();
        let mut still_running = Vec::with_capacity(self.running.len());
        for mut running in self.running.drain(..) {
            match running.pending.try_take() {
                Some(result) => {
                    log::trace!("{} settled after {:?}", running.task.id(), running.started.elapsed());
                    collected.push((running.task, result));
                }
                None => still_running.push(running),
            }
        }
        self.running = still_running;

        while self.running.len() < self.workers.size() {
            let Some(QueuedTask { task, .. }) = self.queued.pop() else {
                break;
            };
            let pending = task.run(&self.workers);
            self.running.push(RunningTask {
                task,
                pending,
                started: Instant::now(),
            });
        }

        let params = self.params();
        collected
            .into_iter()
            .map(|(mut task, result)| {
                let outcome = match result {
                    Ok(output) => task.finished(output, &params),
                    Err(error) => Err(error),
                };
                match outcome {
                    Ok(()) => Completion::Succeeded(task),
                    Err(error) => {
                        log::debug!("{}: {} {:?} failed: {error}", self.workers.name(), task.id(), task.tag());
                        Completion::Failed { task, error }
                    }
                }
            })
            .collect()
    }
}
