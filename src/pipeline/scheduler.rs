use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use deadqueue::limited::Queue;
use metrics::counter;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

use crate::constants::{EVENT_CHANNEL_CAPACITY, TASK_QUEUE_CAPACITY, WORKER_POLL_INTERVAL_MS};
use crate::errors::PipelineError;

/// Lifecycle states of a scheduled task
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Accepted into the queue, not yet picked up by a worker
    Pending,
    /// Picked up by a worker, work in progress
    Running,
    /// Work completed successfully
    Finished,
    /// Work failed with an error
    Error,
    /// Canceled before or during the work, no result produced
    Canceled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
            Self::Error => write!(f, "error"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// Broadcast on every task status transition
///
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub task_id: Uuid,
    pub description: String,
    pub status: TaskStatus,
}

/// How a task's work ended when it did not fail
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    /// The work observed the cancel flag or decided to stand down
    Canceled,
}

/// Unit of work executed by the scheduler's workers. Implementations check
/// the cancel flag between expensive steps and return `Canceled` instead of
/// an error when they stop early.
///
pub trait TaskWork: Send + 'static {
    fn run(
        self,
        cancel: Arc<AtomicBool>,
    ) -> impl Future<Output = Result<TaskOutcome, PipelineError>> + Send;
}

/// Receives the next status event. A slow subscriber that lagged behind the
/// channel only loses the overwritten events, not the rest of the session;
/// the gap is logged and reception continues. Returns `None` once the
/// channel is closed.
///
pub async fn next_status_event(
    events: &mut broadcast::Receiver<StatusEvent>,
) -> Option<StatusEvent> {
    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Subscriber lagged, {} task status events dropped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

struct Task<W>
where
    W: TaskWork,
{
    id: Uuid,
    description: String,
    work: W,
    cancel: Arc<AtomicBool>,
}

/// Handle for cancelling a submitted task
///
pub struct TaskHandle {
    id: Uuid,
    cancel: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Flags the task for cancellation. A task still in the queue is dropped
    /// by the next worker without ever running; a running task stops at its
    /// next cancel check.
    ///
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

/// Bounded multi-worker task scheduler. Workers poll a shared queue and
/// broadcast every status transition; submission applies backpressure when
/// the queue is full.
///
pub struct TaskScheduler<W>
where
    W: TaskWork,
{
    queue: Arc<Queue<Task<W>>>,
    events: broadcast::Sender<StatusEvent>,
    stop_flag: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl<W> TaskScheduler<W>
where
    W: TaskWork,
{
    pub fn new(num_workers: usize) -> Self {
        let queue: Arc<Queue<Task<W>>> = Arc::new(Queue::new(TASK_QUEUE_CAPACITY));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let stop_flag = Arc::new(AtomicBool::new(false));

        let workers = (0..num_workers)
            .map(|_| {
                tokio::spawn(Self::work_loop(
                    queue.clone(),
                    events.clone(),
                    stop_flag.clone(),
                ))
            })
            .collect();

        Self {
            queue,
            events,
            stop_flag,
            workers,
        }
    }

    /// Subscribes to task status events
    ///
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    /// Submits work for execution, waiting while the queue is full.
    /// Emits `Pending` once the task is accepted.
    ///
    pub async fn submit(&self, description: String, work: W) -> TaskHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let id = Uuid::new_v4();
        let mut task = Task {
            id,
            description: description.clone(),
            work,
            cancel: cancel.clone(),
        };
        loop {
            match self.queue.try_push(task) {
                Ok(_) => break,
                Err(rejected) => {
                    task = rejected;
                    tokio::time::sleep(tokio::time::Duration::from_millis(
                        WORKER_POLL_INTERVAL_MS,
                    ))
                    .await;
                }
            }
        }
        self.emit(id, &description, TaskStatus::Pending);
        TaskHandle { id, cancel }
    }

    /// Waits until the queue has drained, then stops the workers. Running
    /// tasks finish their work.
    ///
    pub async fn shutdown(self) -> Result<(), PipelineError> {
        while self.queue.len() > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(WORKER_POLL_INTERVAL_MS))
                .await;
        }
        self.stop_flag.store(true, Ordering::Relaxed);
        for worker in self.workers {
            worker.await?;
        }
        Ok(())
    }

    fn emit(&self, task_id: Uuid, description: &str, status: TaskStatus) {
        self.events
            .send(StatusEvent {
                task_id,
                description: description.to_string(),
                status,
            })
            .ok();
    }

    async fn work_loop(
        queue: Arc<Queue<Task<W>>>,
        events: broadcast::Sender<StatusEvent>,
        stop_flag: Arc<AtomicBool>,
    ) {
        let emit = |task: &Task<W>, status: TaskStatus| {
            events
                .send(StatusEvent {
                    task_id: task.id,
                    description: task.description.clone(),
                    status,
                })
                .ok();
        };

        while !stop_flag.load(Ordering::Relaxed) {
            let task = match queue.try_pop() {
                Some(task) => task,
                None => {
                    tokio::time::sleep(tokio::time::Duration::from_millis(
                        WORKER_POLL_INTERVAL_MS,
                    ))
                    .await;
                    continue;
                }
            };

            // canceled while queued, never enters `Running`
            if task.cancel.load(Ordering::Relaxed) {
                emit(&task, TaskStatus::Canceled);
                counter!("multisearch_tasks_canceled").increment(1);
                continue;
            }

            emit(&task, TaskStatus::Running);
            let cancel = task.cancel.clone();
            let description = task.description.clone();
            let id = task.id;
            let status = match task.work.run(cancel).await {
                Ok(TaskOutcome::Completed) => {
                    counter!("multisearch_tasks_finished").increment(1);
                    TaskStatus::Finished
                }
                Ok(TaskOutcome::Canceled) => {
                    counter!("multisearch_tasks_canceled").increment(1);
                    TaskStatus::Canceled
                }
                Err(error) => {
                    error!("Task `{}` failed: {}", &description, error);
                    counter!("multisearch_tasks_failed").increment(1);
                    TaskStatus::Error
                }
            };
            events
                .send(StatusEvent {
                    task_id: id,
                    description,
                    status,
                })
                .ok();
        }
    }
}
