#![forbid(unsafe_code)]

//! Single-threaded delayed work queue for deferred command effects.
//!
//! A [`WorkQueue`] owns one named worker thread. Tasks are scheduled with a
//! delay and run in deadline order; tasks with equal deadlines run in the
//! order they were scheduled. Because there is exactly one worker, no two
//! tasks ever run concurrently.
//!
//! # How it works
//!
//! 1. [`WorkQueueHandle::schedule`] sends the task to the worker over a
//!    channel and returns a [`TaskHandle`]
//! 2. The worker keeps pending tasks in a min-heap keyed by
//!    `(deadline, sequence)` and sleeps on the channel until the earliest
//!    deadline
//! 3. Due tasks run on the worker thread; a panicking task is logged and
//!    does not take the worker down
//! 4. Once every handle is dropped the worker drains the remaining tasks and
//!    exits
//!
//! [`WorkQueue::wait_idle`] and [`TaskHandle::wait`] let tests and shutdown
//! paths wait for settlement.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;

use web_time::{Duration, Instant};

use crate::config::DeferredConfig;

type Job = Box<dyn FnOnce() + Send>;

/// Completion signal for one scheduled task.
///
/// A task counts as settled once it ran (or panicked), or once it was
/// dropped because the queue had shut down.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl TaskHandle {
    fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    fn settle(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    /// Whether the task has settled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the task settles.
    pub fn join(&self) {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _settled = cvar
            .wait_while(guard, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until the task settles or `timeout` elapses.
    ///
    /// Returns `true` if the task settled.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("done", &self.is_done())
            .finish()
    }
}

struct Scheduled {
    deadline: Instant,
    seq: u64,
    job: Job,
    handle: TaskHandle,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Number of scheduled tasks that have not settled yet.
struct Outstanding {
    count: Mutex<usize>,
    settled: Condvar,
}

impl Outstanding {
    fn increment(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn decrement(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.settled.notify_all();
        }
    }
}

/// Cloneable sender side of a [`WorkQueue`].
#[derive(Clone)]
pub struct WorkQueueHandle {
    sender: mpsc::Sender<Scheduled>,
    outstanding: Arc<Outstanding>,
    next_seq: Arc<AtomicU64>,
    default_delay: Duration,
}

impl WorkQueueHandle {
    /// Delay used by tasks that do not choose their own.
    #[must_use]
    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    /// Run `task` on the worker after `delay`.
    pub fn schedule(&self, delay: Duration, task: impl FnOnce() + Send + 'static) -> TaskHandle {
        self.schedule_at(Instant::now() + delay, task)
    }

    /// Run `task` on the worker once `deadline` has passed.
    pub fn schedule_at(&self, deadline: Instant, task: impl FnOnce() + Send + 'static) -> TaskHandle {
        let handle = TaskHandle::new();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.outstanding.increment();

        let scheduled = Scheduled {
            deadline,
            seq,
            job: Box::new(task),
            handle: handle.clone(),
        };
        if self.sender.send(scheduled).is_err() {
            tracing::warn!(
                target: "commander.deferred",
                seq,
                "work queue worker is gone; dropping task"
            );
            self.outstanding.decrement();
            handle.settle();
        } else {
            tracing::debug!(target: "commander.deferred", seq, "task scheduled");
        }
        handle
    }

    /// Scheduled tasks that have not settled yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        *self
            .outstanding
            .count
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until no task is outstanding or `timeout` elapses.
    ///
    /// Returns `true` if the queue went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let count = self
            .outstanding
            .count
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (count, _) = self
            .outstanding
            .settled
            .wait_timeout_while(count, timeout, |count| *count > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *count == 0
    }
}

impl fmt::Debug for WorkQueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueueHandle")
            .field("pending", &self.pending())
            .field("default_delay", &self.default_delay)
            .finish()
    }
}

/// The work queue: a handle plus the worker thread it feeds.
///
/// Dropping the queue does not join the worker; the worker exits on its own
/// once every [`WorkQueueHandle`] clone is gone and the remaining tasks ran.
pub struct WorkQueue {
    handle: WorkQueueHandle,
    worker: thread::JoinHandle<()>,
}

impl WorkQueue {
    /// Spawn the worker thread.
    pub fn new(config: &DeferredConfig) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let outstanding = Arc::new(Outstanding {
            count: Mutex::new(0),
            settled: Condvar::new(),
        });

        let worker_outstanding = Arc::clone(&outstanding);
        let worker = thread::Builder::new()
            .name(config.worker_name.clone())
            .spawn(move || run_worker(&receiver, &worker_outstanding))?;

        tracing::debug!(
            target: "commander.deferred",
            worker = %config.worker_name,
            default_delay_ms = config.default_delay_ms,
            "work queue started"
        );

        Ok(Self {
            handle: WorkQueueHandle {
                sender,
                outstanding,
                next_seq: Arc::new(AtomicU64::new(0)),
                default_delay: config.default_delay(),
            },
            worker,
        })
    }

    /// A cloneable handle for scheduling.
    #[must_use]
    pub fn handle(&self) -> WorkQueueHandle {
        self.handle.clone()
    }

    /// Name of the worker thread.
    #[must_use]
    pub fn thread_name(&self) -> Option<&str> {
        self.worker.thread().name()
    }

    /// See [`WorkQueueHandle::schedule`].
    pub fn schedule(&self, delay: Duration, task: impl FnOnce() + Send + 'static) -> TaskHandle {
        self.handle.schedule(delay, task)
    }

    /// See [`WorkQueueHandle::pending`].
    #[must_use]
    pub fn pending(&self) -> usize {
        self.handle.pending()
    }

    /// See [`WorkQueueHandle::wait_idle`].
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.handle.wait_idle(timeout)
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("thread", &self.thread_name())
            .field("pending", &self.pending())
            .finish()
    }
}

fn run_worker(receiver: &mpsc::Receiver<Scheduled>, outstanding: &Outstanding) {
    let mut heap: BinaryHeap<Reverse<Scheduled>> = BinaryHeap::new();
    let mut connected = true;

    loop {
        let now = Instant::now();
        while heap
            .peek()
            .is_some_and(|Reverse(next)| next.deadline <= now)
        {
            if let Some(Reverse(due)) = heap.pop() {
                run_task(due, outstanding);
            }
        }

        let next_deadline = heap.peek().map(|Reverse(next)| next.deadline);
        if !connected {
            match next_deadline {
                Some(deadline) => {
                    thread::sleep(deadline.saturating_duration_since(Instant::now()));
                    continue;
                }
                None => break,
            }
        }

        let received = match next_deadline {
            Some(deadline) => {
                receiver.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(scheduled) => heap.push(Reverse(scheduled)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => connected = false,
        }
    }

    tracing::debug!(target: "commander.deferred", "work queue drained; worker exiting");
}

fn run_task(scheduled: Scheduled, outstanding: &Outstanding) {
    let Scheduled {
        seq, job, handle, ..
    } = scheduled;
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        tracing::error!(target: "commander.deferred", seq, "deferred task panicked");
    }
    handle.settle();
    outstanding.decrement();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> WorkQueue {
        WorkQueue::new(&DeferredConfig {
            default_delay_ms: 5,
            worker_name: "commander-test".into(),
        })
        .expect("spawn worker")
    }

    #[test]
    fn worker_thread_is_named() {
        let queue = queue();
        assert_eq!(queue.thread_name(), Some("commander-test"));
        assert_eq!(queue.handle().default_delay(), Duration::from_millis(5));
    }

    #[test]
    fn runs_in_deadline_order() {
        let queue = queue();
        let log = Arc::new(Mutex::new(Vec::new()));

        let late = Arc::clone(&log);
        queue.schedule(Duration::from_millis(60), move || late.lock().unwrap().push("late"));
        let early = Arc::clone(&log);
        queue.schedule(Duration::from_millis(10), move || early.lock().unwrap().push("early"));

        assert!(queue.wait_idle(Duration::from_secs(5)));
        assert_eq!(*log.lock().unwrap(), vec!["early", "late"]);
    }

    #[test]
    fn equal_deadlines_run_fifo() {
        let queue = queue();
        let handle = queue.handle();
        let log = Arc::new(Mutex::new(Vec::new()));
        let deadline = Instant::now() + Duration::from_millis(20);

        for i in 0..5 {
            let log = Arc::clone(&log);
            handle.schedule_at(deadline, move || log.lock().unwrap().push(i));
        }

        assert!(handle.wait_idle(Duration::from_secs(5)));
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn task_handle_settles() {
        let queue = queue();
        let task = queue.schedule(Duration::ZERO, || {});
        assert!(task.wait(Duration::from_secs(5)));
        assert!(task.is_done());
        task.join();
    }

    #[test]
    fn wait_times_out_for_far_deadline() {
        let queue = queue();
        let task = queue.schedule(Duration::from_secs(30), || {});
        assert!(!task.wait(Duration::from_millis(10)));
        assert!(!queue.wait_idle(Duration::from_millis(10)));
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn panicking_task_does_not_kill_worker() {
        let queue = queue();
        let panicked = queue.schedule(Duration::ZERO, || panic!("boom"));
        assert!(panicked.wait(Duration::from_secs(5)));

        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        let task = queue.schedule(Duration::ZERO, move || *flag.lock().unwrap() = true);
        assert!(task.wait(Duration::from_secs(5)));
        assert!(*ran.lock().unwrap());
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn handle_outlives_queue_value() {
        let handle = queue().handle();
        let task = handle.schedule(Duration::ZERO, || {});
        assert!(task.wait(Duration::from_secs(5)));
    }
}
