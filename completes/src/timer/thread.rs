//! A scheduler backed by one dedicated timer thread.

use super::{timer, Scheduler, TimerCallback, TimerHandle, TimerTrigger};
use crate::config::SchedulerConfig;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Cancelled entries are swept once the heap grows past this size.
const PURGE_THRESHOLD: usize = 1024;

/// Stand-in deadline for delays too large to add to `Instant::now()`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

struct Entry {
    due: Instant,
    seq: u64,
    trigger: TimerTrigger,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so the BinaryHeap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    wakeup: Condvar,
}

/// Runs timer callbacks on a single background thread.
///
/// Callbacks run one at a time on the timer thread, so a slow callback
/// delays the ones behind it. Dropping the scheduler stops the thread;
/// timers still pending at that point never fire.
pub struct ThreadScheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadScheduler {
    /// Starts a scheduler with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the timer thread cannot be spawned.
    pub fn new() -> std::io::Result<Self> {
        Self::with_config(&SchedulerConfig::default())
    }

    /// Starts a scheduler whose thread is named per `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the timer thread cannot be spawned.
    pub fn with_config(config: &SchedulerConfig) -> std::io::Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);

        let worker = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run(&worker_shared))?;

        debug!(thread = %config.thread_name, "Timer thread started");

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Returns the number of timers still queued, including cancelled ones
    /// not yet swept.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().heap.len()
    }

    /// Stops the timer thread. Pending timers never fire.
    pub fn shutdown(&self) {
        {
            let mut queue = self.shared.queue.lock();
            if queue.shutdown {
                return;
            }
            queue.shutdown = true;
            queue.heap.clear();
        }
        self.shared.wakeup.notify_all();

        if let Some(worker) = self.worker.lock().take() {
            // A callback may drop the last reference from the timer thread itself
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                warn!("Timer thread exited with a panic");
            }
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let (handle, trigger) = timer(callback);

        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            warn!("Timer scheduled after shutdown; it will never fire");
            handle.cancel();
            return handle;
        }

        if queue.heap.len() >= PURGE_THRESHOLD {
            queue.heap.retain(|entry| !entry.trigger.is_cancelled());
        }

        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.heap.push(Entry {
            due: due_after(Instant::now(), delay),
            seq,
            trigger,
        });
        drop(queue);

        trace!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            seq,
            "Timer scheduled"
        );
        self.shared.wakeup.notify_one();
        handle
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadScheduler")
            .field("queued", &self.queued())
            .finish()
    }
}

fn run(shared: &Shared) {
    let mut queue = shared.queue.lock();

    loop {
        if queue.shutdown {
            break;
        }

        let due = take_due(&mut queue, Instant::now());
        if !due.is_empty() {
            MutexGuard::unlocked(&mut queue, || {
                for trigger in due {
                    trigger.fire();
                }
            });
            continue;
        }

        match queue.heap.peek().map(|entry| entry.due) {
            Some(next) => {
                shared.wakeup.wait_until(&mut queue, next);
            }
            None => shared.wakeup.wait(&mut queue),
        }
    }

    debug!("Timer thread stopped");
}

fn due_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

fn take_due(queue: &mut Queue, now: Instant) -> Vec<TimerTrigger> {
    let mut due = Vec::new();
    while queue.heap.peek().is_some_and(|entry| entry.due <= now) {
        if let Some(entry) = queue.heap.pop() {
            due.push(entry.trigger);
        }
    }
    due
}
