//! A scheduler driven by a virtual clock.

use crate::timer::{timer, Scheduler, TimerCallback, TimerHandle, TimerTrigger};
use parking_lot::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
struct Clock {
    now: Duration,
    next_seq: u64,
    scheduled: usize,
    timers: Vec<Queued>,
}

#[derive(Debug)]
struct Queued {
    due: Duration,
    seq: u64,
    trigger: TimerTrigger,
}

/// A [`Scheduler`] whose time only moves when [`advance`](Self::advance) is
/// called.
///
/// Due timers fire on the calling thread, in deadline order, with the
/// scheduler's lock released, so a callback may schedule or advance again.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    clock: Mutex<Clock>,
}

impl ManualScheduler {
    /// Creates a scheduler at virtual time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the virtual time elapsed so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.clock.lock().now
    }

    /// Returns how many timers have ever been scheduled.
    #[must_use]
    pub fn scheduled(&self) -> usize {
        self.clock.lock().scheduled
    }

    /// Returns how many queued timers are neither fired nor cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.clock
            .lock()
            .timers
            .iter()
            .filter(|queued| !queued.trigger.is_cancelled())
            .count()
    }

    /// Moves virtual time forward by `by` and fires every timer now due.
    ///
    /// Returns how many callbacks ran.
    pub fn advance(&self, by: Duration) -> usize {
        let due = {
            let mut clock = self.clock.lock();
            clock.now = clock.now.saturating_add(by);
            let now = clock.now;

            let (mut due, rest): (Vec<_>, Vec<_>) =
                clock.timers.drain(..).partition(|queued| queued.due <= now);
            clock.timers = rest;
            due.sort_by_key(|queued| (queued.due, queued.seq));
            due
        };

        due.into_iter()
            .map(|queued| queued.trigger.fire())
            .filter(|fired| *fired)
            .count()
    }

    /// Advances to the latest queued deadline, firing everything queued.
    pub fn fire_all(&self) -> usize {
        let latest = self
            .clock
            .lock()
            .timers
            .iter()
            .map(|queued| queued.due)
            .max()
            .unwrap_or_default();
        let now = self.elapsed();
        self.advance(latest.saturating_sub(now))
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let (handle, trigger) = timer(callback);
        let mut clock = self.clock.lock();
        let due = clock.now.saturating_add(delay);
        let seq = clock.next_seq;
        clock.next_seq += 1;
        clock.scheduled += 1;
        clock.timers.push(Queued { due, seq, trigger });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Probe;

    fn recording(probe: &Probe<u32>, value: u32) -> TimerCallback {
        let probe = probe.clone();
        Box::new(move || probe.set(value))
    }

    #[test]
    fn test_advance_fires_due_timers_in_order() {
        let scheduler = ManualScheduler::new();
        let probe = Probe::new();

        let _late = scheduler.schedule(Duration::from_millis(20), recording(&probe, 2));
        let _early = scheduler.schedule(Duration::from_millis(10), recording(&probe, 1));

        assert_eq!(scheduler.advance(Duration::from_millis(5)), 0);
        assert_eq!(scheduler.advance(Duration::from_millis(5)), 1);
        assert_eq!(probe.get(), Some(1));

        assert_eq!(scheduler.advance(Duration::from_millis(10)), 1);
        assert_eq!(probe.get(), Some(2));
        assert_eq!(scheduler.elapsed(), Duration::from_millis(20));
    }

    #[test]
    fn test_cancelled_timer_not_fired() {
        let scheduler = ManualScheduler::new();
        let probe = Probe::new();

        let handle = scheduler.schedule(Duration::from_millis(1), recording(&probe, 1));
        assert_eq!(scheduler.pending(), 1);
        assert!(handle.cancel());
        assert_eq!(scheduler.pending(), 0);

        assert_eq!(scheduler.fire_all(), 0);
        assert!(!probe.is_set());
        assert_eq!(scheduler.scheduled(), 1);
    }

    #[test]
    fn test_fire_all() {
        let scheduler = ManualScheduler::new();
        let probe = Probe::new();

        let _a = scheduler.schedule(Duration::from_secs(5), recording(&probe, 1));
        let _b = scheduler.schedule(Duration::from_secs(60), recording(&probe, 2));

        assert_eq!(scheduler.fire_all(), 2);
        assert_eq!(probe.set_count(), 2);
        assert_eq!(scheduler.elapsed(), Duration::from_secs(60));
    }
}
