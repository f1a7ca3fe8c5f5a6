//! Cooperative timing primitives.
//!
//! The endpoint layer never spawns threads. Anything periodic (polling a backend that cannot
//! signal input on its own) is expressed as an alarm on a [`Scheduler`] owned by the
//! application's main loop. [`EventLoop`] is a minimal single-threaded implementation.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlarmId(u64);

/// Passed to an alarm callback when it fires.
pub struct AlarmFired<'a> {
    pub id: AlarmId,
    pub scheduler: &'a dyn Scheduler,
}

pub type AlarmCallback = Box<dyn FnMut(&AlarmFired<'_>)>;

pub trait Scheduler {
    /// Block for `duration`, servicing alarms that come due meanwhile.
    fn wait(&self, duration: Duration);

    /// Fire `callback` once after `delay`.
    fn new_relative_alarm(&self, delay: Duration, callback: AlarmCallback) -> AlarmId;

    /// Make the alarm periodic with `interval`, measured from its next firing.
    /// No effect on an alarm that already fired or was cancelled.
    fn reset_alarm_interval(&self, id: AlarmId, interval: Duration);

    /// Drop a pending alarm. May be called from inside its own callback.
    fn cancel_request(&self, id: AlarmId);
}

struct Alarm {
    deadline: Instant,
    interval: Option<Duration>,
    /// Taken out while the callback runs.
    callback: Option<AlarmCallback>,
}

/// A single-threaded alarm queue.
pub struct EventLoop {
    next_id: Cell<u64>,
    alarms: RefCell<BTreeMap<AlarmId, Alarm>>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            alarms: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn pending_alarms(&self) -> usize {
        self.alarms.borrow().len()
    }

    /// Fire every alarm whose deadline has passed. Returns how many fired.
    pub fn run_due(&self) -> usize {
        let now = Instant::now();
        let due: Vec<AlarmId> = self
            .alarms
            .borrow()
            .iter()
            .filter(|(_, alarm)| alarm.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        let mut fired = 0;
        for id in due {
            let callback = self
                .alarms
                .borrow_mut()
                .get_mut(&id)
                .and_then(|alarm| alarm.callback.take());
            let Some(mut callback) = callback else {
                continue;
            };

            callback(&AlarmFired { id, scheduler: self });
            fired += 1;

            let mut alarms = self.alarms.borrow_mut();
            let finished = match alarms.get_mut(&id) {
                Some(alarm) => match alarm.interval {
                    Some(interval) => {
                        alarm.deadline = Instant::now() + interval;
                        alarm.callback = Some(callback);
                        false
                    }
                    None => true,
                },
                // cancelled by its own callback
                None => false,
            };
            if finished {
                alarms.remove(&id);
            }
        }
        fired
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.alarms.borrow().values().map(|alarm| alarm.deadline).min()
    }
}

impl Scheduler for EventLoop {
    fn wait(&self, duration: Duration) {
        let end = Instant::now() + duration;
        loop {
            self.run_due();
            let now = Instant::now();
            if now >= end {
                break;
            }
            let until = self.next_deadline().map_or(end, |deadline| deadline.min(end));
            thread::sleep(until.saturating_duration_since(now));
        }
    }

    fn new_relative_alarm(&self, delay: Duration, callback: AlarmCallback) -> AlarmId {
        let id = AlarmId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.alarms.borrow_mut().insert(
            id,
            Alarm {
                deadline: Instant::now() + delay,
                interval: None,
                callback: Some(callback),
            },
        );
        id
    }

    fn reset_alarm_interval(&self, id: AlarmId, interval: Duration) {
        if let Some(alarm) = self.alarms.borrow_mut().get_mut(&id) {
            alarm.interval = Some(interval);
        }
    }

    fn cancel_request(&self, id: AlarmId) {
        self.alarms.borrow_mut().remove(&id);
    }
}
