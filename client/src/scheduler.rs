//! Session-owned timers
//!
//! Every delayed or periodic action of a session (keep-alives, reconnect
//! attempts, buff expiry, zone shrinkage, balance refresh) is a named entry
//! here. The scheduler never sleeps; the host's frame loop calls [`Scheduler::poll`]
//! with the current time and acts on the kinds that came due, so tearing a
//! session down is a single [`Scheduler::cancel_all`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    Heartbeat,
    Ping,
    Reconnect,
    SpeedExpiry,
    ShieldExpiry,
    ZoneShrink,
    BalanceRefresh,
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    deadline: Instant,
    period: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    timers: HashMap<TimerKind, Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            timers: HashMap::new(),
        }
    }

    /// Arms a one-shot timer, replacing any pending timer of the same kind.
    pub fn schedule_once(&mut self, kind: TimerKind, now: Instant, delay: Duration) {
        self.timers.insert(
            kind,
            Timer {
                deadline: now + delay,
                period: None,
            },
        );
    }

    /// Arms a repeating timer whose first firing is one `period` from `now`.
    pub fn schedule_repeating(&mut self, kind: TimerKind, now: Instant, period: Duration) {
        let period = period.max(Duration::from_millis(1));
        self.timers.insert(
            kind,
            Timer {
                deadline: now + period,
                period: Some(period),
            },
        );
    }

    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.timers.remove(&kind).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }

    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.timers.contains_key(&kind)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.timers.get(&kind).map(|timer| timer.deadline)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Returns every timer due at `now`, earliest deadline first.
    ///
    /// One-shot timers are removed. A repeating timer fires at most once per
    /// poll; if the loop stalled past several periods the missed ones are
    /// skipped and the next deadline is re-anchored on `now`.
    pub fn poll(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.deadline <= now)
            .map(|(kind, timer)| (timer.deadline, *kind))
            .collect();
        due.sort();

        for (_, kind) in &due {
            let Some(timer) = self.timers.get_mut(kind) else {
                continue;
            };
            match timer.period {
                Some(period) => {
                    let next = timer.deadline + period;
                    timer.deadline = if next <= now { now + period } else { next };
                }
                None => {
                    self.timers.remove(kind);
                }
            }
        }

        due.into_iter().map(|(_, kind)| kind).collect()
    }
}
