//! Signalling engine shell (spec §3, §4.7): a generic timer-wheel scheduler
//! shared by Layer-2/3 protocol components (MTP2/MTP3/SCCP/ISUP, Q.931,
//! MGCP in the original). The core only needs the scheduler and dispatch
//! semantics; concrete protocol stacks are external collaborators.

use std::sync::Arc;

use parking_lot::Mutex;

/// A component driven by the signalling engine's clock.
pub trait TimerTickable: Send + Sync {
    fn timer_tick(&self, now_us: u64);
}

struct Entry {
    name: String,
    priority: i32,
    interval_us: u64,
    next_due: u64,
    component: Arc<dyn TimerTickable>,
}

/// Scheduler that ticks registered components on their own interval,
/// highest priority first when several are due in the same sweep.
#[derive(Default)]
pub struct TimerWheel {
    entries: Mutex<Vec<Entry>>,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `component` without scheduling it; it only ticks once
    /// [`start`](Self::start) sets an interval.
    pub fn insert(&self, name: impl Into<String>, component: Arc<dyn TimerTickable>) {
        self.entries.lock().push(Entry {
            name: name.into(),
            priority: 0,
            interval_us: 0,
            next_due: 0,
            component,
        });
    }

    /// Schedules a previously inserted component to tick every
    /// `interval_us` microseconds, starting at `now_us`, at `priority`
    /// (higher runs first when ties are due in the same sweep).
    pub fn start(&self, name: &str, priority: i32, interval_us: u64, now_us: u64) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.iter_mut().find(|e| e.name == name) else {
            return false;
        };
        entry.priority = priority;
        entry.interval_us = interval_us;
        entry.next_due = now_us + interval_us;
        true
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Ticks every component whose interval has elapsed by `now_us`,
    /// highest priority first, rescheduling each for its next interval.
    pub fn sweep(&self, now_us: u64) {
        let mut due: Vec<(i32, Arc<dyn TimerTickable>)> = Vec::new();
        {
            let mut entries = self.entries.lock();
            for entry in entries.iter_mut() {
                if entry.interval_us == 0 || entry.next_due > now_us {
                    continue;
                }
                due.push((entry.priority, entry.component.clone()));
                entry.next_due += entry.interval_us;
            }
        }
        due.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, component) in due {
            component.timer_tick(now_us);
        }
    }
}

/// Serializes raw PDUs to a pcap-like sink (DLT 140/141/142/177 framing in
/// the original, or hex). The core only needs the seam; concrete writers
/// are external collaborators (spec §4.7).
pub trait PduSink: Send + Sync {
    fn dump(&self, link_type: u32, direction: Direction, data: &[u8]);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Wraps a [`TimerTickable`] so every tick's effect can also be mirrored to
/// a [`PduSink`], the same composition the original applies to Layer-2
/// components via its dumper wrapper.
pub struct DumpedComponent<T> {
    inner: T,
    sink: Arc<dyn PduSink>,
    link_type: u32,
}

impl<T: TimerTickable> DumpedComponent<T> {
    pub fn new(inner: T, sink: Arc<dyn PduSink>, link_type: u32) -> Self {
        Self { inner, sink, link_type }
    }

    pub fn dump(&self, direction: Direction, data: &[u8]) {
        self.sink.dump(self.link_type, direction, data);
    }
}

impl<T: TimerTickable> TimerTickable for DumpedComponent<T> {
    fn timer_tick(&self, now_us: u64) {
        self.inner.timer_tick(now_us);
    }
}
