use crate::context::Context;
use crate::node::NodeId;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

/// Heap entries allowed beyond twice the live timers before cancelled
/// entries are swept.
const COMPACT_SLACK: usize = 32;

pub(crate) type TimerJob = Box<dyn FnOnce(&mut Context<'_>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct Timer {
    wake_time: Instant,
    id: TimerId,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.wake_time == other.wake_time && self.id == other.id
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the heap pops the earliest deadline; ties fire in
        // scheduling order.
        other
            .wake_time
            .cmp(&self.wake_time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

struct PendingTimer {
    owner: NodeId,
    job: TimerJob,
}

/// Delayed callbacks owned by mounted nodes.
///
/// Cancelled timers stay in the heap until they surface and are skipped
/// there, or until they outnumber the live ones and the heap is compacted.
pub(crate) struct Timers {
    heap: BinaryHeap<Timer>,
    pending: HashMap<TimerId, PendingTimer>,
    next_id: u64,
}

impl Timers {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn schedule(&mut self, owner: NodeId, delay: Duration, job: TimerJob) -> TimerId {
        self.schedule_at(owner, Instant::now() + delay, job)
    }

    pub fn schedule_at(&mut self, owner: NodeId, wake_time: Instant, job: TimerJob) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(Timer { wake_time, id });
        self.pending.insert(id, PendingTimer { owner, job });
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        let removed = self.pending.remove(&id).is_some();
        self.compact();
        removed
    }

    pub fn cancel_owner(&mut self, owner: NodeId) {
        self.pending.retain(|_, timer| timer.owner != owner);
        self.compact();
    }

    fn compact(&mut self) {
        if self.heap.len() <= 2 * self.pending.len() + COMPACT_SLACK {
            return;
        }
        let pending = &self.pending;
        self.heap.retain(|timer| pending.contains_key(&timer.id));
    }

    /// Earliest deadline still waiting.
    pub fn next_wake_time(&mut self) -> Option<Instant> {
        while let Some(timer) = self.heap.peek() {
            if self.pending.contains_key(&timer.id) {
                return Some(timer.wake_time);
            }
            self.heap.pop();
        }
        None
    }

    /// Removes and returns every timer due at `now`, earliest first.
    pub fn pop_ready(&mut self, now: Instant) -> Vec<(NodeId, TimerJob)> {
        let mut ready = Vec::new();
        while let Some(timer) = self.heap.peek() {
            if timer.wake_time > now {
                break;
            }
            let id = timer.id;
            self.heap.pop();
            if let Some(pending) = self.pending.remove(&id) {
                ready.push((pending.owner, pending.job));
            }
        }
        ready
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.pending.clear();
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}
