//! Bounded priority queue of pending work items for one service.
//!
//! Ordering is a max-heap keyed on `(priority, sequence)`, mirroring the
//! teacher's `JobQueue`: a `BinaryHeap` gives `pop_highest` in `O(log n)`,
//! and the rarer displacement scan rebuilds the heap from a drained `Vec`
//! exactly as the teacher's `cancel_job`/`update_priority` do when they need
//! to touch an arbitrary member. Queue capacities are small (≤100 per
//! typical deployment), so the occasional linear scan is not a hot path.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use liveops_contracts::{Event, QueueItemId, QueueItemInfo};
use parking_lot::Mutex;
use uuid::Uuid;

/// Lifecycle state of one [`QueueItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueItemState {
    Pending,
    Processing,
    Completed,
    Failed,
    Discarded,
}

/// One admitted unit of work. Constructed only by the owning
/// [`PerServiceQueue`]; its `priority`/`concurrent` fields are snapshotted
/// at admission and never change afterward (invariant 2).
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub event: Arc<Event>,
    pub service_slug: String,
    pub priority: u8,
    pub concurrent: bool,
    pub discardable: bool,
    pub state: QueueItemState,
    pub enqueued_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// The read-only snapshot handed to [`liveops_contracts::Processor`]
    /// hooks.
    pub fn info(&self) -> QueueItemInfo {
        QueueItemInfo {
            id: self.id,
            priority: self.priority,
            concurrent: self.concurrent,
            enqueued_at: self.enqueued_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct HeapEntry {
    id: QueueItemId,
    priority: u8,
    sequence: u64,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct QueueInner {
    pending: BinaryHeap<HeapEntry>,
    items: HashMap<QueueItemId, QueueItem>,
    next_sequence: u64,
}

/// Capacity error returned when a caller attempts to enqueue past
/// `max_queue_size` without first running the displacement policy.
#[derive(Debug, thiserror::Error)]
#[error("service queue is at capacity ({max_queue_size})")]
pub struct QueueFullError {
    pub max_queue_size: usize,
}

/// The bounded priority queue owned by one service. All operations take a
/// single lock, so a pop and a discard (or two discards) can never both
/// "win" on the same item.
pub struct PerServiceQueue {
    max_queue_size: usize,
    inner: Mutex<QueueInner>,
}

impl PerServiceQueue {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            max_queue_size,
            inner: Mutex::new(QueueInner {
                pending: BinaryHeap::new(),
                items: HashMap::new(),
                next_sequence: 0,
            }),
        }
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Current count of `pending` items.
    pub fn size_pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Admits a new item. The caller (the dispatcher) is responsible for
    /// having already decided admission is safe, via the fast path or a
    /// preceding [`PerServiceQueue::displace_for`]; this returns
    /// [`QueueFullError`] as a defensive backstop rather than a normal
    /// control-flow path.
    pub fn enqueue(
        &self,
        event: Arc<Event>,
        service_slug: String,
        priority: u8,
        concurrent: bool,
        discardable: bool,
    ) -> Result<QueueItemId, QueueFullError> {
        let mut inner = self.inner.lock();
        if inner.pending.len() >= self.max_queue_size {
            return Err(QueueFullError {
                max_queue_size: self.max_queue_size,
            });
        }

        let id = Uuid::new_v4();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;

        let item = QueueItem {
            id,
            event,
            service_slug,
            priority,
            concurrent,
            discardable,
            state: QueueItemState::Pending,
            enqueued_at: Utc::now(),
            finished_at: None,
        };

        inner.pending.push(HeapEntry {
            id,
            priority,
            sequence,
        });
        inner.items.insert(id, item);

        Ok(id)
    }

    /// Removes and returns the pending item with the greatest priority,
    /// ties broken by earliest `enqueued_at` (FIFO within a priority
    /// level). Transitions it to `processing` as part of the same
    /// critical section the pop happens in.
    pub fn pop_highest(&self) -> Option<QueueItem> {
        let mut inner = self.inner.lock();
        let entry = inner.pending.pop()?;
        let item = inner
            .items
            .get_mut(&entry.id)
            .expect("heap entry without a backing item");
        item.state = QueueItemState::Processing;
        Some(item.clone())
    }

    /// Returns the id of the pending, discardable item with the smallest
    /// priority strictly less than `priority`, ties broken by oldest
    /// first, or `None` if there is no such item. Read-only: does not
    /// mutate state. Production admission always goes through
    /// [`PerServiceQueue::displace_for`], which performs the equivalent
    /// search and the discard atomically.
    pub fn find_lowest_discardable_below(&self, priority: u8) -> Option<QueueItemId> {
        let inner = self.inner.lock();
        find_victim(&inner, priority)
    }

    /// Atomically finds the lowest-priority-strictly-below-`candidate_priority`
    /// discardable pending item and marks it `discarded`, returning it.
    /// `None` if no such item exists (the dispatcher then drops the
    /// incoming candidate instead).
    pub fn displace_for(&self, candidate_priority: u8) -> Option<QueueItem> {
        let mut inner = self.inner.lock();
        let victim_id = find_victim(&inner, candidate_priority)?;
        Some(discard_locked(&mut inner, victim_id).expect("victim id came from this same lock"))
    }

    /// Marks a pending item `discarded`. Used directly only for explicit
    /// cancellation; displacement uses [`PerServiceQueue::displace_for`].
    pub fn discard(&self, id: QueueItemId) -> Option<QueueItem> {
        let mut inner = self.inner.lock();
        discard_locked(&mut inner, id)
    }

    /// Marks a `processing` item `completed` or `failed`.
    pub fn finish(&self, id: QueueItemId, success: bool) -> Option<QueueItem> {
        let mut inner = self.inner.lock();
        let item = inner.items.get_mut(&id)?;
        if item.state != QueueItemState::Processing {
            return None;
        }
        item.state = if success {
            QueueItemState::Completed
        } else {
            QueueItemState::Failed
        };
        item.finished_at = Some(Utc::now());
        Some(item.clone())
    }

    /// A point-in-time lookup of an item by id, regardless of state.
    pub fn get(&self, id: QueueItemId) -> Option<QueueItem> {
        self.inner.lock().items.get(&id).cloned()
    }

    /// Removes a specific pending item outright (distinct from
    /// [`PerServiceQueue::discard`] only in that callers use this for
    /// explicit operator-driven removal rather than the displacement
    /// policy; both end in the same `discarded` terminal state).
    pub fn remove(&self, id: QueueItemId) -> Option<QueueItem> {
        let mut inner = self.inner.lock();
        discard_locked(&mut inner, id)
    }

    /// Snapshot of how many items are in each lifecycle state. Used by
    /// worker status reporting; a point-in-time read, not transactional
    /// with respect to concurrent pops/discards.
    pub fn state_counts(&self) -> QueueStateCounts {
        let inner = self.inner.lock();
        let mut counts = QueueStateCounts::default();
        for item in inner.items.values() {
            match item.state {
                QueueItemState::Pending => counts.pending += 1,
                QueueItemState::Processing => counts.processing += 1,
                QueueItemState::Completed => counts.completed += 1,
                QueueItemState::Failed => counts.failed += 1,
                QueueItemState::Discarded => counts.discarded += 1,
            }
        }
        counts
    }
}

/// Per-state item counts for one service's queue, at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStateCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub discarded: usize,
}

fn find_victim(inner: &QueueInner, priority: u8) -> Option<QueueItemId> {
    inner
        .pending
        .iter()
        .filter(|entry| entry.priority < priority)
        .filter(|entry| {
            inner
                .items
                .get(&entry.id)
                .is_some_and(|item| item.state == QueueItemState::Pending && item.discardable)
        })
        .min_by(|a, b| match a.priority.cmp(&b.priority) {
            Ordering::Equal => a.sequence.cmp(&b.sequence),
            ordering => ordering,
        })
        .map(|entry| entry.id)
}

fn discard_locked(inner: &mut QueueInner, id: QueueItemId) -> Option<QueueItem> {
    let item = inner.items.get_mut(&id)?;
    if item.state != QueueItemState::Pending {
        return None;
    }
    item.state = QueueItemState::Discarded;
    item.finished_at = Some(Utc::now());
    let snapshot = item.clone();

    let mut rebuilt: BinaryHeap<HeapEntry> = inner
        .pending
        .iter()
        .copied()
        .filter(|entry| entry.id != id)
        .collect();
    std::mem::swap(&mut inner.pending, &mut rebuilt);

    Some(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use liveops_contracts::{CommenterBadges, EventKind, EventPayload, EventUser};

    fn comment_event() -> Arc<Event> {
        Arc::new(Event {
            kind: EventKind::Comment,
            timestamp: Utc::now(),
            room_id: "room".into(),
            streamer_unique_id: "streamer".into(),
            user: EventUser {
                user_id: "u1".into(),
                handle: "u1".into(),
                display_name: "U1".into(),
                is_moderator: false,
                is_subscriber: false,
                gifter_level: None,
                member_level: None,
            },
            payload: EventPayload::Comment {
                text: "hi".into(),
                badges: CommenterBadges::default(),
            },
            streaking: None,
            streak_id: None,
            streak_phase: None,
        })
    }

    fn gift_event() -> Arc<Event> {
        let mut event = (*comment_event()).clone();
        event.kind = EventKind::Gift;
        event.payload = EventPayload::Gift {
            gift_id: "rose".into(),
            gift_name: "Rose".into(),
            diamond_value: 1,
            repeat_count: 1,
            running_total: None,
        };
        Arc::new(event)
    }

    #[test]
    fn fifo_within_a_priority() {
        let queue = PerServiceQueue::new(10);
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(
                queue
                    .enqueue(comment_event(), "svc".into(), 5, false, true)
                    .unwrap(),
            );
        }
        for expected in ids {
            let popped = queue.pop_highest().unwrap();
            assert_eq!(popped.id, expected);
        }
        assert!(queue.pop_highest().is_none());
    }

    #[test]
    fn priority_beats_age() {
        let queue = PerServiceQueue::new(10);
        let c1 = queue
            .enqueue(comment_event(), "svc".into(), 5, false, false)
            .unwrap();
        let g1 = queue
            .enqueue(gift_event(), "svc".into(), 9, false, false)
            .unwrap();
        let c2 = queue
            .enqueue(comment_event(), "svc".into(), 5, false, false)
            .unwrap();

        assert_eq!(queue.pop_highest().unwrap().id, g1);
        assert_eq!(queue.pop_highest().unwrap().id, c1);
        assert_eq!(queue.pop_highest().unwrap().id, c2);
    }

    #[test]
    fn saturation_drops_on_equal_priority() {
        let queue = PerServiceQueue::new(3);
        for _ in 0..3 {
            queue
                .enqueue(comment_event(), "svc".into(), 3, false, true)
                .unwrap();
        }
        assert!(queue.enqueue(comment_event(), "svc".into(), 3, false, true).is_err());
        assert!(queue.displace_for(3).is_none());
    }

    #[test]
    fn saturation_displaces_oldest_lower_priority_discardable() {
        let queue = PerServiceQueue::new(3);
        let c1 = queue
            .enqueue(comment_event(), "svc".into(), 3, false, true)
            .unwrap();
        queue
            .enqueue(comment_event(), "svc".into(), 3, false, true)
            .unwrap();
        queue
            .enqueue(comment_event(), "svc".into(), 3, false, true)
            .unwrap();

        let victim = queue.displace_for(9).expect("a victim should yield");
        assert_eq!(victim.id, c1);
        assert_eq!(victim.state, QueueItemState::Discarded);

        let g1 = queue
            .enqueue(gift_event(), "svc".into(), 9, false, false)
            .unwrap();
        assert_eq!(queue.size_pending(), 3);

        assert_eq!(queue.pop_highest().unwrap().id, g1);
    }

    #[test]
    fn displacement_skips_non_discardable_items_below_candidate() {
        let queue = PerServiceQueue::new(2);
        queue
            .enqueue(comment_event(), "svc".into(), 1, false, false)
            .unwrap();
        let discardable_id = queue
            .enqueue(comment_event(), "svc".into(), 4, false, true)
            .unwrap();

        let victim = queue.displace_for(9).expect("discardable victim at priority 4");
        assert_eq!(victim.id, discardable_id);
    }

    #[test]
    fn displacement_requires_strict_inequality() {
        let queue = PerServiceQueue::new(1);
        queue
            .enqueue(comment_event(), "svc".into(), 5, false, true)
            .unwrap();
        assert!(queue.displace_for(5).is_none());
    }

    #[test]
    fn finish_transitions_processing_item_to_terminal_state() {
        let queue = PerServiceQueue::new(1);
        queue
            .enqueue(comment_event(), "svc".into(), 1, false, true)
            .unwrap();
        let item = queue.pop_highest().unwrap();
        assert_eq!(item.state, QueueItemState::Processing);

        let finished = queue.finish(item.id, true).unwrap();
        assert_eq!(finished.state, QueueItemState::Completed);
        assert!(finished.finished_at.is_some());
    }

    #[test]
    fn state_counts_reflect_lifecycle() {
        let queue = PerServiceQueue::new(2);
        let a = queue
            .enqueue(comment_event(), "svc".into(), 1, false, true)
            .unwrap();
        queue
            .enqueue(comment_event(), "svc".into(), 1, false, true)
            .unwrap();

        let popped = queue.pop_highest().unwrap();
        assert_eq!(popped.id, a);
        queue.finish(a, false).unwrap();

        let counts = queue.state_counts();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.failed, 1);
    }
}
