use chrono::{DateTime, Utc};
use relevo_core::{Trigger, TriggerKind};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use uuid::Uuid;

/// A future trigger computed by the scheduler.
///
/// Carries the reminder-counter snapshot observed when the wake was
/// enqueued. If the entity progresses past that count before the wake
/// fires, the fired run is a no-op rather than a duplicate nudge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledWake {
    /// The entity to wake.
    pub entity_id: Uuid,
    /// Tenant partition.
    pub org_id: String,
    /// Session the fired run will use.
    pub session_id: Uuid,
    /// When the wake is due.
    pub due_at: DateTime<Utc>,
    /// `attempt_counters["reminder"]` at enqueue time.
    pub expected_reminders: u32,
}

impl ScheduledWake {
    /// The trigger a fired wake turns into.
    pub fn to_trigger(&self) -> Trigger {
        Trigger::new(
            self.entity_id,
            self.org_id.clone(),
            self.session_id,
            TriggerKind::Scheduled,
        )
        .with_payload(serde_json::json!({
            "expected_reminders": self.expected_reminders,
        }))
    }
}

impl Ord for ScheduledWake {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due_at
            .cmp(&other.due_at)
            .then_with(|| self.entity_id.cmp(&other.entity_id))
    }
}

impl PartialOrd for ScheduledWake {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending wakes, ordered by due time.
#[derive(Debug, Default)]
pub struct WakeQueue {
    heap: BinaryHeap<Reverse<ScheduledWake>>,
}

impl WakeQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a wake.
    pub fn schedule(&mut self, wake: ScheduledWake) {
        self.heap.push(Reverse(wake));
    }

    /// Drains every wake due at or before `now`, earliest first.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<ScheduledWake> {
        let mut fired = Vec::new();
        while let Some(Reverse(next)) = self.heap.peek() {
            if next.due_at > now {
                break;
            }
            if let Some(Reverse(wake)) = self.heap.pop() {
                fired.push(wake);
            }
        }
        fired
    }

    /// The earliest due time, if any wake is pending.
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|Reverse(w)| w.due_at)
    }

    /// Number of pending wakes.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether no wakes are pending.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn wake_at(due_at: DateTime<Utc>, expected: u32) -> ScheduledWake {
        ScheduledWake {
            entity_id: Uuid::new_v4(),
            org_id: "org-a".to_string(),
            session_id: Uuid::new_v4(),
            due_at,
            expected_reminders: expected,
        }
    }

    #[test]
    fn test_due_drains_in_order() {
        let now = Utc::now();
        let mut queue = WakeQueue::new();
        queue.schedule(wake_at(now - Duration::hours(1), 1));
        queue.schedule(wake_at(now - Duration::hours(3), 0));
        queue.schedule(wake_at(now + Duration::hours(1), 2));

        let fired = queue.due(now);
        assert_eq!(fired.len(), 2);
        assert!(fired[0].due_at < fired[1].due_at);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_nothing_due_in_future() {
        let now = Utc::now();
        let mut queue = WakeQueue::new();
        queue.schedule(wake_at(now + Duration::days(7), 0));

        assert!(queue.due(now).is_empty());
        assert_eq!(queue.next_due_at(), Some(queue.heap.peek().unwrap().0.due_at));
    }

    #[test]
    fn test_next_due_at_is_earliest() {
        let now = Utc::now();
        let mut queue = WakeQueue::new();
        queue.schedule(wake_at(now + Duration::days(14), 1));
        queue.schedule(wake_at(now + Duration::days(7), 0));

        assert_eq!(queue.next_due_at(), Some(now + Duration::days(7)));
    }

    #[test]
    fn test_trigger_carries_snapshot() {
        let wake = wake_at(Utc::now(), 3);
        let trigger = wake.to_trigger();
        assert_eq!(trigger.kind, TriggerKind::Scheduled);
        assert_eq!(trigger.entity_id, wake.entity_id);
        assert_eq!(trigger.expected_reminders(), Some(3));
    }

    #[test]
    fn test_empty_queue() {
        let mut queue = WakeQueue::new();
        assert!(queue.is_empty());
        assert!(queue.due(Utc::now()).is_empty());
        assert_eq!(queue.next_due_at(), None);
    }
}
