use crate::cadence::Cadence;
use crate::wake::{ScheduledWake, WakeQueue};
use chrono::{DateTime, Duration, Utc};
use relevo_core::Trigger;
use relevo_lifecycle::{assess, Entity, EntityState, RiskPolicy, REMINDER_ACTION};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

/// Maximum sleep between queue checks, so newly scheduled wakes with an
/// earlier due time are noticed promptly.
const MAX_IDLE: std::time::Duration = std::time::Duration::from_millis(250);

/// Computes the next wake for a non-terminal entity.
///
/// The due time is `created_at + cadence[reminders_sent]`. When the risk
/// assessment says an escalation is already due, the wake fires
/// immediately instead of waiting for the next cadence step. Returns
/// `None` for terminal entities and exhausted cadences.
pub fn plan_wake(
    entity: &Entity,
    session_id: Uuid,
    cadence: &Cadence,
    policy: &RiskPolicy,
    now: DateTime<Utc>,
) -> Option<ScheduledWake> {
    if entity.state.is_terminal() {
        return None;
    }

    let reminders_sent = entity.counter(REMINDER_ACTION);

    let due_at = if assess(entity, policy, now) == Some(EntityState::Escalated) {
        now
    } else {
        entity.created_at + Duration::days(cadence.offset_for(reminders_sent)?)
    };

    Some(ScheduledWake {
        entity_id: entity.entity_id,
        org_id: entity.org_id.clone(),
        session_id,
        due_at,
        expected_reminders: reminders_sent,
    })
}

/// Background scheduler: holds the wake queue and drains due wakes into a
/// trigger channel the orchestration layer consumes.
#[derive(Clone)]
pub struct Scheduler {
    queue: Arc<Mutex<WakeQueue>>,
    tx: mpsc::UnboundedSender<Trigger>,
}

impl Scheduler {
    /// Creates a scheduler and the receiving end of its trigger channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Trigger>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                queue: Arc::new(Mutex::new(WakeQueue::new())),
                tx,
            },
            rx,
        )
    }

    /// Enqueues a wake.
    pub async fn schedule(&self, wake: ScheduledWake) {
        debug!(entity_id = %wake.entity_id, due_at = %wake.due_at, "wake scheduled");
        self.queue.lock().await.schedule(wake);
    }

    /// Number of pending wakes.
    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Drains everything due right now into the trigger channel.
    ///
    /// Returns how many wakes fired. The background loop calls this; tests
    /// and embedders may call it directly for deterministic control.
    pub async fn fire_due(&self, now: DateTime<Utc>) -> usize {
        let fired = self.queue.lock().await.due(now);
        let count = fired.len();
        for wake in fired {
            info!(entity_id = %wake.entity_id, "wake fired");
            let _ = self.tx.send(wake.to_trigger());
        }
        count
    }

    /// Starts the drain loop.
    ///
    /// Sleeps until the nearest due time (capped so fresh wakes are picked
    /// up), fires everything due, re-arms. Runs until the task is aborted.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                scheduler.fire_due(now).await;

                let sleep = {
                    let queue = scheduler.queue.lock().await;
                    match queue.next_due_at() {
                        Some(due) if due > now => (due - now)
                            .to_std()
                            .map(|d| d.min(MAX_IDLE))
                            .unwrap_or(MAX_IDLE),
                        Some(_) => std::time::Duration::ZERO,
                        None => MAX_IDLE,
                    }
                };
                tokio::time::sleep(sleep).await;
            }
        })
    }
}
