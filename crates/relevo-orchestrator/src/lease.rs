use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

struct Lease {
    holder: Uuid,
    expires_at: Instant,
}

/// Per-entity advisory leases with TTL.
///
/// At most one active run per entity: a run acquires the lease at start
/// and releases it on terminate or abort. A lease left behind by a crashed
/// run expires on its own and becomes reclaimable. The lock is advisory —
/// the entity store's compare-and-set transitions remain the correctness
/// backstop.
pub struct LeaseTable {
    leases: Mutex<HashMap<Uuid, Lease>>,
    ttl: Duration,
}

impl LeaseTable {
    /// Creates a table whose leases expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Attempts to take the lease for an entity right now.
    ///
    /// Returns a holder token on success, `None` when another unexpired
    /// holder has it.
    pub fn try_acquire(&self, entity_id: Uuid) -> Option<Uuid> {
        let mut leases = self.leases.lock();
        let now = Instant::now();

        if let Some(lease) = leases.get(&entity_id) {
            if lease.expires_at > now {
                return None;
            }
        }

        let holder = Uuid::new_v4();
        leases.insert(
            entity_id,
            Lease {
                holder,
                expires_at: now + self.ttl,
            },
        );
        Some(holder)
    }

    /// Takes the lease, polling for up to `wait`.
    ///
    /// A run that still cannot acquire within the wait is deferred by the
    /// caller (re-enqueued), not failed.
    pub async fn acquire(&self, entity_id: Uuid, wait: Duration) -> Option<Uuid> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(holder) = self.try_acquire(entity_id) {
                return Some(holder);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Releases a lease, if this holder still owns it.
    ///
    /// A holder whose lease already expired and was reclaimed by another
    /// run must not release the new owner's lease.
    pub fn release(&self, entity_id: Uuid, holder: Uuid) {
        let mut leases = self.leases.lock();
        if leases.get(&entity_id).is_some_and(|l| l.holder == holder) {
            leases.remove(&entity_id);
        }
    }

    /// Drops expired leases. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut leases = self.leases.lock();
        let before = leases.len();
        leases.retain(|_, l| l.expires_at > now);
        before - leases.len()
    }
}
