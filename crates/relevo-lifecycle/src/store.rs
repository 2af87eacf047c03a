use crate::entity::Entity;
use crate::state::EntityState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relevo_core::{RelevoError, RelevoResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// One committed lifecycle transition, retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The entity that moved.
    pub entity_id: Uuid,
    /// State before.
    pub from: EntityState,
    /// State after.
    pub to: EntityState,
    /// Why the transition happened.
    pub reason: String,
    /// When it was committed.
    pub at: DateTime<Utc>,
}

/// Trait for entity persistence with compare-and-set transitions.
///
/// `transition` takes the state the caller believes is current; when the
/// stored state differs the call fails with [`RelevoError::Conflict`] and
/// the caller reloads and recomputes. This is what makes concurrent runs
/// against the same entity safe without a distributed lock.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Persists a new entity. Fails if the id already exists.
    async fn insert(&self, entity: Entity) -> RelevoResult<()>;

    /// Fetches an entity, scoped to its org. A wrong org reads as absent.
    async fn get(&self, entity_id: Uuid, org_id: &str) -> RelevoResult<Option<Entity>>;

    /// Moves an entity from `expected` to `to`, recording `reason`.
    ///
    /// Fails with `Conflict` when the stored state is not `expected`, and
    /// with `Lifecycle` when the edge is not legal.
    async fn transition(
        &self,
        entity_id: Uuid,
        org_id: &str,
        expected: EntityState,
        to: EntityState,
        reason: &str,
    ) -> RelevoResult<Entity>;

    /// Increments an attempt counter and returns the new value.
    async fn increment_counter(
        &self,
        entity_id: Uuid,
        org_id: &str,
        action: &str,
    ) -> RelevoResult<u32>;

    /// Marks the entity as needing operator attention.
    async fn flag_for_review(&self, entity_id: Uuid, org_id: &str) -> RelevoResult<()>;

    /// The entity's committed transitions, oldest first.
    async fn history(&self, entity_id: Uuid, org_id: &str) -> RelevoResult<Vec<TransitionRecord>>;
}

/// In-memory entity store. CAS happens under a single write lock.
pub struct InMemoryEntityStore {
    entities: RwLock<HashMap<Uuid, Entity>>,
    transitions: RwLock<Vec<TransitionRecord>>,
}

impl InMemoryEntityStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            transitions: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn insert(&self, entity: Entity) -> RelevoResult<()> {
        let mut entities = self.entities.write().await;
        if entities.contains_key(&entity.entity_id) {
            return Err(RelevoError::Lifecycle(format!(
                "entity {} already exists",
                entity.entity_id
            )));
        }
        entities.insert(entity.entity_id, entity);
        Ok(())
    }

    async fn get(&self, entity_id: Uuid, org_id: &str) -> RelevoResult<Option<Entity>> {
        let entities = self.entities.read().await;
        Ok(entities
            .get(&entity_id)
            .filter(|e| e.org_id == org_id)
            .cloned())
    }

    async fn transition(
        &self,
        entity_id: Uuid,
        org_id: &str,
        expected: EntityState,
        to: EntityState,
        reason: &str,
    ) -> RelevoResult<Entity> {
        let mut entities = self.entities.write().await;
        let entity = entities
            .get_mut(&entity_id)
            .filter(|e| e.org_id == org_id)
            .ok_or_else(|| RelevoError::Lifecycle(format!("entity {entity_id} not found")))?;

        if entity.state != expected {
            return Err(RelevoError::Conflict(format!(
                "expected {expected}, found {}",
                entity.state
            )));
        }
        if !EntityState::allowed(expected, to) {
            return Err(RelevoError::Lifecycle(format!(
                "illegal transition {expected} -> {to}"
            )));
        }

        entity.state = to;
        entity.updated_at = Utc::now();
        let snapshot = entity.clone();

        info!(entity_id = %entity_id, from = %expected, to = %to, reason, "entity transition");

        self.transitions.write().await.push(TransitionRecord {
            entity_id,
            from: expected,
            to,
            reason: reason.to_string(),
            at: snapshot.updated_at,
        });

        Ok(snapshot)
    }

    async fn increment_counter(
        &self,
        entity_id: Uuid,
        org_id: &str,
        action: &str,
    ) -> RelevoResult<u32> {
        let mut entities = self.entities.write().await;
        let entity = entities
            .get_mut(&entity_id)
            .filter(|e| e.org_id == org_id)
            .ok_or_else(|| RelevoError::Lifecycle(format!("entity {entity_id} not found")))?;

        let count = entity.attempt_counters.entry(action.to_string()).or_insert(0);
        *count += 1;
        entity.updated_at = Utc::now();
        Ok(*count)
    }

    async fn flag_for_review(&self, entity_id: Uuid, org_id: &str) -> RelevoResult<()> {
        let mut entities = self.entities.write().await;
        let entity = entities
            .get_mut(&entity_id)
            .filter(|e| e.org_id == org_id)
            .ok_or_else(|| RelevoError::Lifecycle(format!("entity {entity_id} not found")))?;

        entity.manual_review = true;
        entity.updated_at = Utc::now();
        Ok(())
    }

    async fn history(&self, entity_id: Uuid, org_id: &str) -> RelevoResult<Vec<TransitionRecord>> {
        // Validate the org scope through the entity table first.
        let known = {
            let entities = self.entities.read().await;
            entities
                .get(&entity_id)
                .is_some_and(|e| e.org_id == org_id)
        };
        if !known {
            return Ok(Vec::new());
        }

        let transitions = self.transitions.read().await;
        Ok(transitions
            .iter()
            .filter(|t| t.entity_id == entity_id)
            .cloned()
            .collect())
    }
}
