use crate::entity::{Entity, REMINDER_ACTION};
use crate::state::EntityState;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// When an entity drops to at-risk and when it escalates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPolicy {
    /// How many days before the deadline an incomplete entity is at risk.
    pub warning_window_days: i64,
    /// Reminder count at which an at-risk entity escalates.
    pub escalation_threshold: u32,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            warning_window_days: 7,
            escalation_threshold: 4,
        }
    }
}

/// Computes the risk transition an entity is due for, if any.
///
/// - `AtRisk` when the deadline falls inside the warning window and the
///   workflow has not fulfilled.
/// - `Escalated` when an at-risk entity's reminder count has reached the
///   threshold.
///
/// Purely a computation; the caller commits the transition (and the
/// scheduler reads the new state to decide what is due).
pub fn assess(entity: &Entity, policy: &RiskPolicy, now: DateTime<Utc>) -> Option<EntityState> {
    if entity.state.is_terminal() {
        return None;
    }

    if entity.state == EntityState::AtRisk
        && entity.counter(REMINDER_ACTION) >= policy.escalation_threshold
    {
        return Some(EntityState::Escalated);
    }

    if entity.state != EntityState::AtRisk && entity.state != EntityState::Escalated {
        if let Some(deadline) = entity.deadline {
            let warning_starts = deadline - Duration::days(policy.warning_window_days);
            if now >= warning_starts {
                return Some(EntityState::AtRisk);
            }
        }
    }

    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::entity::WorkflowKind;

    fn entity_with_deadline(days_out: i64) -> Entity {
        let mut entity = Entity::new("org-a", WorkflowKind::DocumentCase)
            .with_deadline(Utc::now() + Duration::days(days_out));
        entity.state = EntityState::Active;
        entity
    }

    #[test]
    fn test_far_deadline_not_at_risk() {
        let entity = entity_with_deadline(30);
        assert_eq!(assess(&entity, &RiskPolicy::default(), Utc::now()), None);
    }

    #[test]
    fn test_deadline_inside_window_is_at_risk() {
        let entity = entity_with_deadline(3);
        assert_eq!(
            assess(&entity, &RiskPolicy::default(), Utc::now()),
            Some(EntityState::AtRisk)
        );
    }

    #[test]
    fn test_past_deadline_is_at_risk() {
        let entity = entity_with_deadline(-2);
        assert_eq!(
            assess(&entity, &RiskPolicy::default(), Utc::now()),
            Some(EntityState::AtRisk)
        );
    }

    #[test]
    fn test_threshold_reached_escalates() {
        // Four reminders sent with no response: the next assessment moves
        // the entity from at_risk to escalated.
        let mut entity = entity_with_deadline(1);
        entity.state = EntityState::AtRisk;
        entity
            .attempt_counters
            .insert(REMINDER_ACTION.to_string(), 4);

        assert_eq!(
            assess(&entity, &RiskPolicy::default(), Utc::now()),
            Some(EntityState::Escalated)
        );
    }

    #[test]
    fn test_below_threshold_stays_at_risk() {
        let mut entity = entity_with_deadline(1);
        entity.state = EntityState::AtRisk;
        entity
            .attempt_counters
            .insert(REMINDER_ACTION.to_string(), 3);

        assert_eq!(assess(&entity, &RiskPolicy::default(), Utc::now()), None);
    }

    #[test]
    fn test_terminal_entity_never_assessed() {
        let mut entity = entity_with_deadline(-10);
        entity.state = EntityState::Fulfilled;
        assert_eq!(assess(&entity, &RiskPolicy::default(), Utc::now()), None);
    }

    #[test]
    fn test_escalated_entity_not_reassessed() {
        let mut entity = entity_with_deadline(-10);
        entity.state = EntityState::Escalated;
        entity
            .attempt_counters
            .insert(REMINDER_ACTION.to_string(), 9);
        assert_eq!(assess(&entity, &RiskPolicy::default(), Utc::now()), None);
    }

    #[test]
    fn test_no_deadline_no_risk() {
        let mut entity = Entity::new("org-a", WorkflowKind::Lead);
        entity.state = EntityState::Active;
        assert_eq!(assess(&entity, &RiskPolicy::default(), Utc::now()), None);
    }
}
