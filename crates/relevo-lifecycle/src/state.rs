use serde::{Deserialize, Serialize};

/// Lifecycle state of a tracked entity.
///
/// Generic names; concrete workflows map their own labels onto this shape
/// (a lead is `Qualifying`, a document case with everything received is
/// `Fulfilled`, an ignored invoice is `AtRisk`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// Just created by the first trigger.
    New,
    /// Being qualified by the lead-response stage.
    Qualifying,
    /// Qualification declined. Terminal.
    Rejected,
    /// Qualified and moving through scheduling.
    Active,
    /// Booked; waiting on fulfillment and payment.
    AwaitingFulfillment,
    /// Done. Terminal.
    Fulfilled,
    /// Deadline approaching with required steps incomplete.
    AtRisk,
    /// Reminder attempts exhausted; needs a human.
    Escalated,
    /// Explicitly abandoned. Terminal.
    ClosedLost,
}

impl EntityState {
    /// Whether no further transitions are possible from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EntityState::Fulfilled | EntityState::Rejected | EntityState::ClosedLost
        )
    }

    /// Whether `from -> to` is a legal edge of the lifecycle machine.
    ///
    /// Any non-terminal state may drop to `AtRisk` (deadline pressure) or
    /// `ClosedLost` (abandonment). Recovery edges let an at-risk or
    /// escalated entity resume once the counterpart re-engages.
    pub fn allowed(from: EntityState, to: EntityState) -> bool {
        use EntityState::*;

        if from.is_terminal() || from == to {
            return false;
        }
        match (from, to) {
            (_, ClosedLost) => true,
            (_, AtRisk) => from != Escalated,
            (New, Qualifying) => true,
            (Qualifying, Rejected) | (Qualifying, Active) => true,
            (Active, AwaitingFulfillment) => true,
            (AwaitingFulfillment, Fulfilled) => true,
            (AtRisk, Escalated) => true,
            // Recovery after a risk detour.
            (AtRisk | Escalated, Active | AwaitingFulfillment | Fulfilled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityState::New => "new",
            EntityState::Qualifying => "qualifying",
            EntityState::Rejected => "rejected",
            EntityState::Active => "active",
            EntityState::AwaitingFulfillment => "awaiting_fulfillment",
            EntityState::Fulfilled => "fulfilled",
            EntityState::AtRisk => "at_risk",
            EntityState::Escalated => "escalated",
            EntityState::ClosedLost => "closed_lost",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::EntityState::*;
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(Fulfilled.is_terminal());
        assert!(Rejected.is_terminal());
        assert!(ClosedLost.is_terminal());
        assert!(!Escalated.is_terminal());
        assert!(!New.is_terminal());
    }

    #[test]
    fn test_happy_path_edges() {
        assert!(EntityState::allowed(New, Qualifying));
        assert!(EntityState::allowed(Qualifying, Active));
        assert!(EntityState::allowed(Qualifying, Rejected));
        assert!(EntityState::allowed(Active, AwaitingFulfillment));
        assert!(EntityState::allowed(AwaitingFulfillment, Fulfilled));
    }

    #[test]
    fn test_risk_edges() {
        // Any non-terminal state can drop to at_risk except escalated.
        assert!(EntityState::allowed(Active, AtRisk));
        assert!(EntityState::allowed(AwaitingFulfillment, AtRisk));
        assert!(EntityState::allowed(AtRisk, Escalated));
        assert!(!EntityState::allowed(Escalated, AtRisk));
        assert!(!EntityState::allowed(Fulfilled, AtRisk));
    }

    #[test]
    fn test_abandonment_from_anywhere_non_terminal() {
        assert!(EntityState::allowed(New, ClosedLost));
        assert!(EntityState::allowed(Escalated, ClosedLost));
        assert!(!EntityState::allowed(Rejected, ClosedLost));
    }

    #[test]
    fn test_no_exit_from_terminal() {
        for to in [New, Qualifying, Active, AtRisk, Escalated] {
            assert!(!EntityState::allowed(Fulfilled, to));
            assert!(!EntityState::allowed(ClosedLost, to));
        }
    }

    #[test]
    fn test_no_self_loop() {
        assert!(!EntityState::allowed(Active, Active));
    }

    #[test]
    fn test_recovery_edges() {
        assert!(EntityState::allowed(AtRisk, Active));
        assert!(EntityState::allowed(Escalated, Fulfilled));
    }

    #[test]
    fn test_no_skipping_qualification() {
        assert!(!EntityState::allowed(New, Active));
        assert!(!EntityState::allowed(New, Fulfilled));
    }
}
