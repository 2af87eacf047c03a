use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The side-effecting operation families the gateway can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Deliver a message to the counterpart (email, SMS).
    SendMessage,
    /// Reserve a fulfillment slot in a calendar.
    BookSlot,
    /// Capture a payment.
    CapturePayment,
    /// Send a nudge about an incomplete step.
    SendReminder,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::SendMessage => write!(f, "send_message"),
            OperationKind::BookSlot => write!(f, "book_slot"),
            OperationKind::CapturePayment => write!(f, "capture_payment"),
            OperationKind::SendReminder => write!(f, "send_reminder"),
        }
    }
}

/// Failure of an external operation, classified for the retry policy.
///
/// Transient failures (timeouts, 5xx-equivalents) are retried with backoff;
/// permanent ones (validation errors) surface immediately.
#[derive(Debug, Clone)]
pub struct OperationError {
    /// Whether the gateway may retry this failure.
    pub retryable: bool,
    /// What went wrong.
    pub detail: String,
}

impl OperationError {
    /// A failure worth retrying.
    pub fn transient(detail: impl Into<String>) -> Self {
        Self {
            retryable: true,
            detail: detail.into(),
        }
    }

    /// A failure that retrying cannot fix.
    pub fn permanent(detail: impl Into<String>) -> Self {
        Self {
            retryable: false,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.detail)
    }
}

/// An external side-effecting action the gateway can invoke.
///
/// Implementations should honor a downstream idempotency key when the
/// external system supports one; otherwise the gateway's own cache is the
/// only dedup protection (weaker but accepted).
#[async_trait]
pub trait ExternalOperation: Send + Sync {
    /// Which operation family this handles.
    fn kind(&self) -> OperationKind;

    /// Executes the side effect.
    async fn execute(&self, payload: &serde_json::Value)
        -> Result<serde_json::Value, OperationError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(OperationError::transient("gateway timeout").retryable);
        assert!(!OperationError::permanent("invalid phone number").retryable);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(OperationKind::BookSlot.to_string(), "book_slot");
        assert_eq!(OperationKind::CapturePayment.to_string(), "capture_payment");
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&OperationKind::SendReminder).unwrap();
        assert_eq!(json, "\"send_reminder\"");
    }
}
