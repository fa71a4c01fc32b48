//! Order payment status state machine
//!
//! Every write goes through a compare-and-set against [`transition_sources`],
//! so concurrent deliveries for the same order resolve to a single winner.

use crate::payments::types::WebhookEventKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Failed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

impl From<WebhookEventKind> for PaymentStatus {
    fn from(kind: WebhookEventKind) -> Self {
        match kind {
            WebhookEventKind::Completed => PaymentStatus::Paid,
            WebhookEventKind::Failed => PaymentStatus::Failed,
            WebhookEventKind::Processing => PaymentStatus::Processing,
        }
    }
}

/// States from which a webhook signal may move an order into `target`
pub fn transition_sources(target: PaymentStatus) -> &'static [PaymentStatus] {
    match target {
        PaymentStatus::Processing => &[PaymentStatus::Pending],
        PaymentStatus::Paid | PaymentStatus::Failed => {
            &[PaymentStatus::Pending, PaymentStatus::Processing]
        }
        // Only a new attempt re-enters pending, never a webhook.
        PaymentStatus::Pending => &[],
    }
}

pub fn can_transition(current: PaymentStatus, target: PaymentStatus) -> bool {
    transition_sources(target).contains(&current)
}

/// Why a conditional write did not apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The order already holds the target state (replayed delivery)
    Duplicate,
    /// The order is in a state the signal may not move it out of
    Stale,
}

/// Classify a signal that lost the compare-and-set against `current`
pub fn classify_rejection(current: PaymentStatus, target: PaymentStatus) -> Rejection {
    if current == target {
        Rejection::Duplicate
    } else {
        Rejection::Stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paid_reachable_from_open_states_only() {
        assert!(can_transition(PaymentStatus::Pending, PaymentStatus::Paid));
        assert!(can_transition(PaymentStatus::Processing, PaymentStatus::Paid));
        assert!(!can_transition(PaymentStatus::Paid, PaymentStatus::Paid));
        assert!(!can_transition(PaymentStatus::Failed, PaymentStatus::Paid));
    }

    #[test]
    fn test_paid_never_downgrades() {
        for target in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Failed,
        ] {
            assert!(!can_transition(PaymentStatus::Paid, target));
        }
        assert_eq!(
            classify_rejection(PaymentStatus::Paid, PaymentStatus::Failed),
            Rejection::Stale
        );
    }

    #[test]
    fn test_replay_is_duplicate() {
        assert_eq!(
            classify_rejection(PaymentStatus::Paid, PaymentStatus::Paid),
            Rejection::Duplicate
        );
        assert_eq!(
            classify_rejection(PaymentStatus::Processing, PaymentStatus::Processing),
            Rejection::Duplicate
        );
    }

    #[test]
    fn test_processing_only_from_pending() {
        assert!(can_transition(PaymentStatus::Pending, PaymentStatus::Processing));
        assert!(!can_transition(PaymentStatus::Failed, PaymentStatus::Processing));
        assert!(transition_sources(PaymentStatus::Pending).is_empty());
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Paid,
            PaymentStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }
}
