//! Order state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Received ──► Validating ──► Validated ──► Enriching ──► Enriched ──► Processing ──┬──► Confirmed ──► Delivered
///    │             │              │             │                         │          │
///    │             │              │             └──────────┬──────────────┘          └──► Failed
///    │             │              │                        ▼
///    │             └──────────────┼──────────────────► Failed
///    └─────────────┴──────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Accepted at intake and queued; items can be modified.
    #[default]
    Received,

    /// Validation stage is running.
    Validating,

    /// Passed validation.
    Validated,

    /// Enrichment stage is running.
    Enriching,

    /// Enrichment completed.
    Enriched,

    /// Reservation and supplier assignment in progress.
    Processing,

    /// Supplier assigned and notified (terminal for the pipeline).
    Confirmed,

    /// Processing failed (terminal state).
    Failed,

    /// Order was cancelled (terminal state).
    Cancelled,

    /// Order has been delivered (terminal state).
    Delivered,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 10] = [
        OrderStatus::Received,
        OrderStatus::Validating,
        OrderStatus::Validated,
        OrderStatus::Enriching,
        OrderStatus::Enriched,
        OrderStatus::Processing,
        OrderStatus::Confirmed,
        OrderStatus::Failed,
        OrderStatus::Cancelled,
        OrderStatus::Delivered,
    ];

    /// Returns true if items can be modified in this state.
    pub fn can_modify_items(&self) -> bool {
        matches!(self, OrderStatus::Received)
    }

    pub fn can_start_validation(&self) -> bool {
        matches!(self, OrderStatus::Received)
    }

    pub fn can_complete_validation(&self) -> bool {
        matches!(self, OrderStatus::Validating)
    }

    pub fn can_start_enrichment(&self) -> bool {
        matches!(self, OrderStatus::Validated)
    }

    pub fn can_complete_enrichment(&self) -> bool {
        matches!(self, OrderStatus::Enriching)
    }

    pub fn can_start_processing(&self) -> bool {
        matches!(self, OrderStatus::Enriched)
    }

    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }

    /// Returns true if a running stage may fail the order from this state.
    pub fn can_fail(&self) -> bool {
        matches!(
            self,
            OrderStatus::Validating | OrderStatus::Enriching | OrderStatus::Processing
        )
    }

    /// Returns true if the order can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::Received | OrderStatus::Validating | OrderStatus::Validated
        )
    }

    pub fn can_deliver(&self) -> bool {
        matches!(self, OrderStatus::Confirmed)
    }

    /// Returns true if this is a terminal state (no further transitions except delivery).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed
                | OrderStatus::Failed
                | OrderStatus::Cancelled
                | OrderStatus::Delivered
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Received => "Received",
            OrderStatus::Validating => "Validating",
            OrderStatus::Validated => "Validated",
            OrderStatus::Enriching => "Enriching",
            OrderStatus::Enriched => "Enriched",
            OrderStatus::Processing => "Processing",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Failed => "Failed",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Delivered => "Delivered",
        }
    }

    /// Parses a status name as produced by [`OrderStatus::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Customer-facing description used in every order response.
    pub fn status_message(&self) -> &'static str {
        match self {
            OrderStatus::Received => "Order received and queued for processing",
            OrderStatus::Validating => "Order is being validated",
            OrderStatus::Validated => "Order validation completed",
            OrderStatus::Enriching => "Order data is being enriched",
            OrderStatus::Enriched => "Order data enrichment completed",
            OrderStatus::Processing => "Order is being processed",
            OrderStatus::Confirmed => "Order confirmed and sent to supplier",
            OrderStatus::Failed => "Order processing failed",
            OrderStatus::Cancelled => "Order was cancelled",
            OrderStatus::Delivered => "Order has been delivered",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
