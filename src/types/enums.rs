//! Shared enum types used across the session core.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Api Method
// ---------------------------------------------------------------------------

/// Which API channel produced or should carry an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMethod {
    /// The request/response HTTP channel.
    Rest,
    /// The bidirectional streaming channel.
    Websocket,
}

// ---------------------------------------------------------------------------
// Margin Type
// ---------------------------------------------------------------------------

/// Margin mode of an order or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginType {
    Isolated,
    Cross,
}

impl MarginType {
    /// The lowercase wire form most venues use.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Isolated => "isolated",
            Self::Cross => "cross",
        }
    }
}

// ---------------------------------------------------------------------------
// Order Status
// ---------------------------------------------------------------------------

/// Status of an order, totally ordered so it can serve as a monotone merge
/// key: a cached order's status never decreases, which makes the reconciler
/// immune to stream pushes and request responses arriving out of order.
///
/// The two `*InFlight` values are local-only optimistic states stamped before
/// the first network await; every venue acknowledgement ranks above them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Create request sent, no acknowledgement yet (local-only).
    CreateInFlight = 1,
    /// Cancel request sent, no acknowledgement yet (local-only).
    CancelInFlight = 2,
    /// Venue acknowledged the create request.
    CreateAcknowledged = 3,
    /// Venue acknowledged the cancel request.
    CancelAcknowledged = 4,
    /// Conditional order accepted but not yet triggered.
    Untriggered = 5,
    /// Resting on the book, nothing filled.
    New = 6,
    /// Some quantity filled, remainder resting.
    PartiallyFilled = 7,
    /// Fully filled.
    Filled = 8,
    /// Canceled by the user or the venue.
    Canceled = 9,
    /// Expired per its time-in-force.
    Expired = 10,
    /// Rejected by the venue.
    Rejected = 11,
}

impl OrderStatus {
    /// Local-only: no venue acknowledgement has been received.
    pub fn is_in_flight(self) -> bool {
        self <= Self::CancelInFlight
    }

    /// Acknowledged and still able to fill.
    pub fn is_open(self) -> bool {
        self >= Self::CreateAcknowledged && self <= Self::PartiallyFilled
    }

    /// Terminal.
    pub fn is_closed(self) -> bool {
        self >= Self::Filled
    }

    /// Open and not already cancel-acknowledged.
    pub fn is_eligible_to_cancel(self) -> bool {
        self.is_open() && self != Self::CancelAcknowledged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progression_is_totally_ordered() {
        assert!(OrderStatus::CreateInFlight < OrderStatus::CancelInFlight);
        assert!(OrderStatus::CancelInFlight < OrderStatus::CreateAcknowledged);
        assert!(OrderStatus::CreateAcknowledged < OrderStatus::CancelAcknowledged);
        assert!(OrderStatus::CancelAcknowledged < OrderStatus::Untriggered);
        assert!(OrderStatus::Untriggered < OrderStatus::New);
        assert!(OrderStatus::New < OrderStatus::PartiallyFilled);
        assert!(OrderStatus::PartiallyFilled < OrderStatus::Filled);
        assert!(OrderStatus::Filled < OrderStatus::Canceled);
        assert!(OrderStatus::Canceled < OrderStatus::Expired);
        assert!(OrderStatus::Expired < OrderStatus::Rejected);
    }

    #[test]
    fn predicates_partition_the_progression() {
        use OrderStatus::*;
        for status in [
            CreateInFlight,
            CancelInFlight,
            CreateAcknowledged,
            CancelAcknowledged,
            Untriggered,
            New,
            PartiallyFilled,
            Filled,
            Canceled,
            Expired,
            Rejected,
        ] {
            let in_flight = matches!(status, CreateInFlight | CancelInFlight);
            let open = matches!(status, CreateAcknowledged | CancelAcknowledged | Untriggered | New | PartiallyFilled);
            let closed = matches!(status, Filled | Canceled | Expired | Rejected);
            assert_eq!(status.is_in_flight(), in_flight);
            assert_eq!(status.is_open(), open);
            assert_eq!(status.is_closed(), closed);
            assert_eq!(status.is_eligible_to_cancel(), open && status != CancelAcknowledged);
        }
    }
}
