//! Processed webhook / recovery event records

use serde::{Deserialize, Serialize};

/// Ledger state of one event key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Claimed by a worker, side effect in flight
    Processing,
    /// Side effect done; blocks duplicates forever
    Processed,
    /// Side effect failed; may be reclaimed
    Failed,
}

impl EventStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(Self::Processing),
            "processed" => Some(Self::Processed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

/// One row of the event ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedEvent {
    pub event_key: String,
    pub event_type: String,
    pub status: EventStatus,
    pub claimed_at: i64,
    pub processed_at: Option<i64>,
    pub last_error: Option<String>,
}

/// Result of trying to claim an event key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Caller owns the key and must mark it processed or failed
    Claimed,
    /// Another worker currently holds the claim
    InFlight,
    /// Side effect already done
    AlreadyProcessed,
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, Self::Claimed)
    }
}
