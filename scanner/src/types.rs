//! Domain types for ticket admission.
//!
//! A scan attempt starts as a [`RedemptionRequest`], is decided by the
//! redemption service (or rejected locally), and ends as an immutable
//! [`ScanRecord`] in the session ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Nonce sent with every manual entry in place of a scanned one.
pub const MANUAL_NONCE: &str = "manual_redeem";

/// Ticket id recorded when a QR payload could not be read as a ticket.
pub const INVALID_QR_TICKET_ID: &str = "Invalid QR";

// ============================================================================
// Scan outcome types
// ============================================================================

/// Identifier of a ledger entry, monotonic within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScanRecordId(u64);

impl ScanRecordId {
    /// Creates an id from its sequence number
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the sequence number
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ScanRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final outcome of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// Ticket admitted
    Success,
    /// Ticket denied (service refusal, invalid code, transport error, timeout)
    Failed,
}

impl ScanStatus {
    /// Stable lowercase name, used as a metrics label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// How the ticket id reached the desk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMethod {
    /// Decoded from a QR code by the camera
    Qr,
    /// Typed in by staff
    Manual,
}

impl ScanMethod {
    /// Stable lowercase name, used as a metrics label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Qr => "qr",
            Self::Manual => "manual",
        }
    }
}

/// One entry of the scan history. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    /// Ledger sequence id
    pub id: ScanRecordId,
    /// Ticket id as presented (or [`INVALID_QR_TICKET_ID`])
    pub ticket_id: String,
    /// Event the session is admitting for
    pub event_name: String,
    /// When the record entered the ledger
    pub timestamp: DateTime<Utc>,
    /// Outcome
    pub status: ScanStatus,
    /// Human-readable outcome text
    pub message: String,
    /// QR or manual
    pub scan_method: ScanMethod,
}

impl ScanRecord {
    /// Whether this attempt admitted the guest
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ScanStatus::Success
    }
}

// ============================================================================
// State machine types
// ============================================================================

/// Current phase of the admission desk.
///
/// Exactly one value holds at a time; only the redemption reducer changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    /// Camera not started yet
    #[default]
    Idle,
    /// Accepting QR payloads and manual entries
    Scanning,
    /// One redemption call in flight
    Validating,
    /// Last attempt admitted; cooling down
    Success,
    /// Last attempt denied; cooling down
    Failed,
    /// The camera could not be started. Terminal for the session.
    Unavailable,
}

impl RedemptionStatus {
    /// Whether a new attempt would be accepted right now
    #[must_use]
    pub const fn accepts_attempts(&self) -> bool {
        matches!(self, Self::Scanning)
    }

    /// Success or Failed: showing an outcome until the cool-down ends
    #[must_use]
    pub const fn is_cooling_down(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Validating => "validating",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// What gets sent to the redemption service for one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRequest {
    /// Non-empty ticket id
    pub ticket_id: String,
    /// Replay token from the QR code, or [`MANUAL_NONCE`]
    pub nonce: String,
    /// Where the ticket id came from
    pub method: ScanMethod,
}

impl RedemptionRequest {
    /// A request read from a QR payload. The nonce is passed through as found.
    #[must_use]
    pub fn qr(ticket_id: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            nonce: nonce.into(),
            method: ScanMethod::Qr,
        }
    }

    /// A request typed in by staff. Always carries [`MANUAL_NONCE`].
    #[must_use]
    pub fn manual(ticket_id: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            nonce: MANUAL_NONCE.to_string(),
            method: ScanMethod::Manual,
        }
    }
}
