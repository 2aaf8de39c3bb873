//! State owned by the redemption reducer.

use crate::ledger::{ScanLedger, ScanStats};
use crate::types::{RedemptionStatus, ScanRecord};
use serde::{Deserialize, Serialize};

/// Message shown before the camera is ready
pub const STARTING_MESSAGE: &str = "Starting camera...";
/// Message shown while scanning
pub const SCANNING_MESSAGE: &str = "Point camera at a QR code";
/// Message shown while a redemption call is in flight
pub const VALIDATING_MESSAGE: &str = "Validating ticket...";
/// Message shown when scanning resumes after a cool-down
pub const READY_MESSAGE: &str = "Ready for next scan...";
/// Prompt shown for a blank manual entry
pub const EMPTY_MANUAL_PROMPT: &str = "Please enter a Ticket ID.";
/// Message shown when the camera cannot be started
pub const CAMERA_UNAVAILABLE_MESSAGE: &str = "Could not start camera. Please grant permission.";
/// Message shown when a ticket is admitted
pub const ADMITTED_MESSAGE: &str = "ADMITTED: Ticket redeemed successfully!";
/// Message shown for an unreadable QR code
pub const INVALID_CODE_MESSAGE: &str = "DENIED: Invalid QR code.";
/// Message shown when the service could not be reached or answered nonsense
pub const SERVICE_ERROR_MESSAGE: &str = "DENIED: Redemption service error.";
/// Ledger text for a refusal that came without a message
pub const REFUSAL_FALLBACK: &str = "Redemption failed.";

/// The whole desk: current status, what to show, and the session history.
#[derive(Debug, Clone)]
pub struct ScannerState {
    /// Current phase
    pub status: RedemptionStatus,
    /// Status line for the operator
    pub message: String,
    /// Event being admitted, copied into every record
    pub event_name: String,
    /// Outcomes of this session
    pub ledger: ScanLedger,
    /// Sequence number of the most recent attempt
    pub(crate) attempt: u64,
}

impl ScannerState {
    /// Idle desk for `event_name` keeping at most `ledger_capacity` records
    #[must_use]
    pub fn new(event_name: impl Into<String>, ledger_capacity: usize) -> Self {
        Self {
            status: RedemptionStatus::Idle,
            message: STARTING_MESSAGE.to_string(),
            event_name: event_name.into(),
            ledger: ScanLedger::with_capacity(ledger_capacity),
            attempt: 0,
        }
    }

    /// Sequence number of the most recent attempt (0 before the first)
    #[must_use]
    pub const fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Read-only projection with the `recent` most recent records
    #[must_use]
    pub fn view(&self, recent: usize) -> ScannerView {
        ScannerView {
            status: self.status,
            message: self.message.clone(),
            event_name: self.event_name.clone(),
            history: self.ledger.recent(recent),
            stats: self.ledger.stats(),
        }
    }
}

/// What a UI needs to render the desk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerView {
    /// Current phase
    pub status: RedemptionStatus,
    /// Status line
    pub message: String,
    /// Event being admitted
    pub event_name: String,
    /// Most recent records first
    pub history: Vec<ScanRecord>,
    /// Counts over the whole ledger
    pub stats: ScanStats,
}
