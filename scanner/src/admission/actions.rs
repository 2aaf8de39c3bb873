//! Inputs of the redemption state machine.

use crate::redemption::{RedemptionError, RedemptionResponse};
use crate::types::RedemptionRequest;

/// Everything the redemption reducer reacts to.
///
/// Camera and staff inputs arrive through the session; the last two variants
/// are only ever produced by the reducer's own effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannerAction {
    /// The capture device started
    CameraReady,

    /// The capture device could not be started
    CameraFailed {
        /// Device error text
        reason: String,
    },

    /// The decode source delivered a payload
    PayloadDecoded {
        /// Raw decoded string
        payload: String,
    },

    /// Staff submitted a ticket id by hand
    ManualSubmitted {
        /// Raw input, possibly blank
        input: String,
    },

    /// The redemption call for an attempt settled (or timed out)
    RedemptionCompleted {
        /// Attempt this result belongs to
        attempt: u64,
        /// The request that was sent
        request: RedemptionRequest,
        /// Decision or error
        outcome: Result<RedemptionResponse, RedemptionError>,
    },

    /// The cool-down after an attempt's outcome is over
    CooldownElapsed {
        /// Attempt whose outcome was being shown
        attempt: u64,
    },
}
