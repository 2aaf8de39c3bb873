//! Ticket admission state machine.
//!
//! # Transitions
//!
//! ```text
//! Idle ──CameraReady──▶ Scanning ──payload / manual id──▶ Validating
//!  │                      ▲   │                              │
//!  │ CameraFailed         │   └─invalid QR──┐                │ RedemptionCompleted
//!  ▼                      │                 ▼                ▼
//! Unavailable             └─CooldownElapsed─ Failed / Success ◀
//! ```
//!
//! Any attempt arriving outside `Scanning` is dropped. The decode source is
//! paused on entering `Validating` (or `Failed` for an invalid code) and only
//! resumed when the cool-down returns the desk to `Scanning`.

pub mod actions;
pub mod environment;
pub mod reducer;
pub mod state;

pub use actions::ScannerAction;
pub use environment::{AdmissionPolicy, ScannerEnvironment};
pub use reducer::RedemptionReducer;
pub use state::{ScannerState, ScannerView};
