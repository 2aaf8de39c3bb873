//! # Admission Scanner
//!
//! Ticket admission at the door: QR codes and typed ticket ids are validated
//! against a redemption service, one attempt at a time, and every outcome is
//! kept in a bounded session ledger.
//!
//! ## Modules
//!
//! - [`types`]: scan records, statuses, redemption requests
//! - [`payload`]: QR payload and manual entry parsing
//! - [`ledger`]: bounded history and statistics
//! - [`redemption`]: the redemption service contract and its HTTP adapter
//! - [`decode_source`]: camera lease and the sampling loop
//! - [`admission`]: the redemption reducer
//! - [`session`]: wiring of camera, store and service
//! - [`config`], [`metrics`]: ambient configuration and instrumentation
//!
//! ## Example
//!
//! ```ignore
//! let config = Config::from_env()?;
//! let service = HttpRedemptionClient::new(config.redemption_url()?, None, config.connect_timeout())?;
//! let session = ScannerSession::start(
//!     Box::new(camera),
//!     Arc::new(PassThroughDecoder),
//!     Arc::new(service),
//!     SessionSettings::from(&config),
//! )
//! .await?;
//!
//! session.submit_manual("T2").await?;
//! println!("{}", session.snapshot().await.message);
//! ```

pub mod admission;
pub mod config;
pub mod decode_source;
pub mod ledger;
pub mod metrics;
pub mod payload;
pub mod redemption;
pub mod session;
pub mod types;

pub use admission::{AdmissionPolicy, RedemptionReducer, ScannerAction, ScannerState, ScannerView};
pub use config::{Config, ConfigError};
pub use ledger::{ScanLedger, ScanStats};
pub use redemption::{HttpRedemptionClient, RedemptionError, RedemptionResponse, RedemptionService};
pub use session::{ScannerSession, SessionSettings};
pub use types::{RedemptionRequest, RedemptionStatus, ScanMethod, ScanRecord, ScanStatus};
