//! The scanner session: one camera, one store, one ledger.
//!
//! The session owns the decode source and the store running the redemption
//! reducer, and forwards decoded payloads into the store. UIs read from it
//! through [`ScannerSession::snapshot`] and [`ScannerSession::subscribe`].

use crate::admission::{
    AdmissionPolicy, RedemptionReducer, ScannerAction, ScannerEnvironment, ScannerState,
    ScannerView,
};
use crate::config::{Config, DEFAULT_EVENT_NAME};
use crate::decode_source::{
    CaptureDevice, DecodeSource, DecodeSourceOptions, DecoderSwitch, FrameDecoder,
};
use crate::ledger::{DEFAULT_LEDGER_CAPACITY, RECENT_SCANS_SHOWN, ScanStats};
use crate::redemption::RedemptionService;
use crate::types::{RedemptionStatus, ScanRecord};
use admission_core::environment::{Clock, SystemClock};
use admission_runtime::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Store type driving a session
pub type ScannerStore = Store<ScannerState, ScannerAction, ScannerEnvironment, RedemptionReducer>;

/// Everything a session needs besides its devices
#[derive(Clone)]
pub struct SessionSettings {
    /// Event being admitted
    pub event_name: String,
    /// History length
    pub ledger_capacity: usize,
    /// Timing and validation rules
    pub policy: AdmissionPolicy,
    /// Decode loop sampling
    pub decode: DecodeSourceOptions,
    /// Clock for ledger timestamps
    pub clock: Arc<dyn Clock>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            event_name: DEFAULT_EVENT_NAME.to_string(),
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            policy: AdmissionPolicy::default(),
            decode: DecodeSourceOptions::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            event_name: config.admission.event_name.clone(),
            ledger_capacity: config.admission.ledger_capacity,
            policy: config.policy(),
            decode: config.decode_options(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("event_name", &self.event_name)
            .field("ledger_capacity", &self.ledger_capacity)
            .field("policy", &self.policy)
            .field("decode", &self.decode)
            .finish_non_exhaustive()
    }
}

/// An active admission desk
pub struct ScannerSession {
    store: ScannerStore,
    source: Option<DecodeSource>,
    pump: Option<JoinHandle<()>>,
}

impl ScannerSession {
    /// Start the camera and the state machine.
    ///
    /// A camera that fails to start does not fail the session: it ends up in
    /// [`RedemptionStatus::Unavailable`] and rejects every attempt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the initial action cannot be dispatched.
    pub async fn start(
        device: Box<dyn CaptureDevice>,
        decoder: Arc<dyn FrameDecoder>,
        service: Arc<dyn RedemptionService>,
        settings: SessionSettings,
    ) -> Result<Self, StoreError> {
        let switch = DecoderSwitch::new();
        let environment = ScannerEnvironment::new(
            Arc::clone(&settings.clock),
            service,
            Arc::new(switch.clone()),
            settings.policy,
        );
        let store = Store::new(
            ScannerState::new(settings.event_name, settings.ledger_capacity),
            RedemptionReducer::new(),
            environment,
        );

        match DecodeSource::activate(device, decoder, switch, settings.decode) {
            Ok((source, payloads)) => {
                store.send(ScannerAction::CameraReady).await?;
                let pump = tokio::spawn(pump_payloads(store.clone(), payloads));
                Ok(Self {
                    store,
                    source: Some(source),
                    pump: Some(pump),
                })
            },
            Err(error) => {
                store
                    .send(ScannerAction::CameraFailed {
                        reason: error.to_string(),
                    })
                    .await?;
                Ok(Self {
                    store,
                    source: None,
                    pump: None,
                })
            },
        }
    }

    /// Submit a ticket id typed by staff
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after teardown started.
    pub async fn submit_manual(&self, input: impl Into<String>) -> Result<(), StoreError> {
        self.store
            .send(ScannerAction::ManualSubmitted {
                input: input.into(),
            })
            .await
            .map(|_| ())
    }

    /// Current phase
    pub async fn status(&self) -> RedemptionStatus {
        self.store.state(|s| s.status).await
    }

    /// Status, message, recent history and stats in one consistent read
    pub async fn snapshot(&self) -> ScannerView {
        self.store.state(|s| s.view(RECENT_SCANS_SHOWN)).await
    }

    /// The full ledger, most recent first
    pub async fn history(&self) -> Vec<ScanRecord> {
        self.store.state(|s| s.ledger.iter().cloned().collect()).await
    }

    /// Counts over the full ledger
    pub async fn stats(&self) -> ScanStats {
        self.store.state(|s| s.ledger.stats()).await
    }

    /// Actions produced by the session's own effects (results, cool-downs).
    ///
    /// Each is delivered after it has been applied, so reading the snapshot on
    /// receipt shows its result.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ScannerAction> {
        self.store.subscribe_actions()
    }

    /// The store behind this session
    #[must_use]
    pub const fn store(&self) -> &ScannerStore {
        &self.store
    }

    /// Stop forwarding payloads, release the camera and stop the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects (a pending call or
    /// cool-down) are still running after `timeout`.
    pub async fn teardown(mut self, timeout: Duration) -> Result<(), StoreError> {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(source) = self.source.take() {
            source.teardown().await;
        }
        self.store.shutdown(timeout).await
    }
}

impl Drop for ScannerSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for ScannerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerSession")
            .field("camera", &self.source.is_some())
            .finish_non_exhaustive()
    }
}

async fn pump_payloads(store: ScannerStore, mut payloads: mpsc::Receiver<String>) {
    while let Some(payload) = payloads.recv().await {
        if let Err(error) = store.send(ScannerAction::PayloadDecoded { payload }).await {
            tracing::debug!(%error, "Payload pump stopped");
            return;
        }
    }
    tracing::debug!("Decode source closed");
}
