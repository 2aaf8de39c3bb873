//! Dependencies of the redemption reducer.

use crate::decode_source::DecoderControl;
use crate::payload::MissingNoncePolicy;
use crate::redemption::RedemptionService;
use admission_core::environment::Clock;
use std::sync::Arc;
use std::time::Duration;

/// Default time an outcome is shown before scanning resumes
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(3000);

/// Default upper bound on one redemption call
pub const DEFAULT_REDEEM_TIMEOUT: Duration = Duration::from_secs(10);

/// Timing and validation rules of the desk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Delay between a terminal outcome and the next accepted attempt
    pub cooldown: Duration,
    /// Redemption calls still pending after this fail with a timeout
    pub redeem_timeout: Duration,
    /// Handling of QR payloads without a nonce
    pub missing_nonce: MissingNoncePolicy,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            redeem_timeout: DEFAULT_REDEEM_TIMEOUT,
            missing_nonce: MissingNoncePolicy::default(),
        }
    }
}

/// Injected dependencies for [`RedemptionReducer`](super::RedemptionReducer).
///
/// Production uses `SystemClock` and the HTTP client; tests use `FixedClock`
/// and `MockRedemptionService`.
#[derive(Clone)]
pub struct ScannerEnvironment {
    clock: Arc<dyn Clock>,
    redemption: Arc<dyn RedemptionService>,
    decoder: Arc<dyn DecoderControl>,
    policy: AdmissionPolicy,
}

impl ScannerEnvironment {
    /// Create an environment
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        redemption: Arc<dyn RedemptionService>,
        decoder: Arc<dyn DecoderControl>,
        policy: AdmissionPolicy,
    ) -> Self {
        Self {
            clock,
            redemption,
            decoder,
            policy,
        }
    }

    /// Clock used for ledger timestamps
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Redemption service client
    #[must_use]
    pub fn redemption(&self) -> Arc<dyn RedemptionService> {
        Arc::clone(&self.redemption)
    }

    /// Pause/resume control of the decode source
    #[must_use]
    pub fn decoder(&self) -> Arc<dyn DecoderControl> {
        Arc::clone(&self.decoder)
    }

    /// Timing and validation rules
    #[must_use]
    pub const fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }
}

impl std::fmt::Debug for ScannerEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerEnvironment")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
