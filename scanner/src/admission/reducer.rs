//! The redemption state machine.

use super::actions::ScannerAction;
use super::environment::ScannerEnvironment;
use super::state::{
    ADMITTED_MESSAGE, CAMERA_UNAVAILABLE_MESSAGE, EMPTY_MANUAL_PROMPT, INVALID_CODE_MESSAGE,
    READY_MESSAGE, REFUSAL_FALLBACK, SCANNING_MESSAGE, SERVICE_ERROR_MESSAGE, ScannerState,
    VALIDATING_MESSAGE,
};
use crate::metrics;
use crate::payload::{INVALID_QR_MESSAGE, PayloadError, parse_manual_entry, parse_qr_payload};
use crate::redemption::{RedemptionError, RedemptionResponse};
use crate::types::{RedemptionRequest, RedemptionStatus, ScanMethod, ScanStatus};
use admission_core::{async_effect, delay, effect::Effect, reducer::Reducer};
use smallvec::{SmallVec, smallvec};
use std::time::Duration;

type Effects = SmallVec<[Effect<ScannerAction>; 4]>;

/// Reducer for the admission desk.
///
/// Accepts at most one attempt at a time: an attempt is only started while the
/// status is `Scanning`, and the check and the switch to `Validating` happen in
/// one reduction. Every terminal outcome appends exactly one ledger record and
/// schedules the cool-down back to `Scanning`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedemptionReducer;

impl RedemptionReducer {
    /// Create a new redemption reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for RedemptionReducer {
    type State = ScannerState;
    type Action = ScannerAction;
    type Environment = ScannerEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects {
        match action {
            ScannerAction::CameraReady => {
                if state.status != RedemptionStatus::Idle {
                    return smallvec![Effect::None];
                }
                state.status = RedemptionStatus::Scanning;
                state.message = SCANNING_MESSAGE.to_string();
                tracing::info!(event = %state.event_name, "Scanner ready");
                smallvec![Effect::None]
            },

            ScannerAction::CameraFailed { reason } => {
                if state.status != RedemptionStatus::Idle {
                    return smallvec![Effect::None];
                }
                state.status = RedemptionStatus::Unavailable;
                state.message = CAMERA_UNAVAILABLE_MESSAGE.to_string();
                tracing::error!(%reason, "Camera could not be started");
                smallvec![Effect::None]
            },

            ScannerAction::PayloadDecoded { payload } => {
                if !accepts_attempt(state, ScanMethod::Qr) {
                    return smallvec![Effect::None];
                }
                match parse_qr_payload(&payload, env.policy().missing_nonce) {
                    Ok(request) => begin_validation(state, request, env),
                    Err(error) => reject_payload(state, &error, env),
                }
            },

            ScannerAction::ManualSubmitted { input } => {
                if !accepts_attempt(state, ScanMethod::Manual) {
                    return smallvec![Effect::None];
                }
                match parse_manual_entry(&input) {
                    Some(request) => begin_validation(state, request, env),
                    None => {
                        state.message = EMPTY_MANUAL_PROMPT.to_string();
                        smallvec![Effect::None]
                    },
                }
            },

            ScannerAction::RedemptionCompleted {
                attempt,
                request,
                outcome,
            } => {
                if state.status != RedemptionStatus::Validating || attempt != state.attempt {
                    tracing::debug!(attempt, current = state.attempt, "Ignoring stale redemption result");
                    return smallvec![Effect::None];
                }
                complete_validation(state, &request, outcome, env)
            },

            ScannerAction::CooldownElapsed { attempt } => {
                if !state.status.is_cooling_down() || attempt != state.attempt {
                    return smallvec![Effect::None];
                }
                state.status = RedemptionStatus::Scanning;
                state.message = READY_MESSAGE.to_string();
                tracing::debug!(attempt, "Cool-down over, scanning resumed");

                let decoder = env.decoder();
                smallvec![async_effect! {
                    decoder.resume();
                    None
                }]
            },
        }
    }
}

/// The in-flight guard. Anything but `Scanning` drops the attempt.
fn accepts_attempt(state: &ScannerState, method: ScanMethod) -> bool {
    if state.status.accepts_attempts() {
        return true;
    }
    tracing::debug!(
        status = %state.status,
        method = method.as_str(),
        "Attempt dropped"
    );
    metrics::record_dropped_attempt(method);
    false
}

/// Scanning → Validating: stop the decoder and call the service
fn begin_validation(
    state: &mut ScannerState,
    request: RedemptionRequest,
    env: &ScannerEnvironment,
) -> Effects {
    state.attempt += 1;
    state.status = RedemptionStatus::Validating;
    state.message = VALIDATING_MESSAGE.to_string();

    let attempt = state.attempt;
    tracing::info!(
        attempt,
        ticket_id = %request.ticket_id,
        method = request.method.as_str(),
        "Validating ticket"
    );

    let service = env.redemption();
    let timeout = env.policy().redeem_timeout;

    smallvec![
        pause_decoder(env),
        async_effect! {
            let started = std::time::Instant::now();
            let outcome =
                match tokio::time::timeout(timeout, service.redeem(&request.ticket_id, &request.nonce))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(RedemptionError::Timeout),
                };
            metrics::record_redemption_duration(started.elapsed().as_secs_f64());

            Some(ScannerAction::RedemptionCompleted {
                attempt,
                request,
                outcome,
            })
        },
    ]
}

/// Scanning → Failed for a payload that never reaches the service
fn reject_payload(
    state: &mut ScannerState,
    error: &PayloadError,
    env: &ScannerEnvironment,
) -> Effects {
    state.attempt += 1;
    tracing::info!(attempt = state.attempt, %error, "Invalid QR code");

    let ledger_message = match error {
        PayloadError::NotAUrl | PayloadError::MissingTicketId => INVALID_QR_MESSAGE.to_string(),
        PayloadError::MissingNonce { .. } => error.to_string(),
    };
    record_outcome(
        state,
        env,
        error.ledger_ticket_id().to_string(),
        ScanStatus::Failed,
        ledger_message,
        ScanMethod::Qr,
    );
    state.message = with_cooldown(INVALID_CODE_MESSAGE, env.policy().cooldown);

    smallvec![pause_decoder(env), cooldown(state.attempt, env)]
}

/// Validating → Success | Failed
fn complete_validation(
    state: &mut ScannerState,
    request: &RedemptionRequest,
    outcome: Result<RedemptionResponse, RedemptionError>,
    env: &ScannerEnvironment,
) -> Effects {
    let cooldown_period = env.policy().cooldown;

    match outcome {
        Ok(response) if response.success => {
            tracing::info!(ticket_id = %request.ticket_id, "Ticket admitted");
            record_outcome(
                state,
                env,
                request.ticket_id.clone(),
                ScanStatus::Success,
                response.message,
                request.method,
            );
            state.message = with_cooldown(ADMITTED_MESSAGE, cooldown_period);
        },
        Ok(response) => {
            let reason = if response.message.trim().is_empty() {
                REFUSAL_FALLBACK.to_string()
            } else {
                response.message
            };
            tracing::info!(ticket_id = %request.ticket_id, %reason, "Ticket denied");
            state.message = with_cooldown(&format!("DENIED: {reason}"), cooldown_period);
            record_outcome(
                state,
                env,
                request.ticket_id.clone(),
                ScanStatus::Failed,
                reason,
                request.method,
            );
        },
        Err(error) => {
            tracing::warn!(ticket_id = %request.ticket_id, %error, "Redemption service error");
            record_outcome(
                state,
                env,
                request.ticket_id.clone(),
                ScanStatus::Failed,
                error.to_string(),
                request.method,
            );
            state.message = with_cooldown(SERVICE_ERROR_MESSAGE, cooldown_period);
        },
    }

    smallvec![cooldown(state.attempt, env)]
}

/// Append the ledger record and set the matching terminal status
fn record_outcome(
    state: &mut ScannerState,
    env: &ScannerEnvironment,
    ticket_id: String,
    status: ScanStatus,
    message: String,
    method: ScanMethod,
) {
    state.status = match status {
        ScanStatus::Success => RedemptionStatus::Success,
        ScanStatus::Failed => RedemptionStatus::Failed,
    };
    state.ledger.record(
        ticket_id,
        state.event_name.clone(),
        env.clock().now(),
        status,
        message,
        method,
    );
    metrics::record_scan(status, method);
}

fn pause_decoder(env: &ScannerEnvironment) -> Effect<ScannerAction> {
    let decoder = env.decoder();
    async_effect! {
        decoder.pause();
        None
    }
}

fn cooldown(attempt: u64, env: &ScannerEnvironment) -> Effect<ScannerAction> {
    delay! {
        duration: env.policy().cooldown,
        action: ScannerAction::CooldownElapsed { attempt }
    }
}

/// `"DENIED: x"` → `"DENIED: x (next scan in 3s)"`
fn with_cooldown(message: &str, cooldown: Duration) -> String {
    let millis = cooldown.as_millis();
    if millis % 1000 == 0 {
        format!("{message} (next scan in {}s)", millis / 1000)
    } else {
        format!("{message} (next scan in {:.1}s)", cooldown.as_secs_f64())
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn cooldown_hint_formats_whole_and_fractional_seconds() {
        assert_eq!(
            with_cooldown("DENIED: x", Duration::from_millis(3000)),
            "DENIED: x (next scan in 3s)"
        );
        assert_eq!(
            with_cooldown("DENIED: x", Duration::from_millis(1500)),
            "DENIED: x (next scan in 1.5s)"
        );
    }
}
