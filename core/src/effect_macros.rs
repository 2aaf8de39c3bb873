//! Declarative macros for ergonomic effect construction
//!
//! Reducers build the same two effect shapes over and over: "run this async
//! block and maybe feed an action back" and "dispatch this action later".

/// Create an `Effect::Future` from an async block
///
/// The block must evaluate to `Option<Action>`.
///
/// # Example
///
/// ```rust,ignore
/// use admission_core::async_effect;
///
/// async_effect! {
///     decoder.pause();
///     None
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use admission_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_millis(3000),
///     action: ScannerAction::CooldownElapsed { attempt }
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}
