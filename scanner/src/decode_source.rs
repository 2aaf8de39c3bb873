//! Decode source: camera frames in, decoded payload strings out.
//!
//! The camera is held by a [`CameraLease`] for the lifetime of the sampling
//! task and released when the task ends, however it ends. Decoded payloads are
//! delivered through a channel of capacity one, and the source pauses itself
//! after each delivery until the state machine resumes it.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default sampling rate of the decode loop
pub const DEFAULT_MAX_SCANS_PER_SECOND: u32 = 25;

/// Errors raised by capture devices
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeSourceError {
    /// The camera could not be started (no device, permission denied ...)
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    /// A single frame could not be read
    #[error("Frame capture failed: {0}")]
    Capture(String),
}

/// One captured image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Raw pixel data, device specific
    pub data: Vec<u8>,
}

impl Frame {
    /// A frame whose payload is already text, as delivered by keyboard-wedge
    /// readers that decode in hardware.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self {
            width: 0,
            height: 0,
            data: text.as_bytes().to_vec(),
        }
    }
}

/// Boxed future returned by [`CaptureDevice::grab`]
pub type GrabFuture<'a> = BoxFuture<'a, Option<Result<Frame, DecodeSourceError>>>;

/// A video capture device
pub trait CaptureDevice: Send + 'static {
    /// Acquire and start the device
    ///
    /// # Errors
    ///
    /// Returns [`DecodeSourceError::CameraUnavailable`] if it cannot be started.
    fn start(&mut self) -> Result<(), DecodeSourceError>;

    /// Wait for the next frame. `None` means the device has closed.
    ///
    /// Must be cancel safe: the sampling loop races it against resume while
    /// paused and a frame is lost only if the future completed.
    fn grab(&mut self) -> GrabFuture<'_>;

    /// Release the device. Called exactly once per [`CameraLease`].
    fn release(&mut self);
}

/// Finds a machine-readable payload in a frame
pub trait FrameDecoder: Send + Sync + 'static {
    /// The decoded payload, or `None` if the frame holds none
    fn decode(&self, frame: &Frame) -> Option<String>;
}

/// Decoder for frames that already carry text
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughDecoder;

impl FrameDecoder for PassThroughDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        let text = std::str::from_utf8(&frame.data).ok()?.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Pause/resume control over a running decode source
pub trait DecoderControl: Send + Sync {
    /// Stop producing payloads
    fn pause(&self);
    /// Produce payloads again
    fn resume(&self);
}

/// Shared pause flag between the state machine and the sampling task.
///
/// Created before the source is activated so the environment can hold it
/// even when the camera never starts.
#[derive(Debug, Clone)]
pub struct DecoderSwitch {
    paused: Arc<watch::Sender<bool>>,
}

impl Default for DecoderSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderSwitch {
    /// A switch in the running position
    #[must_use]
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused: Arc::new(paused),
        }
    }

    /// Whether the source is currently paused
    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }
}

impl DecoderControl for DecoderSwitch {
    fn pause(&self) {
        self.paused.send_replace(true);
    }

    fn resume(&self) {
        self.paused.send_replace(false);
    }
}

/// Exclusive hold on a capture device; releases it on drop.
pub struct CameraLease {
    device: Box<dyn CaptureDevice>,
}

impl CameraLease {
    /// Start the device and take the lease
    ///
    /// # Errors
    ///
    /// Returns the device's start error. The device is released before
    /// returning.
    pub fn acquire(mut device: Box<dyn CaptureDevice>) -> Result<Self, DecodeSourceError> {
        if let Err(error) = device.start() {
            device.release();
            return Err(error);
        }
        tracing::debug!("Camera lease acquired");
        Ok(Self { device })
    }

    fn device_mut(&mut self) -> &mut dyn CaptureDevice {
        self.device.as_mut()
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.device.release();
        tracing::debug!("Camera lease released");
    }
}

impl std::fmt::Debug for CameraLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraLease").finish_non_exhaustive()
    }
}

/// Sampling options
#[derive(Debug, Clone, Copy)]
pub struct DecodeSourceOptions {
    /// Upper bound on frames grabbed per second
    pub max_scans_per_second: u32,
}

impl Default for DecodeSourceOptions {
    fn default() -> Self {
        Self {
            max_scans_per_second: DEFAULT_MAX_SCANS_PER_SECOND,
        }
    }
}

/// A running decode loop bound to one camera
#[derive(Debug)]
pub struct DecodeSource {
    task: Option<JoinHandle<()>>,
    switch: DecoderSwitch,
}

impl DecodeSource {
    /// Start the camera and the sampling task.
    ///
    /// Returns the source and the receiving end of its payload channel.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeSourceError::CameraUnavailable`] if the device cannot
    /// be started; the device has been released by then.
    pub fn activate(
        device: Box<dyn CaptureDevice>,
        decoder: Arc<dyn FrameDecoder>,
        switch: DecoderSwitch,
        options: DecodeSourceOptions,
    ) -> Result<(Self, mpsc::Receiver<String>), DecodeSourceError> {
        let lease = CameraLease::acquire(device)?;
        let (tx, rx) = mpsc::channel(1);

        let period = Duration::from_secs(1) / options.max_scans_per_second.max(1);
        let task = tokio::spawn(sample(lease, decoder, switch.clone(), period, tx));

        tracing::info!(
            max_scans_per_second = options.max_scans_per_second,
            "Decode source started"
        );

        Ok((
            Self {
                task: Some(task),
                switch,
            },
            rx,
        ))
    }

    /// The pause/resume switch of this source
    #[must_use]
    pub fn switch(&self) -> &DecoderSwitch {
        &self.switch
    }

    /// Stop sampling and wait until the camera has been released
    pub async fn teardown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            match task.await {
                Ok(()) => {},
                Err(error) if error.is_cancelled() => {},
                Err(error) => tracing::warn!(%error, "Decode task failed"),
            }
        }
        tracing::info!("Decode source stopped");
    }
}

impl Drop for DecodeSource {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn sample(
    mut lease: CameraLease,
    decoder: Arc<dyn FrameDecoder>,
    switch: DecoderSwitch,
    period: Duration,
    tx: mpsc::Sender<String>,
) {
    let mut paused = switch.watch();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // Frames delivered while paused are drained so none are redeemed after resuming.
        while *paused.borrow_and_update() {
            tokio::select! {
                biased;
                changed = paused.changed() => {
                    if changed.is_err() {
                        return;
                    }
                },
                grabbed = lease.device_mut().grab() => {
                    if grabbed.is_none() {
                        tracing::info!("Capture device closed");
                        return;
                    }
                    tracing::trace!("Dropped frame while paused");
                },
            }
        }

        ticker.tick().await;

        let frame = match lease.device_mut().grab().await {
            Some(Ok(frame)) => frame,
            Some(Err(error)) => {
                tracing::warn!(%error, "Skipping frame");
                continue;
            },
            None => {
                tracing::info!("Capture device closed");
                return;
            },
        };

        // A frame grabbed while a pause was requested is discarded.
        if switch.is_paused() {
            continue;
        }

        let Some(payload) = decoder.decode(&frame) else {
            continue;
        };

        switch.pause();
        if tx.send(payload).await.is_err() {
            return;
        }
    }
}

/// Counters shared between a [`ChannelCaptureDevice`] and its observers
#[derive(Debug, Clone, Default)]
pub struct DeviceTracker {
    starts: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl DeviceTracker {
    /// How many times the device was started
    #[must_use]
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// How many times the device was released
    #[must_use]
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

/// Capture device fed through a channel.
///
/// Backs keyboard-wedge readers (each typed line is one frame) and tests.
#[derive(Debug)]
pub struct ChannelCaptureDevice {
    frames: mpsc::UnboundedReceiver<Frame>,
    start_error: Option<String>,
    tracker: DeviceTracker,
}

impl ChannelCaptureDevice {
    /// A working device and the sender that feeds it
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedSender<Frame>) {
        let (tx, frames) = mpsc::unbounded_channel();
        (
            Self {
                frames,
                start_error: None,
                tracker: DeviceTracker::default(),
            },
            tx,
        )
    }

    /// A device whose `start` fails with `reason`
    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        let (device, _) = Self::new();
        Self {
            start_error: Some(reason.into()),
            ..device
        }
    }

    /// Observer for start/release calls
    #[must_use]
    pub fn tracker(&self) -> DeviceTracker {
        self.tracker.clone()
    }
}

impl CaptureDevice for ChannelCaptureDevice {
    fn start(&mut self) -> Result<(), DecodeSourceError> {
        self.tracker.starts.fetch_add(1, Ordering::SeqCst);
        match &self.start_error {
            Some(reason) => Err(DecodeSourceError::CameraUnavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn grab(&mut self) -> GrabFuture<'_> {
        Box::pin(async move { self.frames.recv().await.map(Ok) })
    }

    fn release(&mut self) {
        self.tracker.releases.fetch_add(1, Ordering::SeqCst);
        self.frames.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn activate(
        device: ChannelCaptureDevice,
    ) -> Result<(DecodeSource, mpsc::Receiver<String>), DecodeSourceError> {
        DecodeSource::activate(
            Box::new(device),
            Arc::new(PassThroughDecoder),
            DecoderSwitch::new(),
            DecodeSourceOptions::default(),
        )
    }

    #[test]
    fn pass_through_decoder_ignores_blank_frames() {
        let decoder = PassThroughDecoder;
        assert_eq!(decoder.decode(&Frame::from_text("  \n")), None);
        assert_eq!(
            decoder.decode(&Frame::from_text("https://x/scan?ticketId=T1\n")),
            Some("https://x/scan?ticketId=T1".to_string())
        );
        assert_eq!(
            decoder.decode(&Frame {
                width: 1,
                height: 1,
                data: vec![0xff, 0xfe],
            }),
            None
        );
    }

    #[tokio::test]
    async fn failed_start_still_releases() {
        let device = ChannelCaptureDevice::failing("permission denied");
        let tracker = device.tracker();

        let error = activate(device).unwrap_err();

        assert_eq!(
            error,
            DecodeSourceError::CameraUnavailable("permission denied".to_string())
        );
        assert_eq!(tracker.starts(), 1);
        assert_eq!(tracker.releases(), 1);
    }

    #[tokio::test]
    async fn emits_payload_then_pauses_until_resumed() {
        let (device, frames) = ChannelCaptureDevice::new();
        let (source, mut payloads) = activate(device).unwrap();

        frames.send(Frame::from_text("")).unwrap();
        frames.send(Frame::from_text("first")).unwrap();
        assert_eq!(payloads.recv().await.unwrap(), "first");
        assert!(source.switch().is_paused());

        frames.send(Frame::from_text("second")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(payloads.try_recv().is_err());

        source.switch().resume();
        frames.send(Frame::from_text("third")).unwrap();
        // "second" arrived while paused and was dropped.
        assert_eq!(payloads.recv().await.unwrap(), "third");

        source.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn frames_seen_while_paused_are_never_emitted() {
        let (device, frames) = ChannelCaptureDevice::new();
        let (source, mut payloads) = activate(device).unwrap();

        frames.send(Frame::from_text("first")).unwrap();
        assert_eq!(payloads.recv().await.unwrap(), "first");

        for n in 0..5 {
            frames.send(Frame::from_text(&format!("stale{n}"))).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
        source.switch().resume();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(payloads.try_recv().is_err());

        frames.send(Frame::from_text("fresh")).unwrap();
        assert_eq!(payloads.recv().await.unwrap(), "fresh");

        source.teardown().await;
    }

    #[tokio::test]
    async fn paused_source_notices_a_closed_device() {
        let (device, frames) = ChannelCaptureDevice::new();
        let tracker = device.tracker();
        let (source, mut payloads) = activate(device).unwrap();

        frames.send(Frame::from_text("first")).unwrap();
        assert_eq!(payloads.recv().await.unwrap(), "first");
        assert!(source.switch().is_paused());

        drop(frames);

        assert!(payloads.recv().await.is_none());
        source.teardown().await;
        assert_eq!(tracker.releases(), 1);
    }

    #[tokio::test]
    async fn teardown_releases_exactly_once() {
        let (device, _frames) = ChannelCaptureDevice::new();
        let tracker = device.tracker();
        let (source, _payloads) = activate(device).unwrap();

        source.teardown().await;

        assert_eq!(tracker.starts(), 1);
        assert_eq!(tracker.releases(), 1);
    }

    #[tokio::test]
    async fn closed_device_ends_the_channel() {
        let (device, frames) = ChannelCaptureDevice::new();
        let tracker = device.tracker();
        let (source, mut payloads) = activate(device).unwrap();

        drop(frames);

        assert!(payloads.recv().await.is_none());
        source.teardown().await;
        assert_eq!(tracker.releases(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sampling_is_throttled() {
        let (device, frames) = ChannelCaptureDevice::new();
        let switch = DecoderSwitch::new();
        let (source, mut payloads) = DecodeSource::activate(
            Box::new(device),
            Arc::new(PassThroughDecoder),
            switch.clone(),
            DecodeSourceOptions {
                max_scans_per_second: 2,
            },
        )
        .unwrap();

        let started = tokio::time::Instant::now();
        for n in 0..3 {
            frames.send(Frame::from_text(&format!("p{n}"))).unwrap();
            assert_eq!(payloads.recv().await.unwrap(), format!("p{n}"));
            switch.resume();
        }

        // First tick is immediate, then one frame per 500ms.
        assert!(started.elapsed() >= Duration::from_millis(1000));
        source.teardown().await;
    }
}
