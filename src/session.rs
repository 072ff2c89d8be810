// Capture session: Init → CaptureAndEncode* → Shutdown
//
// One mutex guards the source, the encoder and the output buffer. Every
// capture runs acquire → encode → release under it, and the release happens
// whether or not the encode succeeded.

use std::fmt;
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::capture::{Acquired, FrameLease, FrameSource, OutputDescriptor};
use crate::encoder::FrameEncoder;
use crate::error::{CaptureError, InitError, Result};

/// Default acquire timeout: short enough to keep a polling caller responsive
/// on an idle desktop.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(100);

/// Session tuning, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long `capture_and_encode` waits for a new frame
    pub acquire_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

/// Source and encoder of an initialized session.
///
/// Field order is drop order: the encoder is torn down before the source.
struct Pipeline<B: Backend> {
    encoder: B::Encoder,
    source: B::Source,
}

struct SessionState<B: Backend> {
    pipeline: Option<Pipeline<B>>,
    /// Most recent encoded image, reused across captures
    buffer: Vec<u8>,
}

/// Explicit capture session owning its collaborators and lock.
///
/// # Examples
/// ```
/// use stillcapture::backend::SyntheticBackend;
/// use stillcapture::capture::FillPattern;
/// use stillcapture::session::CaptureSession;
///
/// let session = CaptureSession::new(SyntheticBackend::single(
///     2,
///     2,
///     FillPattern::Solid([0, 0, 255, 255]),
/// ));
/// session.init(0).unwrap();
///
/// let frame = session.capture_and_encode(80).unwrap().expect("first frame");
/// assert!(!frame.is_empty());
/// ```
pub struct CaptureSession<B: Backend> {
    backend: B,
    config: SessionConfig,
    state: Mutex<SessionState<B>>,
}

impl<B: Backend> CaptureSession<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, SessionConfig::default())
    }

    pub fn with_config(backend: B, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            state: Mutex::new(SessionState {
                pipeline: None,
                buffer: Vec::new(),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Create the capture source and then the encoder.
    ///
    /// A negative or out-of-range `monitor_index` binds the primary output.
    /// A session that was already initialized is torn down first.
    pub fn init(&self, monitor_index: i32) -> std::result::Result<OutputDescriptor, InitError> {
        let mut state = self.lock();
        Self::teardown(&mut state);

        let requested = u32::try_from(monitor_index).unwrap_or_else(|_| {
            warn!(requested = monitor_index, "negative monitor index, using primary");
            0
        });
        let source = self
            .backend
            .open_source(requested)
            .map_err(InitError::Source)?;
        let encoder = self
            .backend
            .open_encoder(&source)
            .map_err(InitError::Encoder)?;

        let output = source.output();
        info!(
            requested = monitor_index,
            index = output.index,
            width = output.width,
            height = output.height,
            "capture session initialized"
        );

        state.pipeline = Some(Pipeline { encoder, source });
        Ok(output)
    }

    /// Acquire one frame, encode it at `quality` (0–100) and release it.
    ///
    /// Returns `Ok(None)` when no new frame arrived within the acquire
    /// timeout. The session lock is released before returning, so the
    /// [`EncodedFrame`] may be kept across later calls on the same thread.
    pub fn capture_and_encode(&self, quality: i32) -> Result<Option<EncodedFrame>> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let pipeline = state
            .pipeline
            .as_mut()
            .ok_or(CaptureError::NotInitialized)?;

        let started = Instant::now();
        let frame = match pipeline.source.acquire_frame(self.config.acquire_timeout) {
            Ok(Acquired::Frame(frame)) => frame,
            Ok(Acquired::TimedOut) => {
                debug!("no new frame within acquire timeout");
                return Ok(None);
            }
            Err(err) => {
                warn!(error = %err, "frame acquisition failed");
                return Err(err);
            }
        };
        let acquired_at = Instant::now();

        let encoded = {
            let lease = FrameLease::new(&mut pipeline.source, frame);
            pipeline
                .encoder
                .encode(lease.frame(), quality, &mut state.buffer)
        };

        if let Err(err) = encoded {
            state.buffer.clear();
            warn!(error = %err, quality, "frame encoding failed");
            return Err(err);
        }

        debug!(
            bytes = state.buffer.len(),
            quality,
            acquire_ms = (acquired_at - started).as_secs_f64() * 1000.0,
            encode_ms = acquired_at.elapsed().as_secs_f64() * 1000.0,
            "frame captured"
        );
        Ok(Some(EncodedFrame {
            bytes: state.buffer.as_slice().into(),
        }))
    }

    /// Tear down the encoder and then the source. No-op when uninitialized.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if state.pipeline.is_some() {
            info!("capture session shut down");
        }
        Self::teardown(&mut state);
        state.buffer = Vec::new();
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().pipeline.is_some()
    }

    /// Output bound by the last successful `init`.
    pub fn output(&self) -> Option<OutputDescriptor> {
        self.lock()
            .pipeline
            .as_ref()
            .map(|pipeline| pipeline.source.output())
    }

    fn teardown(state: &mut SessionState<B>) {
        if let Some(Pipeline { encoder, source }) = state.pipeline.take() {
            drop(encoder);
            drop(source);
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState<B>> {
        // A panic mid-capture leaves no half-held frame: the lease released it while unwinding.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Encoded image of one successful capture, copied out of the session buffer.
pub struct EncodedFrame {
    bytes: Box<[u8]>,
}

impl EncodedFrame {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.into_vec()
    }
}

impl Deref for EncodedFrame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes()
    }
}

impl fmt::Debug for EncodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedFrame")
            .field("len", &self.bytes.len())
            .finish()
    }
}
