// Portable in-process display backend.
//
// A `SyntheticDisplay` is the producer side: anything holding a clone can
// present new BGRA frames. A `SyntheticSource` subscribes to it and behaves
// like a duplication handle: blocking acquire with timeout, one outstanding
// frame at a time, explicit release.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail};
use tracing::{debug, trace};

use super::{Acquired, FrameSource, OutputDescriptor};
use crate::error::{CaptureError, Result};

/// CPU-resident BGRA8 frame (alpha ignored).
#[derive(Debug, Clone)]
pub struct CpuFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, >= width * 4
    pub row_pitch: usize,
    pub pixels: Arc<[u8]>,
}

/// Content generated by [`SyntheticDisplay::present_pattern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPattern {
    /// Every pixel set to one BGRA value
    Solid([u8; 4]),
    /// Two-tone checkerboard with `cell`-pixel squares
    Checkerboard { cell: u32 },
    /// Horizontal/vertical color ramp
    Gradient,
}

impl Default for FillPattern {
    fn default() -> Self {
        Self::Checkerboard { cell: 32 }
    }
}

impl FillPattern {
    fn render(self, width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let px = match self {
                    FillPattern::Solid(bgra) => bgra,
                    FillPattern::Checkerboard { cell } => {
                        let cell = cell.max(1);
                        if ((x / cell) + (y / cell)) % 2 == 0 {
                            [160, 80, 40, 255]
                        } else {
                            [112, 56, 28, 255]
                        }
                    }
                    FillPattern::Gradient => {
                        let r = (x * 255 / width.max(1)) as u8;
                        let g = (y * 255 / height.max(1)) as u8;
                        let b = ((x ^ y) & 0xFF) as u8;
                        [b, g, r, 255]
                    }
                };
                data.extend_from_slice(&px);
            }
        }
        data
    }
}

/// Frame counters shared by a display and every source subscribed to it.
#[derive(Debug, Default)]
pub struct FrameCounters {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl FrameCounters {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

struct DisplayState {
    latest: Option<CpuFrame>,
    /// Incremented on every present; 0 means nothing presented yet
    generation: u64,
    disconnected: bool,
}

struct Shared {
    width: u32,
    height: u32,
    state: Mutex<DisplayState>,
    arrived: Condvar,
    counters: FrameCounters,
}

/// Producer handle for an in-process display output.
#[derive(Clone)]
pub struct SyntheticDisplay {
    shared: Arc<Shared>,
}

impl SyntheticDisplay {
    /// Create a display and present an initial frame filled with `pattern`.
    pub fn new(width: u32, height: u32, pattern: FillPattern) -> Self {
        let display = Self::blank(width, height);
        display.present_pattern(pattern);
        display
    }

    /// Create a display that has not presented anything yet.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            shared: Arc::new(Shared {
                width,
                height,
                state: Mutex::new(DisplayState {
                    latest: None,
                    generation: 0,
                    disconnected: false,
                }),
                arrived: Condvar::new(),
                counters: FrameCounters::default(),
            }),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.shared.width, self.shared.height)
    }

    /// Present a tightly packed BGRA8 frame matching the display size.
    pub fn present(&self, pixels: Vec<u8>) -> anyhow::Result<()> {
        let (width, height) = self.size();
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            bail!(
                "frame size mismatch: expected {} bytes ({}x{}x4), got {}",
                expected,
                width,
                height,
                pixels.len()
            );
        }

        let frame = CpuFrame {
            width,
            height,
            row_pitch: width as usize * 4,
            pixels: pixels.into(),
        };

        let mut state = lock(&self.shared.state);
        state.latest = Some(frame);
        state.generation += 1;
        drop(state);
        self.shared.arrived.notify_all();
        Ok(())
    }

    pub fn present_pattern(&self, pattern: FillPattern) {
        let (width, height) = self.size();
        // Size always matches: render() produces exactly width * height pixels.
        let _ = self.present(pattern.render(width, height));
    }

    /// Break every subscription, as if the desktop switched or access was lost.
    pub fn disconnect(&self) {
        lock(&self.shared.state).disconnected = true;
        self.shared.arrived.notify_all();
    }

    pub fn counters(&self) -> &FrameCounters {
        &self.shared.counters
    }

    /// Subscribe to this display. `index` is recorded in the descriptor.
    pub fn subscribe(&self, index: u32) -> SyntheticSource {
        // A fresh subscription sees the current image as its first frame.
        SyntheticSource {
            display: self.clone(),
            index,
            last_seen: 0,
            outstanding: false,
        }
    }
}

/// Duplication-style subscription to a [`SyntheticDisplay`].
pub struct SyntheticSource {
    display: SyntheticDisplay,
    index: u32,
    last_seen: u64,
    outstanding: bool,
}

impl FrameSource for SyntheticSource {
    type Frame = CpuFrame;

    fn output(&self) -> OutputDescriptor {
        let (width, height) = self.display.size();
        OutputDescriptor {
            index: self.index,
            width,
            height,
        }
    }

    fn acquire_frame(&mut self, timeout: Duration) -> Result<Acquired<CpuFrame>> {
        if self.outstanding {
            // Mirror the platform: a second acquire is an invalid call. Drop the
            // stale frame so the subscription is not left blocked.
            self.release_frame();
            return Err(CaptureError::Capture(anyhow!(
                "acquire called while a frame is still outstanding"
            )));
        }

        let shared = &self.display.shared;
        // None: the timeout is too large to represent, wait without a deadline.
        let deadline = Instant::now().checked_add(timeout);
        let mut state = lock(&shared.state);

        loop {
            if state.disconnected {
                return Err(CaptureError::Capture(anyhow!(
                    "synthetic display {} disconnected",
                    self.index
                )));
            }

            if state.generation != self.last_seen {
                if let Some(frame) = state.latest.clone() {
                    self.last_seen = state.generation;
                    self.outstanding = true;
                    shared.counters.acquired.fetch_add(1, Ordering::SeqCst);
                    trace!(generation = self.last_seen, "synthetic frame acquired");
                    return Ok(Acquired::Frame(frame));
                }
            }

            state = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(Acquired::TimedOut);
                    }
                    shared
                        .arrived
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => shared
                    .arrived
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn release_frame(&mut self) {
        if self.outstanding {
            self.outstanding = false;
            self.display
                .shared
                .counters
                .released
                .fetch_add(1, Ordering::SeqCst);
        }
    }

    fn has_outstanding_frame(&self) -> bool {
        self.outstanding
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        if self.outstanding {
            debug!(index = self.index, "releasing outstanding frame on teardown");
        }
        self.release_frame();
    }
}

fn lock(state: &Mutex<DisplayState>) -> MutexGuard<'_, DisplayState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn test_first_acquire_returns_current_image() {
        let display = SyntheticDisplay::new(4, 3, FillPattern::Solid([1, 2, 3, 255]));
        let mut source = display.subscribe(0);

        match source.acquire_frame(SHORT).unwrap() {
            Acquired::Frame(frame) => {
                assert_eq!((frame.width, frame.height), (4, 3));
                assert_eq!(frame.row_pitch, 16);
                assert_eq!(&frame.pixels[..4], &[1, 2, 3, 255]);
            }
            Acquired::TimedOut => panic!("expected the initial frame"),
        }
        assert!(source.has_outstanding_frame());
        source.release_frame();
        assert!(!source.has_outstanding_frame());
    }

    #[test]
    fn test_no_new_frame_times_out_without_outstanding() {
        let display = SyntheticDisplay::new(2, 2, FillPattern::Gradient);
        let mut source = display.subscribe(0);

        assert!(!source.acquire_frame(SHORT).unwrap().is_timed_out());
        source.release_frame();

        assert!(source.acquire_frame(SHORT).unwrap().is_timed_out());
        assert!(!source.has_outstanding_frame());

        // Release with nothing outstanding is a no-op.
        source.release_frame();
        assert_eq!(display.counters().acquired(), 1);
        assert_eq!(display.counters().released(), 1);
    }

    #[test]
    fn test_second_acquire_without_release_fails() {
        let display = SyntheticDisplay::new(2, 2, FillPattern::Gradient);
        let mut source = display.subscribe(0);

        assert!(!source.acquire_frame(SHORT).unwrap().is_timed_out());
        display.present_pattern(FillPattern::Solid([0, 0, 0, 255]));

        let err = source.acquire_frame(SHORT).unwrap_err();
        assert!(matches!(err, CaptureError::Capture(_)));
        // The stale frame was released defensively.
        assert!(!source.has_outstanding_frame());
        assert_eq!(display.counters().released(), 1);
    }

    #[test]
    fn test_acquire_wakes_on_present() {
        let display = SyntheticDisplay::blank(2, 2);
        let mut source = display.subscribe(0);
        let producer = display.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            producer.present_pattern(FillPattern::Solid([9, 9, 9, 255]));
        });

        let acquired = source.acquire_frame(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
        assert!(matches!(acquired, Acquired::Frame(_)));
    }

    #[test]
    fn test_unrepresentable_timeout_waits_without_deadline() {
        let display = SyntheticDisplay::new(2, 2, FillPattern::Gradient);
        let mut source = display.subscribe(0);

        let first = source.acquire_frame(Duration::MAX).unwrap();
        assert!(matches!(first, Acquired::Frame(_)));
        source.release_frame();

        // Disconnect wakes the unbounded wait.
        let producer = display.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            producer.disconnect();
        });
        let err = source.acquire_frame(Duration::MAX).unwrap_err();
        handle.join().unwrap();
        assert_eq!(err.status_code(), -2);
    }

    #[test]
    fn test_disconnect_reports_capture_failure() {
        let display = SyntheticDisplay::new(2, 2, FillPattern::Gradient);
        let mut source = display.subscribe(0);
        display.disconnect();

        let err = source.acquire_frame(SHORT).unwrap_err();
        assert_eq!(err.status_code(), -2);
    }

    #[test]
    fn test_present_rejects_wrong_size() {
        let display = SyntheticDisplay::blank(2, 2);
        assert!(display.present(vec![0; 15]).is_err());
        assert!(display.present(vec![0; 16]).is_ok());
    }

    #[test]
    fn test_drop_releases_outstanding_frame() {
        let display = SyntheticDisplay::new(2, 2, FillPattern::Gradient);
        {
            let mut source = display.subscribe(0);
            let _ = source.acquire_frame(SHORT).unwrap();
        }
        assert_eq!(display.counters().acquired(), 1);
        assert_eq!(display.counters().released(), 1);
    }
}
