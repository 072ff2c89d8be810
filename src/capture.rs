// Capture sources: one display output, one frame outstanding at a time.
//
// Backends:
// - `duplication` (Windows): DXGI Desktop Duplication on a D3D11 device
// - `synthetic`: portable in-process display fed by `SyntheticDisplay::present`

#[cfg(windows)]
pub mod duplication;
#[cfg(windows)]
pub mod output;
pub mod synthetic;

use std::time::Duration;

use crate::error::Result;

#[cfg(windows)]
pub use duplication::DuplicationSource;
#[cfg(windows)]
pub use output::{enable_dpi_awareness, enumerate_outputs, OutputInfo};
pub use synthetic::{CpuFrame, FillPattern, FrameCounters, SyntheticDisplay, SyntheticSource};

/// Display output resolved at initialization. Immutable for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputDescriptor {
    /// Index actually bound (0 when the requested index fell back to primary)
    pub index: u32,
    /// Width (pixels)
    pub width: u32,
    /// Height (pixels)
    pub height: u32,
}

/// Result of a single acquisition attempt.
#[derive(Debug)]
pub enum Acquired<F> {
    /// A new frame; it stays outstanding until `release_frame`.
    Frame(F),
    /// Nothing new within the timeout. No frame is outstanding.
    TimedOut,
}

impl<F> Acquired<F> {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Acquired::TimedOut)
    }
}

/// Exclusive subscription to one display output's frame stream.
///
/// At most one frame may be outstanding. Callers must pair every successful
/// `acquire_frame` with exactly one `release_frame` before acquiring again.
/// Dropping the source releases any outstanding frame and then the
/// subscription and device resources.
pub trait FrameSource {
    /// Handle to the acquired frame, borrowed by the encoder for one encode.
    type Frame;

    fn output(&self) -> OutputDescriptor;

    /// Block until a new frame is available or `timeout` elapses.
    ///
    /// A failure other than timeout means the subscription is broken and the
    /// source must be recreated. Any partially acquired frame is released
    /// before the error is returned.
    fn acquire_frame(&mut self, timeout: Duration) -> Result<Acquired<Self::Frame>>;

    /// Return the outstanding frame to the system. No-op when nothing is outstanding.
    fn release_frame(&mut self);

    fn has_outstanding_frame(&self) -> bool;
}

/// Scoped hold on an acquired frame.
///
/// Dropping the lease drops the frame handle and then releases it through
/// the source, on every exit path.
pub struct FrameLease<'a, S: FrameSource> {
    source: &'a mut S,
    frame: Option<S::Frame>,
}

impl<'a, S: FrameSource> FrameLease<'a, S> {
    pub fn new(source: &'a mut S, frame: S::Frame) -> Self {
        Self {
            source,
            frame: Some(frame),
        }
    }

    pub fn frame(&self) -> &S::Frame {
        // Only taken in Drop.
        match &self.frame {
            Some(frame) => frame,
            None => unreachable!("frame lease used after release"),
        }
    }
}

impl<S: FrameSource> Drop for FrameLease<'_, S> {
    fn drop(&mut self) {
        self.frame.take();
        self.source.release_frame();
    }
}

/// Milliseconds for platform waits, saturating at `u32::MAX`.
pub(crate) fn timeout_millis(timeout: Duration) -> u32 {
    timeout.as_millis().min(u32::MAX as u128) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_releases_on_drop() {
        let display = SyntheticDisplay::new(2, 2, FillPattern::Gradient);
        let mut source = display.subscribe(0);

        let Acquired::Frame(frame) = source.acquire_frame(Duration::from_millis(10)).unwrap()
        else {
            panic!("expected the initial frame");
        };
        {
            let lease = FrameLease::new(&mut source, frame);
            assert_eq!(lease.frame().width, 2);
        }

        assert!(!source.has_outstanding_frame());
        assert_eq!(display.counters().released(), 1);
    }

    #[test]
    fn test_timeout_millis_saturates() {
        assert_eq!(timeout_millis(Duration::from_millis(100)), 100);
        assert_eq!(timeout_millis(Duration::from_secs(u64::MAX)), u32::MAX);
        assert_eq!(timeout_millis(Duration::ZERO), 0);
    }
}
