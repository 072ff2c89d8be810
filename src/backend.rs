// Backend selection: which FrameSource/FrameEncoder pair a session builds.
//
// - `DuplicationBackend` (Windows): DXGI Desktop Duplication + D3D11 staging
// - `SyntheticBackend`: in-process displays + CPU staging, any platform

use anyhow::anyhow;
use tracing::warn;

use crate::capture::{FillPattern, FrameSource, SyntheticDisplay, SyntheticSource};
use crate::encoder::{CpuFrameEncoder, FrameEncoder};
use crate::error::{CaptureError, Result};
use crate::image::CodecKind;

/// Factory for the two collaborators of a capture session.
///
/// The encoder is built from the already-initialized source because its
/// staging surface depends on the source's device and resolved output size.
pub trait Backend {
    type Source: FrameSource;
    type Encoder: FrameEncoder<<Self::Source as FrameSource>::Frame>;

    /// Bind to `monitor_index`, falling back to the primary output when it does not exist.
    fn open_source(&self, monitor_index: u32) -> Result<Self::Source>;

    fn open_encoder(&self, source: &Self::Source) -> Result<Self::Encoder>;
}

/// Backend over [`SyntheticDisplay`]s. Index 0 is the primary display.
#[derive(Clone)]
pub struct SyntheticBackend {
    displays: Vec<SyntheticDisplay>,
    codec: CodecKind,
}

impl SyntheticBackend {
    pub fn new(displays: Vec<SyntheticDisplay>) -> Self {
        Self {
            displays,
            codec: CodecKind::Jpeg,
        }
    }

    /// One display of the given size showing `pattern`.
    pub fn single(width: u32, height: u32, pattern: FillPattern) -> Self {
        Self::new(vec![SyntheticDisplay::new(width, height, pattern)])
    }

    pub fn with_codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    pub fn displays(&self) -> &[SyntheticDisplay] {
        &self.displays
    }
}

impl Backend for SyntheticBackend {
    type Source = SyntheticSource;
    type Encoder = CpuFrameEncoder;

    fn open_source(&self, monitor_index: u32) -> Result<SyntheticSource> {
        match self.displays.get(monitor_index as usize) {
            Some(display) => Ok(display.subscribe(monitor_index)),
            None => {
                let primary = self.displays.first().ok_or_else(|| {
                    CaptureError::Initialization(anyhow!("no synthetic display configured"))
                })?;
                warn!(
                    requested = monitor_index,
                    available = self.displays.len(),
                    "display not found, falling back to primary"
                );
                Ok(primary.subscribe(0))
            }
        }
    }

    fn open_encoder(&self, source: &SyntheticSource) -> Result<CpuFrameEncoder> {
        let output = source.output();
        CpuFrameEncoder::new(output.width, output.height, self.codec)
    }
}

#[cfg(windows)]
pub use duplication::DuplicationBackend;

#[cfg(windows)]
mod duplication {
    use super::Backend;
    use crate::capture::{DuplicationSource, FrameSource};
    use crate::encoder::GpuFrameEncoder;
    use crate::error::Result;
    use crate::image::CodecKind;

    /// DXGI Desktop Duplication with D3D11 staging readback.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct DuplicationBackend {
        pub codec: CodecKind,
    }

    impl DuplicationBackend {
        pub fn new(codec: CodecKind) -> Self {
            Self { codec }
        }
    }

    impl Backend for DuplicationBackend {
        type Source = DuplicationSource;
        type Encoder = GpuFrameEncoder;

        fn open_source(&self, monitor_index: u32) -> Result<DuplicationSource> {
            DuplicationSource::new(monitor_index)
        }

        fn open_encoder(&self, source: &DuplicationSource) -> Result<GpuFrameEncoder> {
            let output = source.output();
            GpuFrameEncoder::new(
                source.device_context(),
                output.width,
                output.height,
                self.codec,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_source_falls_back_to_primary() {
        let backend = SyntheticBackend::new(vec![
            SyntheticDisplay::new(8, 6, FillPattern::Gradient),
            SyntheticDisplay::new(4, 4, FillPattern::Gradient),
        ]);

        let second = backend.open_source(1).unwrap().output();
        assert_eq!((second.index, second.width, second.height), (1, 4, 4));

        let primary = backend.open_source(0).unwrap().output();
        for invalid in [2, 7, u32::MAX] {
            let fallback = backend.open_source(invalid).unwrap().output();
            assert_eq!(fallback, primary);
        }
    }

    #[test]
    fn test_open_source_without_displays_fails() {
        let backend = SyntheticBackend::new(Vec::new());
        let err = backend.open_source(0).err().unwrap();
        assert!(matches!(err, CaptureError::Initialization(_)));
    }

    #[test]
    fn test_encoder_sized_from_source() {
        let backend = SyntheticBackend::single(10, 7, FillPattern::Gradient);
        let source = backend.open_source(0).unwrap();
        let encoder = backend.open_encoder(&source).unwrap();
        assert_eq!(encoder.size(), (10, 7));
    }
}
