// Frame encoders: acquired frame → staging surface → compressed bytes.
//
// One staging copy, one CPU read and one full-frame compression per call.
// The staging surface is allocated once, sized to the output.

#[cfg(windows)]
pub mod gpu;

use anyhow::{anyhow, bail};
use tracing::trace;

use crate::capture::CpuFrame;
use crate::error::{CaptureError, Result};
use crate::image::{quality_fraction, BgraRows, Codec, CodecKind, ImageCodec};

#[cfg(windows)]
pub use gpu::GpuFrameEncoder;

/// Turns an acquired frame of type `F` into an image byte stream.
pub trait FrameEncoder<F> {
    /// Encode `frame` at `quality` (0–100) into `out`, replacing its contents.
    ///
    /// On error nothing in `out` may be treated as an image.
    fn encode(&mut self, frame: &F, quality: i32, out: &mut Vec<u8>) -> Result<()>;

    /// Staging surface size (width, height).
    fn size(&self) -> (u32, u32);
}

/// Encoder for CPU-resident frames.
///
/// The staging buffer plays the role of the GPU staging surface: a tightly
/// packed BGRA8 copy of the frame, allocated once.
pub struct CpuFrameEncoder {
    staging: Vec<u8>,
    width: u32,
    height: u32,
    codec: Codec,
}

impl CpuFrameEncoder {
    pub fn new(width: u32, height: u32, codec: CodecKind) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CaptureError::Initialization(anyhow!(
                "staging surface must be non-empty, got {}x{}",
                width,
                height
            )));
        }
        let codec = Codec::new(codec).map_err(CaptureError::Initialization)?;

        Ok(Self {
            staging: vec![0u8; width as usize * height as usize * 4],
            width,
            height,
            codec,
        })
    }

    fn copy_to_staging(&mut self, frame: &CpuFrame) -> anyhow::Result<()> {
        if frame.width != self.width || frame.height != self.height {
            bail!(
                "frame is {}x{}, staging surface is {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            );
        }

        let source = BgraRows {
            data: &frame.pixels,
            width: frame.width,
            height: frame.height,
            row_pitch: frame.row_pitch,
        };
        source.validate()?;

        let row_bytes = self.width as usize * 4;
        for (dst, src) in self.staging.chunks_exact_mut(row_bytes).zip(source.rows()) {
            dst.copy_from_slice(src);
        }
        Ok(())
    }
}

impl FrameEncoder<CpuFrame> for CpuFrameEncoder {
    fn encode(&mut self, frame: &CpuFrame, quality: i32, out: &mut Vec<u8>) -> Result<()> {
        self.copy_to_staging(frame).map_err(CaptureError::Encode)?;

        let rows = BgraRows {
            data: &self.staging,
            width: self.width,
            height: self.height,
            row_pitch: self.width as usize * 4,
        };
        self.codec
            .compress(&rows, quality_fraction(quality), out)
            .map_err(|err| {
                out.clear();
                CaptureError::Encode(err)
            })?;

        trace!(bytes = out.len(), quality, "frame encoded");
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::capture::{Acquired, FillPattern, FrameSource, SyntheticDisplay};

    fn padded_frame(width: u32, height: u32, pad: usize) -> CpuFrame {
        let row_pitch = width as usize * 4 + pad;
        let mut pixels = vec![0xEEu8; row_pitch * height as usize];
        for y in 0..height as usize {
            for x in 0..width as usize {
                let at = y * row_pitch + x * 4;
                pixels[at..at + 4].copy_from_slice(&[0, 200, 0, 255]);
            }
        }
        CpuFrame {
            width,
            height,
            row_pitch,
            pixels: pixels.into(),
        }
    }

    #[test]
    fn test_encode_strips_row_padding() {
        let mut encoder = CpuFrameEncoder::new(6, 4, CodecKind::Jpeg).unwrap();
        let mut out = Vec::new();
        encoder
            .encode(&padded_frame(6, 4, 8), 90, &mut out)
            .unwrap();

        let decoded = image::load_from_memory(&out).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (6, 4));
        let px = decoded.get_pixel(5, 3).0;
        assert!(px[1] > 150 && px[0] < 80 && px[2] < 80, "got {:?}", px);
    }

    #[test]
    fn test_encode_rejects_mismatched_frame() {
        let mut encoder = CpuFrameEncoder::new(4, 4, CodecKind::Jpeg).unwrap();
        let mut source = SyntheticDisplay::new(2, 2, FillPattern::Gradient).subscribe(0);
        let Acquired::Frame(frame) = source.acquire_frame(Duration::from_millis(10)).unwrap()
        else {
            panic!("expected the initial frame");
        };

        let mut out = vec![1, 2, 3];
        let err = encoder.encode(&frame, 80, &mut out).unwrap_err();
        assert!(matches!(err, CaptureError::Encode(_)));
    }

    #[test]
    fn test_zero_sized_surface_is_init_failure() {
        let err = CpuFrameEncoder::new(0, 10, CodecKind::Jpeg).err().unwrap();
        assert!(matches!(err, CaptureError::Initialization(_)));
    }

    #[test]
    fn test_quality_out_of_range_is_clamped() {
        let mut encoder = CpuFrameEncoder::new(8, 8, CodecKind::Jpeg).unwrap();
        let frame = padded_frame(8, 8, 0);
        let mut low = Vec::new();
        let mut high = Vec::new();
        encoder.encode(&frame, -50, &mut low).unwrap();
        encoder.encode(&frame, 500, &mut high).unwrap();
        assert!(!low.is_empty() && !high.is_empty());
    }
}
