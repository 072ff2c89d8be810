// JPEG encoding via the `image` crate.
//
// BGRA rows are converted to packed RGB (JPEG has no alpha) in a scratch
// buffer that is kept across frames.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::{BgraRows, ChannelOrder, ImageCodec};

/// Portable JPEG codec.
#[derive(Default)]
pub struct JpegCodec {
    rgb: Vec<u8>,
}

impl JpegCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// `image` takes an integer quality in 1..=100.
    fn encoder_quality(quality: f32) -> u8 {
        (quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl ImageCodec for JpegCodec {
    fn compress(&mut self, rows: &BgraRows<'_>, quality: f32, out: &mut Vec<u8>) -> Result<()> {
        rows.validate()?;

        rows.pack_24(ChannelOrder::Rgb, &mut self.rgb);

        out.clear();
        let encoder = JpegEncoder::new_with_quality(&mut *out, Self::encoder_quality(quality));
        let written = encoder
            .write_image(&self.rgb, rows.width, rows.height, ExtendedColorType::Rgb8)
            .context("JPEG encoding failed");

        if written.is_err() {
            out.clear();
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, bgra: [u8; 4]) -> Vec<u8> {
        bgra.repeat(width as usize * height as usize)
    }

    #[test]
    fn test_encoder_quality_mapping() {
        assert_eq!(JpegCodec::encoder_quality(0.0), 1);
        assert_eq!(JpegCodec::encoder_quality(0.8), 80);
        assert_eq!(JpegCodec::encoder_quality(1.0), 100);
    }

    #[test]
    fn test_compress_produces_jpeg_of_frame_size() {
        let data = solid(5, 3, [0, 0, 255, 255]);
        let rows = BgraRows {
            data: &data,
            width: 5,
            height: 3,
            row_pitch: 20,
        };

        let mut out = Vec::new();
        JpegCodec::new().compress(&rows, 0.8, &mut out).unwrap();

        assert_eq!(&out[..2], &[0xFF, 0xD8], "JPEG SOI marker");
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (5, 3));

        // Pure red survives the BGRA → RGB swap.
        let px = decoded.to_rgb8().get_pixel(2, 1).0;
        assert!(px[0] > 200 && px[1] < 60 && px[2] < 60, "got {:?}", px);
    }

    #[test]
    fn test_compress_overwrites_previous_output() {
        let data = solid(2, 2, [10, 20, 30, 255]);
        let rows = BgraRows {
            data: &data,
            width: 2,
            height: 2,
            row_pitch: 8,
        };

        let mut out = vec![0xAA; 100_000];
        JpegCodec::new().compress(&rows, 0.5, &mut out).unwrap();
        assert!(out.len() < 100_000);
        assert_eq!(&out[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_compress_rejects_bad_layout() {
        let data = vec![0u8; 8];
        let rows = BgraRows {
            data: &data,
            width: 2,
            height: 2,
            row_pitch: 8,
        };
        let mut out = Vec::new();
        assert!(JpegCodec::new().compress(&rows, 0.5, &mut out).is_err());
        assert!(out.is_empty());
    }
}
