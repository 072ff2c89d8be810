// Image compression of mapped BGRA8 rows.
//
// Two JPEG codecs, selected when the backend is configured:
// - `basic`: `image` crate encoder, portable
// - `wic`: Windows Imaging Component, Windows only

pub mod basic;
#[cfg(windows)]
pub mod wic;

use anyhow::{bail, Result};

pub use basic::JpegCodec;
#[cfg(windows)]
pub use wic::WicJpegCodec;

/// Borrowed BGRA8 pixel rows. Alpha is ignored by every codec.
#[derive(Debug, Clone, Copy)]
pub struct BgraRows<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Bytes from one row start to the next (may include padding)
    pub row_pitch: usize,
}

impl<'a> BgraRows<'a> {
    /// Check the row layout covers `width × height` pixels.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("empty frame: {}x{}", self.width, self.height);
        }
        let row_bytes = self.width as usize * 4;
        if self.row_pitch < row_bytes {
            bail!(
                "row pitch {} shorter than row ({} bytes)",
                self.row_pitch,
                row_bytes
            );
        }
        let needed = self.row_pitch * (self.height as usize - 1) + row_bytes;
        if self.data.len() < needed {
            bail!(
                "pixel data too short: expected at least {} bytes for {}x{} (pitch {}), got {}",
                needed,
                self.width,
                self.height,
                self.row_pitch,
                self.data.len()
            );
        }
        Ok(())
    }

    /// Drop alpha and row padding, writing tightly packed 3-byte pixels into `out`.
    pub fn pack_24(&self, order: ChannelOrder, out: &mut Vec<u8>) {
        out.clear();
        out.reserve(self.width as usize * self.height as usize * 3);
        for row in self.rows() {
            for px in row.chunks_exact(4) {
                match order {
                    ChannelOrder::Rgb => out.extend_from_slice(&[px[2], px[1], px[0]]),
                    ChannelOrder::Bgr => out.extend_from_slice(&px[..3]),
                }
            }
        }
    }

    /// Visible bytes of each row, padding excluded.
    pub fn rows(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        let row_bytes = self.width as usize * 4;
        (0..self.height as usize).map(move |y| {
            let start = y * self.row_pitch;
            &self.data[start..start + row_bytes]
        })
    }
}

/// Byte order of packed 24-bit pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    /// `image` crate input
    Rgb,
    /// WIC 24bppBGR input
    Bgr,
}

/// Map the caller's 0–100 quality to the codec's 0.0–1.0 control.
///
/// Out-of-range values are clamped.
pub fn quality_fraction(quality: i32) -> f32 {
    quality.clamp(0, 100) as f32 / 100.0
}

/// Compresses one full frame into a still-image byte stream.
pub trait ImageCodec {
    /// Replace the contents of `out` with the compressed image.
    ///
    /// On error `out` must not be handed to the caller.
    fn compress(&mut self, rows: &BgraRows<'_>, quality: f32, out: &mut Vec<u8>) -> Result<()>;
}

/// Codec choice made when the backend is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecKind {
    /// WIC JPEG on Windows, `image` crate JPEG elsewhere
    #[default]
    Platform,
    /// `image` crate JPEG
    Jpeg,
    /// WIC JPEG (Windows only)
    Wic,
}

impl CodecKind {
    /// Parse from a codec name ("platform", "jpeg", "wic").
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "platform" => Some(Self::Platform),
            "jpeg" => Some(Self::Jpeg),
            "wic" => Some(Self::Wic),
            _ => None,
        }
    }
}

/// Configured codec instance.
pub enum Codec {
    Jpeg(JpegCodec),
    #[cfg(windows)]
    Wic(WicJpegCodec),
}

impl Codec {
    /// Create the codec. Fails when the codec factory is unavailable.
    pub fn new(kind: CodecKind) -> Result<Self> {
        match kind {
            CodecKind::Jpeg => Ok(Self::Jpeg(JpegCodec::new())),
            #[cfg(windows)]
            CodecKind::Platform | CodecKind::Wic => Ok(Self::Wic(WicJpegCodec::new()?)),
            #[cfg(not(windows))]
            CodecKind::Platform => Ok(Self::Jpeg(JpegCodec::new())),
            #[cfg(not(windows))]
            CodecKind::Wic => bail!("WIC codec is only available on Windows"),
        }
    }
}

impl ImageCodec for Codec {
    fn compress(&mut self, rows: &BgraRows<'_>, quality: f32, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Codec::Jpeg(codec) => codec.compress(rows, quality, out),
            #[cfg(windows)]
            Codec::Wic(codec) => codec.compress(rows, quality, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_fraction_is_linear_and_clamped() {
        assert_eq!(quality_fraction(0), 0.0);
        assert_eq!(quality_fraction(50), 0.5);
        assert_eq!(quality_fraction(100), 1.0);
        assert_eq!(quality_fraction(-20), 0.0);
        assert_eq!(quality_fraction(250), 1.0);
    }

    #[test]
    fn test_rows_skip_padding() {
        // 2x2 frame with 4 bytes of padding per row
        let data: Vec<u8> = (0..24).collect();
        let rows = BgraRows {
            data: &data,
            width: 2,
            height: 2,
            row_pitch: 12,
        };
        rows.validate().unwrap();
        let collected: Vec<&[u8]> = rows.rows().collect();
        assert_eq!(collected[0], &data[0..8]);
        assert_eq!(collected[1], &data[12..20]);
    }

    #[test]
    fn test_pack_24_strips_alpha_and_padding() {
        // 2x2 frame, 4 bytes of padding per row
        let data: Vec<u8> = vec![
            1, 2, 3, 255, 4, 5, 6, 255, 0xEE, 0xEE, 0xEE, 0xEE, //
            7, 8, 9, 255, 10, 11, 12, 255, 0xEE, 0xEE, 0xEE, 0xEE,
        ];
        let rows = BgraRows {
            data: &data,
            width: 2,
            height: 2,
            row_pitch: 12,
        };

        let mut bgr = vec![0xAA; 40];
        rows.pack_24(ChannelOrder::Bgr, &mut bgr);
        assert_eq!(bgr, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);

        let mut rgb = Vec::new();
        rows.pack_24(ChannelOrder::Rgb, &mut rgb);
        assert_eq!(rgb, vec![3, 2, 1, 6, 5, 4, 9, 8, 7, 12, 11, 10]);
    }

    #[test]
    fn test_validate_rejects_short_data() {
        let data = vec![0u8; 15];
        let rows = BgraRows {
            data: &data,
            width: 2,
            height: 2,
            row_pitch: 8,
        };
        assert!(rows.validate().is_err());

        let narrow = BgraRows {
            data: &data,
            width: 2,
            height: 1,
            row_pitch: 4,
        };
        assert!(narrow.validate().is_err());
    }

    #[test]
    fn test_codec_kind_from_name() {
        assert_eq!(CodecKind::from_name("jpeg"), Some(CodecKind::Jpeg));
        assert_eq!(CodecKind::from_name("wic"), Some(CodecKind::Wic));
        assert_eq!(CodecKind::from_name("platform"), Some(CodecKind::Platform));
        assert_eq!(CodecKind::from_name("png"), None);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_wic_unavailable_off_windows() {
        assert!(Codec::new(CodecKind::Wic).is_err());
        assert!(matches!(Codec::new(CodecKind::Platform), Ok(Codec::Jpeg(_))));
    }
}
