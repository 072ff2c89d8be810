// GPU frame encoder: CopyResource → Map → compress → Unmap
//
// The mapping guard unmaps on every exit path, including codec failure.

use anyhow::Context;
use tracing::trace;
use windows::Win32::Graphics::Direct3D11::{ID3D11DeviceContext, ID3D11Texture2D};

use super::FrameEncoder;
use crate::d3d11::texture::StagingSurface;
use crate::d3d11::D3D11Context;
use crate::error::{CaptureError, Result};
use crate::image::{quality_fraction, Codec, CodecKind, ImageCodec};

/// Encoder for duplication textures.
pub struct GpuFrameEncoder {
    codec: Codec,
    staging: StagingSurface,
    context: ID3D11DeviceContext,
}

impl GpuFrameEncoder {
    /// Allocate the staging surface on the source's device.
    pub fn new(d3d: &D3D11Context, width: u32, height: u32, codec: CodecKind) -> Result<Self> {
        let codec = Codec::new(codec).map_err(CaptureError::Initialization)?;
        let staging =
            StagingSurface::new(&d3d.device, width, height).map_err(CaptureError::Initialization)?;

        Ok(Self {
            codec,
            staging,
            context: d3d.context.clone(),
        })
    }

    fn encode_inner(
        &mut self,
        frame: &ID3D11Texture2D,
        quality: i32,
        out: &mut Vec<u8>,
    ) -> anyhow::Result<()> {
        self.staging
            .copy_from(&self.context, frame)
            .context("staging copy failed")?;

        let mapped = self.staging.map(&self.context)?;
        let rows = mapped.rows();
        self.codec.compress(&rows, quality_fraction(quality), out)
    }
}

impl FrameEncoder<ID3D11Texture2D> for GpuFrameEncoder {
    fn encode(&mut self, frame: &ID3D11Texture2D, quality: i32, out: &mut Vec<u8>) -> Result<()> {
        if let Err(err) = self.encode_inner(frame, quality, out) {
            out.clear();
            return Err(CaptureError::Encode(err));
        }
        trace!(bytes = out.len(), quality, "frame encoded");
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        self.staging.size()
    }
}
