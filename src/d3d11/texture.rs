// Staging surface: GPU → CPU readback target for BGRA8 frames

use anyhow::{bail, Context, Result};
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::image::BgraRows;

/// CPU-readable BGRA8 texture, allocated once at a fixed size.
pub struct StagingSurface {
    texture: ID3D11Texture2D,
    width: u32,
    height: u32,
}

impl StagingSurface {
    pub fn new(device: &ID3D11Device, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("staging surface must be non-empty, got {}x{}", width, height);
        }

        let desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: 0,
        };

        let texture = unsafe {
            let mut texture = None;
            device
                .CreateTexture2D(&desc, None, Some(&mut texture))
                .context("Failed to create staging texture")?;
            texture.context("CreateTexture2D returned no texture")?
        };

        Ok(Self {
            texture,
            width,
            height,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Full-resource GPU copy of `source` into this surface.
    ///
    /// `CopyResource` silently does nothing on a size or format mismatch, so
    /// the source description is checked first.
    pub fn copy_from(
        &self,
        context: &ID3D11DeviceContext,
        source: &ID3D11Texture2D,
    ) -> Result<()> {
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe {
            source.GetDesc(&mut desc);
        }

        if desc.Width != self.width || desc.Height != self.height {
            bail!(
                "frame is {}x{}, staging surface is {}x{}",
                desc.Width,
                desc.Height,
                self.width,
                self.height
            );
        }
        if desc.Format != DXGI_FORMAT_B8G8R8A8_UNORM {
            bail!("unsupported frame format {:?}, expected B8G8R8A8_UNORM", desc.Format);
        }

        unsafe {
            context.CopyResource(&self.texture, source);
        }
        Ok(())
    }

    /// Map for CPU reads. The returned guard unmaps on drop.
    pub fn map<'a>(&'a self, context: &'a ID3D11DeviceContext) -> Result<MappedSurface<'a>> {
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            context
                .Map(&self.texture, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                .context("Failed to map staging texture")?;
        }

        if mapped.pData.is_null() {
            // Still mapped from the driver's point of view.
            unsafe { context.Unmap(&self.texture, 0) };
            bail!("Map returned a null pointer");
        }

        Ok(MappedSurface {
            surface: self,
            context,
            mapped,
        })
    }
}

/// Live CPU mapping of a [`StagingSurface`].
pub struct MappedSurface<'a> {
    surface: &'a StagingSurface,
    context: &'a ID3D11DeviceContext,
    mapped: D3D11_MAPPED_SUBRESOURCE,
}

impl MappedSurface<'_> {
    /// Pixel rows as laid out by the driver (row pitch may include padding).
    pub fn rows(&self) -> BgraRows<'_> {
        let row_pitch = self.mapped.RowPitch as usize;
        let len = row_pitch * self.surface.height as usize;
        // SAFETY: Map succeeded with D3D11_MAP_READ; pData stays valid for
        // RowPitch * Height bytes until Unmap, which only runs in Drop after
        // every borrow of self has ended.
        let data = unsafe { std::slice::from_raw_parts(self.mapped.pData as *const u8, len) };
        BgraRows {
            data,
            width: self.surface.width,
            height: self.surface.height,
            row_pitch,
        }
    }
}

impl Drop for MappedSurface<'_> {
    fn drop(&mut self) {
        // SAFETY: subresource 0 was mapped in StagingSurface::map and is unmapped exactly once
        unsafe {
            self.context.Unmap(&self.surface.texture, 0);
        }
    }
}
