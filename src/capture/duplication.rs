// DXGI Desktop Duplication capture source
//
// AcquireNextFrame hands out the desktop image as a GPU texture owned by the
// duplication. It must be given back with ReleaseFrame before the next
// acquire; the texture is only valid in between.

use std::time::Duration;

use anyhow::{anyhow, Context};
use tracing::{info, trace, warn};
use windows::core::Interface;
use windows::Win32::Graphics::Direct3D11::ID3D11Texture2D;
use windows::Win32::Graphics::Dxgi::{
    IDXGIOutput1, IDXGIOutputDuplication, IDXGIResource, DXGI_ERROR_ACCESS_LOST,
    DXGI_ERROR_WAIT_TIMEOUT, DXGI_OUTDUPL_DESC, DXGI_OUTDUPL_FRAME_INFO,
};

use super::output::{enable_dpi_awareness, find_output};
use super::{timeout_millis, Acquired, FrameSource, OutputDescriptor};
use crate::d3d11::{create_d3d11_device, D3D11Context};
use crate::error::{CaptureError, Result};

/// Desktop Duplication subscription on one adapter output.
///
/// Field order is drop order: duplication, then context, then device.
pub struct DuplicationSource {
    duplication: IDXGIOutputDuplication,
    d3d: D3D11Context,
    output: OutputDescriptor,
    holding_frame: bool,
    access_lost: bool,
}

impl DuplicationSource {
    /// Create the device, resolve the output (primary fallback) and duplicate it.
    pub fn new(output_index: u32) -> Result<Self> {
        Self::create(output_index).map_err(CaptureError::Initialization)
    }

    fn create(output_index: u32) -> anyhow::Result<Self> {
        enable_dpi_awareness();
        let d3d = create_d3d11_device()?;
        let adapter = d3d.adapter()?;
        let (index, output, _) = find_output(&adapter, output_index)?;

        let output1: IDXGIOutput1 = output.cast().context("Failed to query IDXGIOutput1")?;
        let duplication = unsafe { output1.DuplicateOutput(&d3d.device) }
            .context("IDXGIOutput1::DuplicateOutput failed")?;

        let dupl_desc = unsafe { duplication.GetDesc() };
        let (width, height) = frame_size(&dupl_desc);
        info!(
            index,
            width,
            height,
            rotation = dupl_desc.Rotation.0,
            "desktop duplication started"
        );

        Ok(Self {
            duplication,
            d3d,
            output: OutputDescriptor {
                index,
                width,
                height,
            },
            holding_frame: false,
            access_lost: false,
        })
    }

    /// Device and context shared with the encoder for staging copies.
    pub fn device_context(&self) -> &D3D11Context {
        &self.d3d
    }
}

/// Size of the textures the duplication hands out.
///
/// Frames arrive in the display's unrotated orientation, so on a rotated
/// output this differs from the desktop rectangle.
pub(crate) fn frame_size(desc: &DXGI_OUTDUPL_DESC) -> (u32, u32) {
    (desc.ModeDesc.Width, desc.ModeDesc.Height)
}

impl FrameSource for DuplicationSource {
    type Frame = ID3D11Texture2D;

    fn output(&self) -> OutputDescriptor {
        self.output
    }

    fn acquire_frame(&mut self, timeout: Duration) -> Result<Acquired<ID3D11Texture2D>> {
        if self.access_lost {
            return Err(CaptureError::Capture(anyhow!(
                "duplication access was lost; recreate the capture source"
            )));
        }
        if self.holding_frame {
            self.release_frame();
            return Err(CaptureError::Capture(anyhow!(
                "acquire called while a frame is still outstanding"
            )));
        }

        let mut info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;
        let acquired = unsafe {
            self.duplication
                .AcquireNextFrame(timeout_millis(timeout), &mut info, &mut resource)
        };

        if let Err(err) = acquired {
            if err.code() == DXGI_ERROR_WAIT_TIMEOUT {
                return Ok(Acquired::TimedOut);
            }
            // A failed acquire may still have left a frame held by the duplication.
            unsafe {
                let _ = self.duplication.ReleaseFrame();
            }
            if err.code() == DXGI_ERROR_ACCESS_LOST {
                self.access_lost = true;
                return Err(CaptureError::Capture(
                    anyhow::Error::from(err).context("desktop duplication access lost"),
                ));
            }
            return Err(CaptureError::Capture(
                anyhow::Error::from(err).context("AcquireNextFrame failed"),
            ));
        }
        self.holding_frame = true;

        let Some(resource) = resource else {
            // Pointer-only update: nothing to encode.
            self.release_frame();
            return Ok(Acquired::TimedOut);
        };

        match resource.cast::<ID3D11Texture2D>() {
            Ok(texture) => {
                trace!(
                    accumulated = info.AccumulatedFrames,
                    present_time = info.LastPresentTime,
                    "duplication frame acquired"
                );
                Ok(Acquired::Frame(texture))
            }
            Err(err) => {
                self.release_frame();
                Err(CaptureError::Capture(
                    anyhow::Error::from(err).context("acquired resource is not an ID3D11Texture2D"),
                ))
            }
        }
    }

    fn release_frame(&mut self) {
        if !self.holding_frame {
            return;
        }
        self.holding_frame = false;

        if let Err(err) = unsafe { self.duplication.ReleaseFrame() } {
            if err.code() == DXGI_ERROR_ACCESS_LOST {
                self.access_lost = true;
            }
            warn!(error = %err, "IDXGIOutputDuplication::ReleaseFrame failed");
        }
    }

    fn has_outstanding_frame(&self) -> bool {
        self.holding_frame
    }
}

impl Drop for DuplicationSource {
    fn drop(&mut self) {
        self.release_frame();
    }
}
