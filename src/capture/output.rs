// Output resolution: adapter output index → IDXGIOutput, with primary fallback

use anyhow::{Context, Result};
use tracing::warn;
use windows::Win32::Graphics::Dxgi::{IDXGIAdapter, IDXGIOutput, DXGI_OUTPUT_DESC};
use windows::Win32::UI::HiDpi::{
    SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
};

use crate::d3d11::create_d3d11_device;

/// Display output as reported by DXGI.
#[derive(Debug, Clone)]
pub struct OutputInfo {
    /// Index on the adapter (the value `Init` accepts)
    pub index: u32,
    /// Device name (e.g. "\\\\.\\DISPLAY1")
    pub name: String,
    /// Width (physical pixels, desktop orientation)
    pub width: u32,
    /// Height (physical pixels, desktop orientation)
    pub height: u32,
    /// Whether the output is part of the desktop
    pub attached: bool,
}

impl OutputInfo {
    fn from_desc(index: u32, desc: &DXGI_OUTPUT_DESC) -> Self {
        let (width, height) = desktop_size(desc);
        Self {
            index,
            name: String::from_utf16_lossy(&desc.DeviceName)
                .trim_end_matches('\0')
                .to_string(),
            width,
            height,
            attached: desc.AttachedToDesktop.as_bool(),
        }
    }
}

/// Enable Per-Monitor DPI awareness
///
/// Ensures desktop coordinates are physical resolution rather than scaled logical resolution.
/// Repeated calls are safe (silently ignored if already set).
pub fn enable_dpi_awareness() {
    unsafe {
        // SAFETY: best-effort call, failure indicates it was already set
        let _ = SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2);
    }
}

/// List the outputs of the default hardware adapter.
pub fn enumerate_outputs() -> Result<Vec<OutputInfo>> {
    enable_dpi_awareness();
    let ctx = create_d3d11_device()?;
    let adapter = ctx.adapter()?;

    let mut outputs = Vec::new();
    let mut index = 0u32;
    // EnumOutputs fails with DXGI_ERROR_NOT_FOUND past the last output.
    while let Ok(output) = unsafe { adapter.EnumOutputs(index) } {
        let desc = unsafe { output.GetDesc() }
            .with_context(|| format!("IDXGIOutput::GetDesc failed for output {}", index))?;
        outputs.push(OutputInfo::from_desc(index, &desc));
        index += 1;
    }
    Ok(outputs)
}

/// Find an output by index, falling back to the primary output (index 0)
/// when `index` does not exist.
pub(crate) fn find_output(
    adapter: &IDXGIAdapter,
    index: u32,
) -> Result<(u32, IDXGIOutput, DXGI_OUTPUT_DESC)> {
    let (resolved, output) = match unsafe { adapter.EnumOutputs(index) } {
        Ok(output) => (index, output),
        Err(err) => {
            warn!(requested = index, error = %err, "output not found, falling back to primary");
            let output = unsafe { adapter.EnumOutputs(0) }
                .context("No display output found on adapter (including primary fallback)")?;
            (0, output)
        }
    };

    let desc = unsafe { output.GetDesc() }.context("IDXGIOutput::GetDesc failed")?;
    Ok((resolved, output, desc))
}

fn desktop_size(desc: &DXGI_OUTPUT_DESC) -> (u32, u32) {
    let rect = desc.DesktopCoordinates;
    (
        (rect.right - rect.left).max(0) as u32,
        (rect.bottom - rect.top).max(0) as u32,
    )
}
