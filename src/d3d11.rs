// D3D11 device creation and management

pub mod texture;

use anyhow::{Context, Result};
use tracing::info;
use windows::core::Interface;
use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::*;

/// D3D11 device and immediate context.
///
/// Field order is drop order: the context is released before the device.
pub struct D3D11Context {
    pub context: ID3D11DeviceContext,
    pub device: ID3D11Device,
}

impl D3D11Context {
    /// Adapter the device was created on (outputs are enumerated from it).
    pub fn adapter(&self) -> Result<IDXGIAdapter> {
        let dxgi_device: IDXGIDevice = self
            .device
            .cast()
            .context("Failed to query IDXGIDevice")?;
        // SAFETY: dxgi_device was obtained from a live ID3D11Device
        unsafe { dxgi_device.GetAdapter().context("IDXGIDevice::GetAdapter failed") }
    }
}

/// Create a hardware D3D11 device with BGRA support
pub fn create_d3d11_device() -> Result<D3D11Context> {
    let (device, context) = unsafe {
        let mut device = None;
        let mut context = None;

        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            HMODULE::default(),
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            Some(&[D3D_FEATURE_LEVEL_11_0]),
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )
        .context("D3D11CreateDevice failed")?;

        (
            device.context("D3D11CreateDevice returned no device")?,
            context.context("D3D11CreateDevice returned no context")?,
        )
    };

    let ctx = D3D11Context { context, device };
    let _ = log_device_info(&ctx);
    Ok(ctx)
}

fn log_device_info(ctx: &D3D11Context) -> Result<()> {
    let desc = unsafe { ctx.adapter()?.GetDesc()? };
    let name = String::from_utf16_lossy(&desc.Description);

    info!(
        gpu = name.trim_end_matches('\0'),
        vram_mb = desc.DedicatedVideoMemory / 1024 / 1024,
        "D3D11 device created"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_creation() {
        let _ctx = create_d3d11_device().expect("device creation failed");
    }

    #[test]
    fn test_dxgi_adapter() {
        let ctx = create_d3d11_device().unwrap();
        let adapter = ctx.adapter().expect("adapter lookup failed");
        unsafe {
            assert!(adapter.GetDesc().is_ok());
        }
    }
}
