// JPEG encoding via Windows Imaging Component (WIC).
//
// The factory is created once; each frame gets a fresh in-memory stream and
// encoder. The JPEG encoder accepts 24bppBGR (not BGRA), so mapped rows are
// repacked into a scratch buffer kept across frames.

use anyhow::{bail, Context, Result};
use windows::core::{w, GUID, PWSTR, VARIANT};
use windows::Win32::Foundation::HGLOBAL;
use windows::Win32::Graphics::Imaging::{
    CLSID_WICImagingFactory, GUID_ContainerFormatJpeg, GUID_WICPixelFormat24bppBGR,
    IWICBitmapFrameEncode, IWICImagingFactory, WICBitmapEncoderNoCache,
};
use windows::Win32::System::Com::StructuredStorage::{
    CreateStreamOnHGlobal, IPropertyBag2, PROPBAG2,
};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, IStream, CLSCTX_INPROC_SERVER, COINIT_MULTITHREADED,
    STATFLAG_NONAME, STATSTG, STREAM_SEEK_SET,
};

use super::{BgraRows, ChannelOrder, ImageCodec};

/// WIC-backed JPEG codec.
pub struct WicJpegCodec {
    factory: IWICImagingFactory,
    /// Packed BGR pixels of the frame being encoded
    bgr: Vec<u8>,
}

impl WicJpegCodec {
    /// Create the imaging factory. COM is initialized for this thread if needed.
    pub fn new() -> Result<Self> {
        // SAFETY: CoInitializeEx returns S_FALSE if already initialized on this thread.
        unsafe {
            let _ = CoInitializeEx(None, COINIT_MULTITHREADED);
        }

        let factory: IWICImagingFactory =
            unsafe { CoCreateInstance(&CLSID_WICImagingFactory, None, CLSCTX_INPROC_SERVER) }
                .context("Failed to create WIC imaging factory")?;
        Ok(Self {
            factory,
            bgr: Vec::new(),
        })
    }

    fn encode_to_stream(&self, width: u32, height: u32, quality: f32) -> Result<IStream> {
        let stride = width.checked_mul(3).context("row stride exceeds u32")?;
        // WritePixels wants exactly stride * lines bytes.
        let len = stride as usize * height as usize;
        if self.bgr.len() != len {
            bail!("packed BGR buffer is {} bytes, expected {}", self.bgr.len(), len);
        }

        // SAFETY: all WIC objects are created and consumed inside this scope.
        unsafe {
            let stream = CreateStreamOnHGlobal(HGLOBAL::default(), true)
                .context("CreateStreamOnHGlobal failed")?;

            let encoder = self
                .factory
                .CreateEncoder(&GUID_ContainerFormatJpeg, std::ptr::null())
                .context("Failed to create WIC JPEG encoder")?;
            encoder.Initialize(&stream, WICBitmapEncoderNoCache)?;

            let mut frame: Option<IWICBitmapFrameEncode> = None;
            let mut props: Option<IPropertyBag2> = None;
            encoder.CreateNewFrame(&mut frame, &mut props)?;
            let frame = frame.context("WIC CreateNewFrame returned null")?;

            match props {
                Some(ref props) => {
                    write_image_quality(props, quality)?;
                    frame.Initialize(props)?;
                }
                None => frame.Initialize(None::<&IPropertyBag2>)?,
            }

            frame.SetSize(width, height)?;
            let mut fmt: GUID = GUID_WICPixelFormat24bppBGR;
            frame.SetPixelFormat(&mut fmt)?;
            if fmt != GUID_WICPixelFormat24bppBGR {
                bail!(
                    "WIC rejected BGR input for JPEG encoding; requested {:?}, got {:?}",
                    GUID_WICPixelFormat24bppBGR,
                    fmt
                );
            }

            frame
                .WritePixels(height, stride, &self.bgr)
                .context("IWICBitmapFrameEncode::WritePixels failed")?;
            frame.Commit().context("WIC frame commit failed")?;
            encoder.Commit().context("WIC encoder commit failed")?;

            Ok(stream)
        }
    }
}

impl ImageCodec for WicJpegCodec {
    fn compress(&mut self, rows: &BgraRows<'_>, quality: f32, out: &mut Vec<u8>) -> Result<()> {
        rows.validate()?;
        rows.pack_24(ChannelOrder::Bgr, &mut self.bgr);
        let stream = self.encode_to_stream(rows.width, rows.height, quality)?;

        out.clear();
        if let Err(err) = read_stream(&stream, out) {
            out.clear();
            return Err(err);
        }
        Ok(())
    }
}

/// Set the JPEG "ImageQuality" encoder option (0.0–1.0).
unsafe fn write_image_quality(props: &IPropertyBag2, quality: f32) -> Result<()> {
    let option = PROPBAG2 {
        pstrName: PWSTR(w!("ImageQuality").as_ptr() as *mut _),
        ..Default::default()
    };

    let value = VARIANT::from(quality);

    props
        .Write(1, &option, &value)
        .context("Failed to set WIC ImageQuality")
}

/// Copy the whole stream into `out`.
fn read_stream(stream: &IStream, out: &mut Vec<u8>) -> Result<()> {
    // SAFETY: stream is a live in-memory IStream; Read writes at most `size`
    // bytes into `out`, which is resized to `size` beforehand.
    unsafe {
        let mut stat = STATSTG::default();
        stream.Stat(&mut stat, STATFLAG_NONAME)?;
        let size = usize::try_from(stat.cbSize).context("encoded image too large")?;

        stream.Seek(0, STREAM_SEEK_SET, None)?;
        out.resize(size, 0);

        let mut read = 0u32;
        stream
            .Read(out.as_mut_ptr().cast(), size as u32, Some(&mut read))
            .ok()
            .context("IStream::Read failed")?;
        if read as usize != size {
            bail!("short read from encoded stream: {} of {} bytes", read, size);
        }
    }
    Ok(())
}
