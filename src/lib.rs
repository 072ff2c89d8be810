//! # stillcapture
//!
//! On-demand still-frame capture of a display output.
//!
//! Each capture acquires the newest desktop frame from a duplication source,
//! copies it into a CPU-readable staging surface, compresses it to JPEG and
//! hands the bytes back. The acquired frame is always returned to the system,
//! whether or not encoding succeeded.
//!
//! On Windows the [`backend::DuplicationBackend`] uses DXGI Desktop
//! Duplication on a D3D11 device. [`backend::SyntheticBackend`] runs the same
//! pipeline against in-process displays on any platform.
//!
//! ## Rust usage
//!
//! ```no_run
//! # #[cfg(windows)] {
//! use stillcapture::backend::DuplicationBackend;
//! use stillcapture::session::CaptureSession;
//!
//! let session = CaptureSession::new(DuplicationBackend::default());
//! let output = session.init(0).unwrap();
//! println!("{}x{}", output.width, output.height);
//!
//! if let Some(jpeg) = session.capture_and_encode(80).unwrap() {
//!     std::fs::write("screenshot.jpg", &*jpeg).unwrap();
//! }
//! session.shutdown();
//! # }
//! ```

pub mod backend;
pub mod capture;
#[cfg(windows)]
pub mod d3d11;
pub mod encoder;
pub mod error;
pub mod image;
pub mod session;

pub use backend::Backend;
pub use capture::{Acquired, FrameSource, OutputDescriptor};
pub use encoder::FrameEncoder;
pub use error::{CaptureError, CaptureStatus, InitError, InitStatus};
pub use session::{CaptureSession, EncodedFrame, SessionConfig};
