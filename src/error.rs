//! Error taxonomy and boundary status codes.
//!
//! Internals (D3D11, DXGI, WIC, codec) report `anyhow::Error` with context.
//! Components wrap those causes into [`CaptureError`] so the session can map
//! every failure to a stable integer status for the hosting application.

use thiserror::Error;

/// Failure raised by a capture source, an encoder or the session.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Device, output, duplication, codec or staging surface creation failed.
    #[error("initialization failed: {0:#}")]
    Initialization(anyhow::Error),

    /// The duplication subscription itself failed; the source must be recreated.
    #[error("frame acquisition failed: {0:#}")]
    Capture(anyhow::Error),

    /// Copy, map or compression failed after a frame was acquired.
    #[error("frame encoding failed: {0:#}")]
    Encode(anyhow::Error),

    #[error("capture session is not initialized")]
    NotInitialized,
}

impl CaptureError {
    /// Status code reported by `CaptureAndEncode` for this failure.
    pub fn status_code(&self) -> i32 {
        CaptureStatus::from(self) as i32
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Why `Init` failed. Source and encoder failures are kept apart so the
/// caller can tell which collaborator is unavailable.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("capture source unavailable: {0}")]
    Source(#[source] CaptureError),

    #[error("frame encoder unavailable: {0}")]
    Encoder(#[source] CaptureError),
}

impl InitError {
    pub fn status_code(&self) -> i32 {
        InitStatus::from(self) as i32
    }
}

/// Integer results of `Init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum InitStatus {
    Success = 0,
    SourceFailure = -1,
    EncoderFailure = -2,
}

impl From<&InitError> for InitStatus {
    fn from(err: &InitError) -> Self {
        match err {
            InitError::Source(_) => Self::SourceFailure,
            InitError::Encoder(_) => Self::EncoderFailure,
        }
    }
}

/// Integer results of `CaptureAndEncode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CaptureStatus {
    /// No new frame arrived within the acquire timeout.
    NoNewFrame = 0,
    Success = 1,
    NotInitialized = -1,
    CaptureFailure = -2,
    EncodeFailure = -3,
}

impl CaptureStatus {
    /// Status of a `capture_and_encode` result: `Ok(None)` is a timeout.
    pub fn of<T>(result: &Result<Option<T>>) -> Self {
        match result {
            Ok(Some(_)) => Self::Success,
            Ok(None) => Self::NoNewFrame,
            Err(err) => Self::from(err),
        }
    }
}

impl From<&CaptureError> for CaptureStatus {
    fn from(err: &CaptureError) -> Self {
        match err {
            // A session whose collaborators never came up is reported as uninitialized.
            CaptureError::Initialization(_) | CaptureError::NotInitialized => Self::NotInitialized,
            CaptureError::Capture(_) => Self::CaptureFailure,
            CaptureError::Encode(_) => Self::EncodeFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_status_codes() {
        assert_eq!(CaptureError::NotInitialized.status_code(), -1);
        assert_eq!(
            CaptureError::Capture(anyhow::anyhow!("access lost")).status_code(),
            -2
        );
        assert_eq!(
            CaptureError::Encode(anyhow::anyhow!("map failed")).status_code(),
            -3
        );
        assert_eq!(CaptureStatus::NoNewFrame as i32, 0);
        assert_eq!(CaptureStatus::Success as i32, 1);
    }

    #[test]
    fn test_status_of_result() {
        assert_eq!(CaptureStatus::of(&Ok(Some(()))), CaptureStatus::Success);
        assert_eq!(CaptureStatus::of::<()>(&Ok(None)), CaptureStatus::NoNewFrame);
        assert_eq!(
            CaptureStatus::of::<()>(&Err(CaptureError::Encode(anyhow::anyhow!("commit")))),
            CaptureStatus::EncodeFailure
        );
    }

    #[test]
    fn test_init_status_codes() {
        let source = InitError::Source(CaptureError::Initialization(anyhow::anyhow!("no output")));
        let encoder = InitError::Encoder(CaptureError::Initialization(anyhow::anyhow!("no codec")));
        assert_eq!(source.status_code(), -1);
        assert_eq!(encoder.status_code(), -2);
        assert_eq!(InitStatus::Success as i32, 0);
    }

    #[test]
    fn test_error_message_keeps_context_chain() {
        let cause = anyhow::anyhow!("E_OUTOFMEMORY").context("Failed to create staging texture");
        let msg = CaptureError::Initialization(cause).to_string();
        assert!(msg.contains("Failed to create staging texture"));
        assert!(msg.contains("E_OUTOFMEMORY"));
    }
}
