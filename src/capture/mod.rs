//! Capture session control and the decoder seam.
//!
//! The camera and the QR decoding library live outside this crate. The
//! capture device delivers decoded payload text for live frames; still
//! images go through a [`Decoder`] and then into the same pipeline.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::models::CameraState;

/// Still-image decode failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no QR code found in image")]
    NoCode,
    #[error("image payload is not valid text")]
    NotText,
}

/// Single-image decode call.
pub trait Decoder: Send + Sync {
    fn decode_once(&self, image: &[u8]) -> Result<String, DecodeError>;
}

/// Decoder for capture devices that decode on-device and upload the symbol
/// text in place of pixels.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymbolTextDecoder;

impl Decoder for SymbolTextDecoder {
    fn decode_once(&self, image: &[u8]) -> Result<String, DecodeError> {
        let text = std::str::from_utf8(image).map_err(|_| DecodeError::NotText)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(DecodeError::NoCode);
        }
        Ok(text.to_string())
    }
}

/// Tracks whether the capture session is armed and when it may accept
/// frames again.
#[derive(Debug, Clone)]
pub struct CaptureController {
    state: CameraState,
    resume_at: Option<Instant>,
    rearm_delay: Duration,
}

impl CaptureController {
    pub fn new(rearm_delay: Duration) -> Self {
        Self {
            state: CameraState::Idle,
            resume_at: None,
            rearm_delay,
        }
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    /// Start accepting frames now.
    pub fn arm(&mut self) {
        if self.state == CameraState::Idle {
            tracing::debug!("Capture session started");
        }
        self.state = CameraState::Armed;
        self.resume_at = None;
    }

    /// Resume after the guard delay so a code still in view is not
    /// processed again straight away.
    pub fn arm_after_guard(&mut self, now: Instant) {
        self.state = CameraState::Armed;
        self.resume_at = Some(now + self.rearm_delay);
    }

    pub fn disarm(&mut self) {
        if self.state == CameraState::Armed {
            tracing::debug!("Capture session stopped");
        }
        self.state = CameraState::Idle;
        self.resume_at = None;
    }

    pub fn accepts_frame(&self, now: Instant) -> bool {
        self.state == CameraState::Armed && self.resume_at.map_or(true, |at| now >= at)
    }
}
