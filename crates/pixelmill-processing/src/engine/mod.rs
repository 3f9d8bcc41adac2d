//! Image engine abstraction
//!
//! An `ImageEngine` holds one decoded image and applies edits in place;
//! `finalize` encodes it in the resolved output format. The executor only
//! talks to these traits, so the raster backend can be swapped without
//! touching pipeline logic.

use bytes::Bytes;
use pixelmill_core::{ConvolveEdit, CropRegion, OutputFormat, ResizeEdit, RgbColor, TintColor};
use thiserror::Error;

use crate::overlay::ResolvedOverlay;

pub mod raster;

pub use raster::RasterEngineProvider;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("decode failed: {0}")]
    Decode(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Pixel dimensions of the decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
}

/// One open image and the operations the edit vocabulary can drive.
pub trait ImageEngine: Send {
    fn metadata(&self) -> ImageMetadata;

    fn resize(&mut self, resize: &ResizeEdit) -> EngineResult<()>;
    fn rotate(&mut self, degrees: i32) -> EngineResult<()>;
    fn blur(&mut self, sigma: f32) -> EngineResult<()>;
    fn sharpen(&mut self, sigma: f32) -> EngineResult<()>;
    fn convolve(&mut self, convolve: &ConvolveEdit) -> EngineResult<()>;
    fn tint(&mut self, tint: TintColor) -> EngineResult<()>;
    fn flatten(&mut self, background: RgbColor) -> EngineResult<()>;
    fn normalize(&mut self) -> EngineResult<()>;
    fn grayscale(&mut self) -> EngineResult<()>;
    fn flip(&mut self) -> EngineResult<()>;
    fn flop(&mut self) -> EngineResult<()>;
    fn crop(&mut self, region: CropRegion) -> EngineResult<()>;
    fn composite(&mut self, overlay: &ResolvedOverlay) -> EngineResult<()>;

    /// Select the output format, keeping any quality already set for it.
    fn set_format(&mut self, format: OutputFormat);
    /// Select the output format and its encode quality.
    fn set_format_quality(&mut self, format: OutputFormat, quality: u32);

    /// Encode the current image and consume the engine state.
    fn finalize(&mut self) -> EngineResult<Bytes>;
}

/// Opens engines from encoded bytes.
pub trait EngineProvider: Send + Sync {
    fn open(&self, bytes: &Bytes) -> EngineResult<Box<dyn ImageEngine>>;
}
