//! Pixelmill core library
//!
//! This crate provides the shared data model for Pixelmill: the canonical
//! `EditMap` of ordered image edits, the typed edit vocabulary, geometry
//! primitives (bounding boxes and crop regions), the structured request
//! surface, unified error types and environment configuration.
//!
//! Both input surfaces — the legacy path grammar and structured JSON
//! requests — normalize into the same `EditMap`; everything downstream
//! (the executor, the engine) only ever sees that canonical form.

pub mod config;
pub mod edits;
pub mod error;
pub mod request;

pub use edits::{
    BoundingBox, ConvolveEdit, CropRegion, Edit, EditKey, EditMap, FlattenEdit, OutputFormat,
    OverlayPosition, OverlaySpec, PositionToken, ResizeEdit, ResizeFit, RgbColor, SmartCropEdit,
    TintColor,
};
pub use error::{PipelineError, PipelineResult};
pub use request::ImageRequest;
