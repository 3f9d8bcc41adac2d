//! Pixelmill processing pipeline
//!
//! Turns a request path (or a structured request's `EditMap`) into encoded
//! output bytes. The stages are independent and composable:
//!
//! - `path`: tokenize the thumbor-style path grammar
//! - `mapper`: translate filter tokens into canonical edits
//! - `geometry`: pure crop and placement math
//! - `overlay`: fetch and prepare overlay images
//! - `detect`: face detection backends
//! - `engine`: the raster engine behind the `ImageEngine` trait
//! - `executor`: drives an `EditMap` through the engine in order

pub mod detect;
pub mod engine;
pub mod executor;
pub mod geometry;
pub mod mapper;
pub mod overlay;
pub mod path;

pub use detect::FaceDetector;
pub use engine::{EngineProvider, ImageEngine, ImageMetadata};
pub use executor::EditPipeline;
pub use path::{FilterToken, ParsedPath};
