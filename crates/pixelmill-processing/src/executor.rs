//! Edit pipeline executor
//!
//! Walks an `EditMap` in insertion order and drives the engine, awaiting
//! the object store and face detector at the position their edit appears.
//! One pipeline call owns its engine exclusively; there is no shared state
//! between requests and no retrying — a collaborator failure aborts the
//! request with the failing operation attached.

use std::sync::Arc;

use bytes::Bytes;
use pixelmill_core::{
    config::Config, Edit, EditMap, ImageRequest, OutputFormat, PipelineError, PipelineResult,
};
use pixelmill_storage::ObjectStore;

use crate::detect::FaceDetector;
use crate::engine::{EngineError, EngineProvider};
use crate::geometry;
use crate::mapper;
use crate::overlay;
use crate::path;

pub struct EditPipeline {
    store: Arc<dyn ObjectStore>,
    detector: Arc<dyn FaceDetector>,
    provider: Arc<dyn EngineProvider>,
}

impl EditPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        detector: Arc<dyn FaceDetector>,
        provider: Arc<dyn EngineProvider>,
    ) -> Self {
        EditPipeline {
            store,
            detector,
            provider,
        }
    }

    /// Execute a structured request against source bytes.
    pub async fn execute_request(
        &self,
        source: Bytes,
        request: &ImageRequest,
    ) -> PipelineResult<Bytes> {
        self.execute(source, &request.edits, request.output_format)
            .await
    }

    /// Parse a grammar path (applying the configured legacy rewrite first)
    /// and execute the resulting edits.
    pub async fn execute_path(
        &self,
        source: Bytes,
        raw_path: &str,
        config: &Config,
    ) -> PipelineResult<Bytes> {
        let rewritten;
        let effective_path = match config.rewrite_pair() {
            Some((pattern, subst)) => {
                rewritten = path::rewrite_legacy_path(raw_path, Some(pattern), Some(subst))?;
                rewritten.as_str()
            }
            None => raw_path,
        };
        let parsed = path::parse_path(effective_path)?;
        let edits = mapper::map_path(&parsed);
        self.execute(source, &edits, None).await
    }

    /// Apply an edit map to source bytes and encode the result.
    ///
    /// An empty map with no explicit output format is the identity: the
    /// source bytes come back untouched and the engine is never opened.
    pub async fn execute(
        &self,
        source: Bytes,
        edits: &EditMap,
        output_format: Option<OutputFormat>,
    ) -> PipelineResult<Bytes> {
        if edits.is_empty() && output_format.is_none() {
            return Ok(source);
        }

        let mut engine = self
            .provider
            .open(&source)
            .map_err(engine_error("open"))?;

        for edit in edits {
            let operation = edit.key_name();
            tracing::debug!(edit = %operation, "applying edit");
            match edit {
                Edit::Resize(resize) => {
                    engine.resize(resize).map_err(engine_error(operation))?
                }
                Edit::Rotate(degrees) => {
                    engine.rotate(*degrees).map_err(engine_error(operation))?
                }
                Edit::Blur(sigma) => engine.blur(*sigma).map_err(engine_error(operation))?,
                Edit::Sharpen(sigma) => {
                    engine.sharpen(*sigma).map_err(engine_error(operation))?
                }
                Edit::Convolve(convolve) => {
                    engine.convolve(convolve).map_err(engine_error(operation))?
                }
                Edit::Tint(tint) => engine.tint(*tint).map_err(engine_error(operation))?,
                Edit::Flatten(flatten) => engine
                    .flatten(flatten.background)
                    .map_err(engine_error(operation))?,
                Edit::Normalize => engine.normalize().map_err(engine_error(operation))?,
                Edit::Grayscale(true) => engine.grayscale().map_err(engine_error(operation))?,
                Edit::Flip(true) => engine.flip().map_err(engine_error(operation))?,
                Edit::Flop(true) => engine.flop().map_err(engine_error(operation))?,
                Edit::Grayscale(false) | Edit::Flip(false) | Edit::Flop(false) => {}
                Edit::ToFormat(format) => engine.set_format(*format),
                Edit::FormatOptions { format, quality } => {
                    engine.set_format_quality(*format, *quality)
                }
                Edit::OverlayWith(spec) => {
                    let base = engine.metadata();
                    let resolved =
                        overlay::resolve_overlay(self.store.as_ref(), spec, &base).await?;
                    engine.composite(&resolved).map_err(|e| PipelineError::Overlay {
                        operation: "composite",
                        source: e.into(),
                    })?;
                }
                Edit::SmartCrop(smart_crop) => {
                    let face_index = smart_crop.face_index.ok_or_else(|| {
                        PipelineError::smart_crop("smart crop requires a face index")
                    })?;
                    // Detection always runs on the original source bytes,
                    // independent of edits already applied.
                    let faces = self
                        .detector
                        .detect(&source)
                        .await
                        .map_err(PipelineError::FaceDetection)?;
                    let bounding_box = geometry::select_bounding_box(face_index, &faces)?;
                    let base = engine.metadata();
                    let region = geometry::crop_area(
                        &bounding_box,
                        smart_crop.padding,
                        base.width,
                        base.height,
                    )?;
                    engine.crop(region).map_err(engine_error(operation))?;
                }
            }
        }

        // The structured request's outputFormat has the last word.
        if let Some(format) = output_format {
            engine.set_format(format);
        }

        engine.finalize().map_err(engine_error("finalize"))
    }
}

fn engine_error(operation: &'static str) -> impl FnOnce(EngineError) -> PipelineError {
    move |e| PipelineError::Engine {
        operation,
        source: e.into(),
    }
}
