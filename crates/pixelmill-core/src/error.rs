//! Error types
//!
//! `PipelineError` is the unified error surface of the whole pipeline.
//! Variants map to the failure classes callers can react to; collaborator
//! failures (storage, face detection, the raster engine) carry their source
//! error and the name of the operation that was running.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request path or structured input could not be interpreted.
    #[error("parsing error: {0}")]
    Parsing(String),

    /// A face-aware crop could not be satisfied (no such face, or the
    /// padded crop falls outside the image).
    #[error("smart crop error: {0}")]
    SmartCrop(String),

    /// Fetching or placing an overlay image failed.
    #[error("overlay error during {operation}: {source}")]
    Overlay {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The image engine rejected or failed an edit.
    #[error("engine error during {operation}: {source}")]
    Engine {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The face detection backend failed outright (distinct from finding
    /// no faces, which is a SmartCrop condition).
    #[error("face detection error: {0}")]
    FaceDetection(anyhow::Error),
}

impl PipelineError {
    pub fn parsing(msg: impl Into<String>) -> Self {
        PipelineError::Parsing(msg.into())
    }

    pub fn smart_crop(msg: impl Into<String>) -> Self {
        PipelineError::SmartCrop(msg.into())
    }

    /// Stable kind name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Parsing(_) => "parsing",
            PipelineError::SmartCrop(_) => "smart_crop",
            PipelineError::Overlay { .. } => "overlay",
            PipelineError::Engine { .. } => "engine",
            PipelineError::FaceDetection(_) => "face_detection",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_and_display() {
        let err = PipelineError::parsing("empty path");
        assert_eq!(err.kind(), "parsing");
        assert_eq!(err.to_string(), "parsing error: empty path");

        let err = PipelineError::Engine {
            operation: "rotate",
            source: anyhow::anyhow!("unsupported angle"),
        };
        assert_eq!(err.kind(), "engine");
        assert!(err.to_string().contains("rotate"));
    }
}
