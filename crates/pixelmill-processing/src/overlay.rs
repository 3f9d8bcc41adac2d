//! Overlay resolution
//!
//! Fetches overlay bytes and normalizes the spec against the base image:
//! ratio-based sizing becomes absolute target dimensions and the alpha
//! value becomes an opacity factor. Placement stays symbolic here because
//! the final coordinates depend on the overlay's own decoded dimensions,
//! which only the engine knows.

use bytes::Bytes;
use pixelmill_core::{OverlayPosition, OverlaySpec, PipelineError, PipelineResult};
use pixelmill_storage::ObjectStore;

use crate::engine::ImageMetadata;

/// An overlay ready for the engine to composite.
#[derive(Debug, Clone)]
pub struct ResolvedOverlay {
    pub bytes: Bytes,
    /// Target dimensions from wRatio/hRatio, as pixels of the base canvas.
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    /// Blend factor in [0,1]; 1.0 is fully opaque.
    pub opacity: f32,
    pub position: OverlayPosition,
}

/// Fetch and normalize an overlay. Storage NotFound propagates as an
/// overlay error; there is no fallback image.
pub async fn resolve_overlay(
    store: &dyn ObjectStore,
    spec: &OverlaySpec,
    base: &ImageMetadata,
) -> PipelineResult<ResolvedOverlay> {
    let bytes = store
        .get(&spec.bucket, &spec.key)
        .await
        .map_err(|e| PipelineError::Overlay {
            operation: "fetch",
            source: e.into(),
        })?;

    tracing::debug!(
        bucket = %spec.bucket,
        key = %spec.key,
        size_bytes = bytes.len() as u64,
        "overlay fetched"
    );

    // Alpha follows the grammar's convention: 0 is opaque, 100 invisible.
    let opacity = 1.0 - spec.alpha.unwrap_or(0).min(100) as f32 / 100.0;

    Ok(ResolvedOverlay {
        bytes,
        target_width: spec
            .width_ratio
            .map(|r| (base.width as f32 * r / 100.0).round() as u32),
        target_height: spec
            .height_ratio
            .map(|r| (base.height as f32 * r / 100.0).round() as u32),
        opacity,
        position: spec.position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelmill_core::PositionToken;
    use pixelmill_storage::MemoryObjectStore;

    fn spec() -> OverlaySpec {
        OverlaySpec {
            bucket: "assets".to_string(),
            key: "mark.png".to_string(),
            alpha: Some(20),
            width_ratio: Some(10.0),
            height_ratio: Some(10.0),
            position: OverlayPosition {
                left: Some(PositionToken::Pixels(100)),
                top: None,
            },
        }
    }

    #[tokio::test]
    async fn test_resolve_computes_targets_and_opacity() {
        let store = MemoryObjectStore::new();
        store.insert("assets", "mark.png", &b"png bytes"[..]);

        let base = ImageMetadata {
            width: 300,
            height: 200,
        };
        let resolved = resolve_overlay(&store, &spec(), &base).await.unwrap();

        assert_eq!(&resolved.bytes[..], b"png bytes");
        assert_eq!(resolved.target_width, Some(30));
        assert_eq!(resolved.target_height, Some(20));
        assert!((resolved.opacity - 0.8).abs() < f32::EPSILON);
        assert_eq!(resolved.position.left, Some(PositionToken::Pixels(100)));
    }

    #[tokio::test]
    async fn test_missing_overlay_is_an_overlay_error() {
        let store = MemoryObjectStore::new();
        let base = ImageMetadata {
            width: 300,
            height: 200,
        };
        let err = resolve_overlay(&store, &spec(), &base).await.unwrap_err();
        assert_eq!(err.kind(), "overlay");
    }
}
