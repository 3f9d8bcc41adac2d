//! Face detection backends
//!
//! Smart crop needs an ordered list of face bounding boxes for the source
//! image. The trait keeps detection swappable; the AWS Rekognition backend
//! is compiled in behind the `rekognition` feature.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use pixelmill_core::BoundingBox;

/// Detects faces in an encoded image.
///
/// The returned order is meaningful: smart crop selects a face by index,
/// so implementations must return faces in a stable order (the backend's
/// native ordering).
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, image: &Bytes) -> Result<Vec<BoundingBox>>;
}

/// A detector returning a fixed face list. Useful for tests and for
/// deployments that precompute detection results.
#[derive(Debug, Clone, Default)]
pub struct StaticFaceDetector {
    faces: Vec<BoundingBox>,
}

impl StaticFaceDetector {
    pub fn new(faces: Vec<BoundingBox>) -> Self {
        StaticFaceDetector { faces }
    }
}

#[async_trait]
impl FaceDetector for StaticFaceDetector {
    async fn detect(&self, _image: &Bytes) -> Result<Vec<BoundingBox>> {
        Ok(self.faces.clone())
    }
}

#[cfg(feature = "rekognition")]
pub use self::rekognition::RekognitionFaceDetector;

#[cfg(feature = "rekognition")]
mod rekognition {
    use super::*;
    use anyhow::Context;
    use aws_config::BehaviorVersion;
    use aws_sdk_rekognition::types::Image;
    use aws_sdk_rekognition::Client as RekognitionClient;

    /// AWS Rekognition backed face detector.
    pub struct RekognitionFaceDetector {
        client: RekognitionClient,
    }

    impl RekognitionFaceDetector {
        pub async fn from_env() -> Self {
            let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
            RekognitionFaceDetector {
                client: RekognitionClient::new(&config),
            }
        }

        pub async fn for_region(region: &str) -> Self {
            let config = aws_config::defaults(BehaviorVersion::latest())
                .region(aws_config::Region::new(region.to_string()))
                .load()
                .await;
            RekognitionFaceDetector {
                client: RekognitionClient::new(&config),
            }
        }
    }

    #[async_trait]
    impl FaceDetector for RekognitionFaceDetector {
        async fn detect(&self, image: &Bytes) -> Result<Vec<BoundingBox>> {
            let rekognition_image = Image::builder()
                .bytes(aws_sdk_rekognition::primitives::Blob::new(image.to_vec()))
                .build();

            let response = self
                .client
                .detect_faces()
                .image(rekognition_image)
                .send()
                .await
                .context("Rekognition detect_faces call failed")?;

            let faces: Vec<BoundingBox> = response
                .face_details()
                .iter()
                .filter_map(|detail| {
                    let bbox = detail.bounding_box()?;
                    Some(BoundingBox {
                        top: bbox.top()? as f64,
                        left: bbox.left()? as f64,
                        width: bbox.width()? as f64,
                        height: bbox.height()? as f64,
                    })
                })
                .collect();

            tracing::debug!(face_count = faces.len(), "face detection completed");
            Ok(faces)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_detector_returns_fixed_faces() {
        let face = BoundingBox {
            top: 0.1,
            left: 0.2,
            width: 0.3,
            height: 0.4,
        };
        let detector = StaticFaceDetector::new(vec![face]);
        let faces = detector.detect(&Bytes::from_static(b"ignored")).await.unwrap();
        assert_eq!(faces, vec![face]);

        let empty = StaticFaceDetector::default();
        assert!(empty
            .detect(&Bytes::from_static(b"ignored"))
            .await
            .unwrap()
            .is_empty());
    }
}
