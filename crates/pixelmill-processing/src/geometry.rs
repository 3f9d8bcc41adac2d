//! Crop and placement math
//!
//! Pure functions shared by smart crop and overlay composition. All pixel
//! math rounds to nearest before padding is applied, matching the scaling
//! conventions the request grammar documents.

use pixelmill_core::{BoundingBox, CropRegion, PipelineError, PipelineResult, PositionToken};

/// Pick the face a smart crop targets. The face list is ordered by the
/// detector; an out-of-range index or an empty list is an error, never a
/// fallback to some other face.
pub fn select_bounding_box(
    face_index: usize,
    faces: &[BoundingBox],
) -> PipelineResult<BoundingBox> {
    faces.get(face_index).copied().ok_or_else(|| {
        PipelineError::smart_crop(format!(
            "face index {} out of range ({} face(s) detected)",
            face_index,
            faces.len()
        ))
    })
}

/// Derive the absolute crop rectangle for a face plus padding.
///
/// The padded region must lie fully inside the canvas. Clamping it instead
/// would silently change the requested composition, so an out-of-bounds
/// region is an error.
pub fn crop_area(
    bounding_box: &BoundingBox,
    padding: u32,
    width: u32,
    height: u32,
) -> PipelineResult<CropRegion> {
    let padding = padding as i64;
    let left = (bounding_box.left * width as f64).round() as i64 - padding;
    let top = (bounding_box.top * height as f64).round() as i64 - padding;
    let left = left.max(0);
    let top = top.max(0);
    let crop_width = (bounding_box.width * width as f64).round() as i64 + 2 * padding;
    let crop_height = (bounding_box.height * height as f64).round() as i64 + 2 * padding;

    if left + crop_width > width as i64 || top + crop_height > height as i64 {
        return Err(PipelineError::smart_crop(format!(
            "padded crop region {}x{}+{}+{} exceeds {}x{} canvas",
            crop_width, crop_height, left, top, width, height
        )));
    }

    Ok(CropRegion {
        left: left as u32,
        top: top as u32,
        width: crop_width as u32,
        height: crop_height as u32,
    })
}

/// Resolve one axis of an overlay position to an absolute offset.
///
/// Pixel tokens are offsets from the near edge; negative values measure
/// from the far edge so `-60` places the overlay 60px short of it.
/// Percent tokens are fractions of the base canvas. An absent token
/// centers the overlay on that axis.
pub fn overlay_coordinate(base: u32, overlay: u32, token: Option<PositionToken>) -> i64 {
    match token {
        Some(PositionToken::Pixels(px)) if px < 0 => base as i64 + px - overlay as i64,
        Some(PositionToken::Pixels(px)) => px,
        Some(PositionToken::Percent(percent)) => {
            (percent as f64 / 100.0 * base as f64) as i64
        }
        None => (base as i64 - overlay as i64) / 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face() -> BoundingBox {
        BoundingBox {
            height: 0.18,
            left: 0.55,
            top: 0.33,
            width: 0.23,
        }
    }

    #[test]
    fn test_crop_area_with_padding() {
        let region = crop_area(&face(), 20, 200, 400).unwrap();
        assert_eq!(
            region,
            CropRegion {
                left: 90,
                top: 112,
                width: 86,
                height: 112,
            }
        );
    }

    #[test]
    fn test_crop_area_exceeding_canvas_fails() {
        let err = crop_area(&face(), 80, 200, 400).unwrap_err();
        assert!(matches!(err, PipelineError::SmartCrop(_)));
    }

    #[test]
    fn test_crop_area_clamps_negative_origin() {
        let near_edge = BoundingBox {
            height: 0.2,
            left: 0.0,
            top: 0.0,
            width: 0.2,
        };
        let region = crop_area(&near_edge, 10, 500, 500).unwrap();
        assert_eq!(region.left, 0);
        assert_eq!(region.top, 0);
        assert_eq!(region.width, 120);
    }

    #[test]
    fn test_select_bounding_box_out_of_range() {
        let err = select_bounding_box(10, &[face()]).unwrap_err();
        assert!(matches!(err, PipelineError::SmartCrop(_)));

        let err = select_bounding_box(0, &[]).unwrap_err();
        assert!(matches!(err, PipelineError::SmartCrop(_)));

        assert_eq!(select_bounding_box(0, &[face()]).unwrap(), face());
    }

    #[test]
    fn test_overlay_coordinate_conventions() {
        // Positive pixels from the near edge.
        assert_eq!(
            overlay_coordinate(300, 100, Some(PositionToken::Pixels(40))),
            40
        );
        // Negative pixels from the far edge.
        assert_eq!(
            overlay_coordinate(300, 100, Some(PositionToken::Pixels(-60))),
            140
        );
        // Percent of the base canvas.
        assert_eq!(
            overlay_coordinate(300, 100, Some(PositionToken::Percent(50))),
            150
        );
        // Absent token centers.
        assert_eq!(overlay_coordinate(300, 100, None), 100);
    }
}
