//! Raster engine
//!
//! Default `ImageEngine` built on the image crate for decode and
//! geometry, mozjpeg for JPEG output and libwebp for WebP output. Filter
//! kernels and color operations run as plain pixel loops over RGBA8.

use std::collections::HashMap;
use std::io::Cursor;

use bytes::Bytes;
use image::{imageops, DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use pixelmill_core::{
    ConvolveEdit, CropRegion, OutputFormat, ResizeEdit, ResizeFit, RgbColor, TintColor,
};

use crate::engine::{EngineError, EngineProvider, EngineResult, ImageEngine, ImageMetadata};
use crate::geometry;
use crate::overlay::ResolvedOverlay;

const RESIZE_FILTER: imageops::FilterType = imageops::FilterType::Lanczos3;
const DEFAULT_QUALITY: u32 = 80;

/// Opens `RasterEngine` instances from encoded bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterEngineProvider;

impl EngineProvider for RasterEngineProvider {
    fn open(&self, bytes: &Bytes) -> EngineResult<Box<dyn ImageEngine>> {
        let source_format = image::guess_format(bytes).ok();
        let image =
            image::load_from_memory(bytes).map_err(|e| EngineError::Decode(e.to_string()))?;
        Ok(Box::new(RasterEngine {
            image,
            source_format,
            output_format: None,
            quality: HashMap::new(),
        }))
    }
}

pub struct RasterEngine {
    image: DynamicImage,
    source_format: Option<ImageFormat>,
    output_format: Option<OutputFormat>,
    quality: HashMap<OutputFormat, u32>,
}

impl RasterEngine {
    fn rotate_arbitrary(&mut self, degrees: f64) {
        let src = self.image.to_rgba8();
        let (width, height) = src.dimensions();
        let theta = degrees.to_radians();
        let (sin, cos) = theta.sin_cos();

        let new_width = (width as f64 * cos.abs() + height as f64 * sin.abs()).ceil() as u32;
        let new_height = (width as f64 * sin.abs() + height as f64 * cos.abs()).ceil() as u32;
        let cx = width as f64 / 2.0;
        let cy = height as f64 / 2.0;
        let ncx = new_width as f64 / 2.0;
        let ncy = new_height as f64 / 2.0;

        let mut out = RgbaImage::from_pixel(new_width, new_height, Rgba([0, 0, 0, 0]));
        for y in 0..new_height {
            for x in 0..new_width {
                // Inverse-map each destination pixel into the source.
                let dx = x as f64 + 0.5 - ncx;
                let dy = y as f64 + 0.5 - ncy;
                let sx = (dx * cos + dy * sin + cx).floor();
                let sy = (-dx * sin + dy * cos + cy).floor();
                if sx >= 0.0 && sy >= 0.0 && (sx as u32) < width && (sy as u32) < height {
                    out.put_pixel(x, y, *src.get_pixel(sx as u32, sy as u32));
                }
            }
        }
        self.image = DynamicImage::ImageRgba8(out);
    }

    fn resolved_format(&self) -> Option<OutputFormat> {
        self.output_format.or_else(|| match self.source_format {
            Some(ImageFormat::Jpeg) => Some(OutputFormat::Jpeg),
            Some(ImageFormat::Png) => Some(OutputFormat::Png),
            Some(ImageFormat::WebP) => Some(OutputFormat::WebP),
            Some(ImageFormat::Tiff) => Some(OutputFormat::Tiff),
            _ => None,
        })
    }
}

impl ImageEngine for RasterEngine {
    fn metadata(&self) -> ImageMetadata {
        let (width, height) = self.image.dimensions();
        ImageMetadata { width, height }
    }

    fn resize(&mut self, resize: &ResizeEdit) -> EngineResult<()> {
        let (current_width, current_height) = self.image.dimensions();
        let (target_width, target_height) = match (resize.width, resize.height) {
            // A resize entry can carry only merged fields (background,
            // fit) with no dimensions; nothing to do then.
            (None, None) => return Ok(()),
            (Some(w), None) => {
                let h = (current_height as f64 * w as f64 / current_width as f64).round() as u32;
                (w, h.max(1))
            }
            (None, Some(h)) => {
                let w = (current_width as f64 * h as f64 / current_height as f64).round() as u32;
                (w.max(1), h)
            }
            (Some(w), Some(h)) => (w, h),
        };
        if target_width == 0 || target_height == 0 {
            return Err(EngineError::InvalidParameters(
                "resize dimensions must be positive".to_string(),
            ));
        }
        if resize.without_enlargement == Some(true)
            && target_width >= current_width
            && target_height >= current_height
        {
            return Ok(());
        }

        self.image = match resize.fit.unwrap_or(ResizeFit::Cover) {
            ResizeFit::Cover => self
                .image
                .resize_to_fill(target_width, target_height, RESIZE_FILTER),
            ResizeFit::Fill => self
                .image
                .resize_exact(target_width, target_height, RESIZE_FILTER),
            ResizeFit::Inside => self.image.resize(target_width, target_height, RESIZE_FILTER),
            ResizeFit::Outside => {
                let ratio = f64::max(
                    target_width as f64 / current_width as f64,
                    target_height as f64 / current_height as f64,
                );
                let w = (current_width as f64 * ratio).round().max(1.0) as u32;
                let h = (current_height as f64 * ratio).round().max(1.0) as u32;
                self.image.resize_exact(w, h, RESIZE_FILTER)
            }
            ResizeFit::Contain => {
                let scaled = self.image.resize(target_width, target_height, RESIZE_FILTER);
                let bg = resize.background.unwrap_or(RgbColor { r: 0, g: 0, b: 0 });
                let mut canvas = RgbaImage::from_pixel(
                    target_width,
                    target_height,
                    Rgba([bg.r, bg.g, bg.b, 255]),
                );
                let x = (target_width.saturating_sub(scaled.width()) / 2) as i64;
                let y = (target_height.saturating_sub(scaled.height()) / 2) as i64;
                imageops::overlay(&mut canvas, &scaled.to_rgba8(), x, y);
                DynamicImage::ImageRgba8(canvas)
            }
        };
        Ok(())
    }

    fn rotate(&mut self, degrees: i32) -> EngineResult<()> {
        match degrees.rem_euclid(360) {
            0 => {}
            90 => self.image = self.image.rotate90(),
            180 => self.image = self.image.rotate180(),
            270 => self.image = self.image.rotate270(),
            other => self.rotate_arbitrary(other as f64),
        }
        Ok(())
    }

    fn blur(&mut self, sigma: f32) -> EngineResult<()> {
        if sigma > 0.0 {
            self.image = self.image.blur(sigma);
        }
        Ok(())
    }

    fn sharpen(&mut self, sigma: f32) -> EngineResult<()> {
        if sigma > 0.0 {
            self.image = self.image.unsharpen(sigma, 0);
        }
        Ok(())
    }

    fn convolve(&mut self, convolve: &ConvolveEdit) -> EngineResult<()> {
        let expected = (convolve.width * convolve.height) as usize;
        if convolve.kernel.len() != expected || convolve.width == 0 || convolve.height == 0 {
            return Err(EngineError::InvalidParameters(format!(
                "kernel length {} does not match {}x{}",
                convolve.kernel.len(),
                convolve.width,
                convolve.height
            )));
        }

        let src = self.image.to_rgba8();
        let (width, height) = src.dimensions();
        let kernel_sum: f32 = convolve.kernel.iter().sum();
        let scale = if kernel_sum != 0.0 { kernel_sum } else { 1.0 };
        let half_w = (convolve.width / 2) as i64;
        let half_h = (convolve.height / 2) as i64;

        let mut out = RgbaImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let mut acc = [0.0f32; 3];
                for ky in 0..convolve.height as i64 {
                    for kx in 0..convolve.width as i64 {
                        // Clamp-to-edge sampling at the borders.
                        let sx = (x as i64 + kx - half_w).clamp(0, width as i64 - 1) as u32;
                        let sy = (y as i64 + ky - half_h).clamp(0, height as i64 - 1) as u32;
                        let weight =
                            convolve.kernel[(ky * convolve.width as i64 + kx) as usize];
                        let px = src.get_pixel(sx, sy);
                        for c in 0..3 {
                            acc[c] += px[c] as f32 * weight;
                        }
                    }
                }
                let alpha = src.get_pixel(x, y)[3];
                out.put_pixel(
                    x,
                    y,
                    Rgba([
                        (acc[0] / scale).clamp(0.0, 255.0) as u8,
                        (acc[1] / scale).clamp(0.0, 255.0) as u8,
                        (acc[2] / scale).clamp(0.0, 255.0) as u8,
                        alpha,
                    ]),
                );
            }
        }
        self.image = DynamicImage::ImageRgba8(out);
        Ok(())
    }

    fn tint(&mut self, tint: TintColor) -> EngineResult<()> {
        let mut img = self.image.to_rgba8();
        let factors = [tint.r / 255.0, tint.g / 255.0, tint.b / 255.0];
        for px in img.pixels_mut() {
            for c in 0..3 {
                px[c] = (px[c] as f32 * factors[c]).clamp(0.0, 255.0) as u8;
            }
        }
        self.image = DynamicImage::ImageRgba8(img);
        Ok(())
    }

    fn flatten(&mut self, background: RgbColor) -> EngineResult<()> {
        let src = self.image.to_rgba8();
        let (width, height) = src.dimensions();
        let mut out = image::RgbImage::new(width, height);
        for (x, y, px) in src.enumerate_pixels() {
            let alpha = px[3] as f32 / 255.0;
            let blend = |fg: u8, bg: u8| (fg as f32 * alpha + bg as f32 * (1.0 - alpha)) as u8;
            out.put_pixel(
                x,
                y,
                image::Rgb([
                    blend(px[0], background.r),
                    blend(px[1], background.g),
                    blend(px[2], background.b),
                ]),
            );
        }
        self.image = DynamicImage::ImageRgb8(out);
        Ok(())
    }

    fn normalize(&mut self) -> EngineResult<()> {
        let mut img = self.image.to_rgba8();
        let mut min = 255u8;
        let mut max = 0u8;
        for px in img.pixels() {
            for c in 0..3 {
                min = min.min(px[c]);
                max = max.max(px[c]);
            }
        }
        if max > min {
            let range = (max - min) as f32;
            for px in img.pixels_mut() {
                for c in 0..3 {
                    px[c] = ((px[c] - min) as f32 * 255.0 / range).round() as u8;
                }
            }
            self.image = DynamicImage::ImageRgba8(img);
        }
        Ok(())
    }

    fn grayscale(&mut self) -> EngineResult<()> {
        self.image = self.image.grayscale();
        Ok(())
    }

    fn flip(&mut self) -> EngineResult<()> {
        self.image = self.image.flipv();
        Ok(())
    }

    fn flop(&mut self) -> EngineResult<()> {
        self.image = self.image.fliph();
        Ok(())
    }

    fn crop(&mut self, region: CropRegion) -> EngineResult<()> {
        let (width, height) = self.image.dimensions();
        if region.left + region.width > width || region.top + region.height > height {
            return Err(EngineError::InvalidParameters(format!(
                "crop region {}x{}+{}+{} exceeds {}x{} image",
                region.width, region.height, region.left, region.top, width, height
            )));
        }
        self.image = self
            .image
            .crop_imm(region.left, region.top, region.width, region.height);
        Ok(())
    }

    fn composite(&mut self, overlay: &ResolvedOverlay) -> EngineResult<()> {
        let decoded = image::load_from_memory(&overlay.bytes)
            .map_err(|e| EngineError::Decode(format!("overlay: {}", e)))?;
        let (ow, oh) = decoded.dimensions();

        let (target_width, target_height) = match (overlay.target_width, overlay.target_height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, (oh as u64 * w as u64 / ow as u64).max(1) as u32),
            (None, Some(h)) => ((ow as u64 * h as u64 / oh as u64).max(1) as u32, h),
            (None, None) => (ow, oh),
        };
        let decoded = if (target_width, target_height) != (ow, oh) {
            decoded.resize_exact(target_width.max(1), target_height.max(1), RESIZE_FILTER)
        } else {
            decoded
        };

        let mut top = decoded.to_rgba8();
        if overlay.opacity < 1.0 {
            let opacity = overlay.opacity.clamp(0.0, 1.0);
            for px in top.pixels_mut() {
                px[3] = (px[3] as f32 * opacity).round() as u8;
            }
        }

        let base_meta = self.metadata();
        let x = geometry::overlay_coordinate(base_meta.width, top.width(), overlay.position.left);
        let y = geometry::overlay_coordinate(base_meta.height, top.height(), overlay.position.top);

        let mut base = self.image.to_rgba8();
        imageops::overlay(&mut base, &top, x, y);
        self.image = DynamicImage::ImageRgba8(base);
        Ok(())
    }

    fn set_format(&mut self, format: OutputFormat) {
        self.output_format = Some(format);
    }

    fn set_format_quality(&mut self, format: OutputFormat, quality: u32) {
        self.quality.insert(format, quality.clamp(1, 100));
        self.output_format = Some(format);
    }

    fn finalize(&mut self) -> EngineResult<Bytes> {
        let format = self.resolved_format();
        let quality = format
            .and_then(|f| self.quality.get(&f).copied())
            .unwrap_or(DEFAULT_QUALITY);

        match format {
            Some(OutputFormat::Jpeg) => encode_jpeg(&self.image, quality),
            Some(OutputFormat::WebP) => encode_webp(&self.image, quality),
            Some(OutputFormat::Png) => encode_with(&self.image, ImageFormat::Png),
            Some(OutputFormat::Tiff) => encode_with(&self.image, ImageFormat::Tiff),
            Some(OutputFormat::Heif) => Err(EngineError::Unsupported(
                "heif encoding is not available".to_string(),
            )),
            // Source formats outside the output vocabulary (gif) re-encode
            // as themselves.
            None => match self.source_format {
                Some(fmt) => encode_with(&self.image, fmt),
                None => Err(EngineError::Encode(
                    "source format unknown and no output format requested".to_string(),
                )),
            },
        }
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u32) -> EngineResult<Bytes> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
    comp.set_size(width as usize, height as usize);
    comp.set_quality(quality as f32);
    comp.set_progressive_mode();
    comp.set_optimize_coding(true);

    let mut comp = comp
        .start_compress(Vec::new())
        .map_err(|e| EngineError::Encode(e.to_string()))?;
    comp.write_scanlines(&rgb)
        .map_err(|e| EngineError::Encode(e.to_string()))?;
    let data = comp
        .finish()
        .map_err(|e| EngineError::Encode(e.to_string()))?;
    Ok(Bytes::from(data))
}

fn encode_webp(image: &DynamicImage, quality: u32) -> EngineResult<Bytes> {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let encoder = webp::Encoder::from_rgba(&rgba, width, height);
    let data = encoder.encode(quality as f32);
    Ok(Bytes::copy_from_slice(&data))
}

fn encode_with(image: &DynamicImage, format: ImageFormat) -> EngineResult<Bytes> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), format)
        .map_err(|e| EngineError::Encode(e.to_string()))?;
    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelmill_core::OverlayPosition;

    fn png_bytes(width: u32, height: u32, color: Rgba<u8>) -> Bytes {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, color));
        encode_with(&img, ImageFormat::Png).unwrap()
    }

    fn open(bytes: &Bytes) -> Box<dyn ImageEngine> {
        RasterEngineProvider.open(bytes).unwrap()
    }

    #[test]
    fn test_open_reports_metadata() {
        let engine = open(&png_bytes(8, 4, Rgba([10, 20, 30, 255])));
        assert_eq!(
            engine.metadata(),
            ImageMetadata {
                width: 8,
                height: 4
            }
        );
    }

    #[test]
    fn test_resize_inside_preserves_aspect() {
        let mut engine = open(&png_bytes(100, 50, Rgba([0, 0, 0, 255])));
        engine
            .resize(&ResizeEdit {
                width: Some(40),
                height: Some(40),
                fit: Some(ResizeFit::Inside),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            engine.metadata(),
            ImageMetadata {
                width: 40,
                height: 20
            }
        );
    }

    #[test]
    fn test_resize_without_enlargement_is_a_noop() {
        let mut engine = open(&png_bytes(10, 10, Rgba([0, 0, 0, 255])));
        engine
            .resize(&ResizeEdit {
                width: Some(100),
                height: Some(100),
                without_enlargement: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            engine.metadata(),
            ImageMetadata {
                width: 10,
                height: 10
            }
        );
    }

    #[test]
    fn test_rotate_quarter_turns_swap_dimensions() {
        let mut engine = open(&png_bytes(20, 10, Rgba([0, 0, 0, 255])));
        engine.rotate(90).unwrap();
        assert_eq!(
            engine.metadata(),
            ImageMetadata {
                width: 10,
                height: 20
            }
        );
        engine.rotate(-90).unwrap();
        assert_eq!(
            engine.metadata(),
            ImageMetadata {
                width: 20,
                height: 10
            }
        );
    }

    #[test]
    fn test_rotate_arbitrary_expands_canvas() {
        let mut engine = open(&png_bytes(20, 10, Rgba([0, 0, 0, 255])));
        engine.rotate(45).unwrap();
        let meta = engine.metadata();
        assert!(meta.width > 20);
        assert!(meta.height > 10);
    }

    #[test]
    fn test_crop_rejects_out_of_bounds() {
        let mut engine = open(&png_bytes(10, 10, Rgba([0, 0, 0, 255])));
        let err = engine
            .crop(CropRegion {
                left: 5,
                top: 5,
                width: 10,
                height: 10,
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters(_)));

        engine
            .crop(CropRegion {
                left: 2,
                top: 2,
                width: 4,
                height: 4,
            })
            .unwrap();
        assert_eq!(
            engine.metadata(),
            ImageMetadata {
                width: 4,
                height: 4
            }
        );
    }

    #[test]
    fn test_flatten_blends_transparency() {
        let mut engine = open(&png_bytes(2, 2, Rgba([255, 0, 0, 0])));
        engine
            .flatten(RgbColor {
                r: 0,
                g: 255,
                b: 0,
            })
            .unwrap();
        engine.set_format(OutputFormat::Png);
        let bytes = engine.finalize().unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        // Fully transparent source pixels become the background.
        assert_eq!(decoded.get_pixel(0, 0), &Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_convolve_identity_kernel() {
        let mut engine = open(&png_bytes(3, 3, Rgba([100, 150, 200, 255])));
        engine
            .convolve(&ConvolveEdit {
                width: 3,
                height: 3,
                kernel: vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            })
            .unwrap();
        engine.set_format(OutputFormat::Png);
        let decoded = image::load_from_memory(&engine.finalize().unwrap())
            .unwrap()
            .to_rgba8();
        assert_eq!(decoded.get_pixel(1, 1), &Rgba([100, 150, 200, 255]));
    }

    #[test]
    fn test_composite_places_overlay() {
        let mut engine = open(&png_bytes(4, 4, Rgba([0, 0, 0, 255])));
        let overlay = ResolvedOverlay {
            bytes: png_bytes(2, 2, Rgba([255, 255, 255, 255])),
            target_width: None,
            target_height: None,
            opacity: 1.0,
            position: OverlayPosition::default(),
        };
        engine.composite(&overlay).unwrap();
        engine.set_format(OutputFormat::Png);
        let decoded = image::load_from_memory(&engine.finalize().unwrap())
            .unwrap()
            .to_rgba8();
        // Centered: the overlay covers the middle 2x2, corners stay black.
        assert_eq!(decoded.get_pixel(1, 1), &Rgba([255, 255, 255, 255]));
        assert_eq!(decoded.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_finalize_jpeg_and_webp_magic_bytes() {
        let source = png_bytes(4, 4, Rgba([10, 20, 30, 255]));

        let mut engine = open(&source);
        engine.set_format_quality(OutputFormat::Jpeg, 50);
        let jpeg = engine.finalize().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let mut engine = open(&source);
        engine.set_format(OutputFormat::WebP);
        let webp_bytes = engine.finalize().unwrap();
        assert_eq!(&webp_bytes[..4], b"RIFF");

        let mut engine = open(&source);
        engine.set_format(OutputFormat::Heif);
        assert!(matches!(
            engine.finalize().unwrap_err(),
            EngineError::Unsupported(_)
        ));
    }
}
