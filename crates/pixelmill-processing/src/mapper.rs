//! Filter translation
//!
//! Each filter token is a pure transform over the cumulative `EditMap`.
//! Unsupported filter names and malformed arguments never fail the request:
//! the grammar is an open superset and silence keeps old URLs working as
//! the vocabulary evolves. Skipped tokens are logged at debug level.

use pixelmill_core::{
    ConvolveEdit, Edit, EditKey, EditMap, FlattenEdit, OutputFormat, OverlayPosition, OverlaySpec,
    PositionToken, ResizeFit, RgbColor, TintColor,
};

use crate::path::{FilterToken, ParsedPath};

/// Translate a parsed path into the canonical edit map.
pub fn map_path(parsed: &ParsedPath) -> EditMap {
    let mut edits = EditMap::new();

    if let Some((width, height)) = parsed.resize {
        // A zero axis means "unspecified, preserve aspect".
        let resize = edits.resize_mut();
        if width > 0 {
            resize.width = Some(width);
        }
        if height > 0 {
            resize.height = Some(height);
        }
        if parsed.sizing_method.as_deref() == Some("fit-in") {
            resize.fit = Some(ResizeFit::Inside);
        }
    }

    for token in &parsed.tokens {
        map_filter(
            &mut edits,
            token,
            parsed.requested_format,
            parsed.sizing_method.as_deref(),
        );
    }

    edits
}

/// Apply one filter token to the edit map.
///
/// `requested_format` is the file extension of the image key; the quality
/// filter binds to it. `sizing_method` is consulted by stretch, which must
/// not force `fit=fill` when the path carried an explicit `fit-in`.
pub fn map_filter(
    edits: &mut EditMap,
    token: &FilterToken,
    requested_format: Option<OutputFormat>,
    sizing_method: Option<&str>,
) {
    let applied = match token.name.as_str() {
        "autojpg" => {
            edits.insert(Edit::ToFormat(OutputFormat::Jpeg));
            true
        }
        "background_color" => match token.args.first().and_then(|hex| RgbColor::from_hex(hex)) {
            Some(background) => {
                edits.insert(Edit::Flatten(FlattenEdit { background }));
                true
            }
            None => false,
        },
        "blur" => {
            let radius = token.args.first().and_then(|a| a.parse::<f32>().ok());
            let sigma = token.args.get(1).and_then(|a| a.parse::<f32>().ok());
            match (radius, sigma) {
                (_, Some(sigma)) => {
                    edits.insert(Edit::Blur(sigma));
                    true
                }
                (Some(radius), None) => {
                    edits.insert(Edit::Blur(radius / 2.0));
                    true
                }
                _ => false,
            }
        }
        "convolution" => match parse_convolution(&token.args) {
            Some(convolve) => {
                edits.insert(Edit::Convolve(convolve));
                true
            }
            None => false,
        },
        "equalize" => {
            edits.insert(Edit::Normalize);
            true
        }
        "fill" => match token.args.first().and_then(|hex| RgbColor::from_hex(hex)) {
            Some(color) => {
                edits.resize_mut().background = Some(color);
                true
            }
            None => false,
        },
        "format" => match token.args.first().and_then(|f| OutputFormat::parse(f)) {
            Some(format) => {
                edits.insert(Edit::ToFormat(format));
                true
            }
            None => false,
        },
        "grayscale" | "greyscale" => {
            edits.insert(Edit::Grayscale(true));
            true
        }
        "no_upscale" => {
            edits.resize_mut().without_enlargement = Some(true);
            true
        }
        "proportion" => match token.args.first().and_then(|a| a.parse::<f64>().ok()) {
            Some(ratio) => {
                // Only scales dimensions that already exist; a proportion
                // with nothing to scale is meaningless.
                let has_dimensions = matches!(
                    edits.get(EditKey::Resize),
                    Some(Edit::Resize(r)) if r.width.is_some() || r.height.is_some()
                );
                if has_dimensions {
                    let resize = edits.resize_mut();
                    if let Some(width) = resize.width {
                        resize.width = Some((width as f64 * ratio).round() as u32);
                    }
                    if let Some(height) = resize.height {
                        resize.height = Some((height as f64 * ratio).round() as u32);
                    }
                }
                has_dimensions
            }
            None => false,
        },
        "quality" => {
            let quality = token.args.first().and_then(|a| a.parse::<u32>().ok());
            match (quality, requested_format) {
                (Some(quality), Some(format)) => {
                    edits.insert(Edit::FormatOptions { format, quality });
                    true
                }
                _ => false,
            }
        }
        "rgb" => {
            let channels: Vec<f32> = token
                .args
                .iter()
                .filter_map(|a| a.parse::<f32>().ok())
                .collect();
            match channels.as_slice() {
                [r, g, b] => {
                    edits.insert(Edit::Tint(TintColor {
                        r: r * 2.55,
                        g: g * 2.55,
                        b: b * 2.55,
                    }));
                    true
                }
                _ => false,
            }
        }
        "rotate" => match token.args.first().and_then(|a| a.parse::<i32>().ok()) {
            Some(degrees) => {
                edits.insert(Edit::Rotate(degrees));
                true
            }
            None => false,
        },
        "sharpen" => match token.args.get(1).and_then(|a| a.parse::<f32>().ok()) {
            Some(radius) => {
                edits.insert(Edit::Sharpen(1.0 + radius / 2.0));
                true
            }
            None => false,
        },
        "stretch" => {
            // An explicit fit-in in the path wins over stretch; the two
            // directives contradict and fit-in is the more specific one.
            if sizing_method != Some("fit-in") {
                edits.resize_mut().fit = Some(ResizeFit::Fill);
            }
            true
        }
        "strip_exif" | "strip_icc" => {
            // A zero-degree rotate forces a re-encode, which drops the
            // metadata downstream.
            edits.insert(Edit::Rotate(0));
            true
        }
        "upscale" => {
            edits.resize_mut().fit = Some(ResizeFit::Inside);
            true
        }
        "watermark" => match parse_watermark(&token.args) {
            Some(spec) => {
                edits.insert(Edit::OverlayWith(spec));
                true
            }
            None => false,
        },
        _ => false,
    };

    if !applied {
        skip(token, "unsupported filter or malformed arguments");
    }
}

fn skip(token: &FilterToken, reason: &str) {
    tracing::debug!(filter = %token.name, reason = %reason, "skipping filter token");
}

/// `convolution(kernel;...,order,normalize)`: the kernel must contain
/// exactly order² values. The normalize flag is carried by the kernel sum
/// at execution time, so it does not change the mapped edit.
fn parse_convolution(args: &[String]) -> Option<ConvolveEdit> {
    let kernel: Vec<f32> = args
        .first()?
        .split(';')
        .map(|v| v.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .ok()?;
    let order: u32 = args.get(1)?.parse().ok()?;
    if kernel.len() != (order * order) as usize {
        return None;
    }
    Some(ConvolveEdit {
        width: order,
        height: order,
        kernel,
    })
}

/// `watermark(bucket,key,left,top,alpha[,wRatio,hRatio])`. Position tokens
/// are validated independently per axis; a bad token simply drops that
/// axis back to centered placement.
fn parse_watermark(args: &[String]) -> Option<OverlaySpec> {
    let bucket = args.first()?.clone();
    let key = args.get(1)?.clone();
    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    Some(OverlaySpec {
        bucket,
        key,
        alpha: args.get(4).and_then(|a| a.parse().ok()),
        width_ratio: args.get(5).and_then(|a| a.parse().ok()),
        height_ratio: args.get(6).and_then(|a| a.parse().ok()),
        position: OverlayPosition {
            left: args.get(2).and_then(|t| PositionToken::parse(t)),
            top: args.get(3).and_then(|t| PositionToken::parse(t)),
        },
    })
}
