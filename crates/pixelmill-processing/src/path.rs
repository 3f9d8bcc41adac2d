//! Path grammar parser
//!
//! Requests arrive as slash-separated paths mixing resize primitives and
//! `filters:name(args)` segments, e.g.
//! `/fit-in/200x300/filters:grayscale()/photos/cat.jpg`. The last segment
//! is the image key; its extension decides the format that type-dependent
//! filters (quality) bind to.
//!
//! Deployments migrating from an older syntax can configure a single regex
//! rewrite that runs before tokenizing (`filters-` to `filters:` being the
//! canonical example). The rewrite pattern and substitution must be
//! configured together.

use pixelmill_core::{OutputFormat, PipelineError, PipelineResult};
use regex::Regex;

/// One `name(arg1,arg2,...)` unit from the path grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterToken {
    pub name: String,
    pub args: Vec<String>,
}

/// The decomposed request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    pub tokens: Vec<FilterToken>,
    pub image_key: String,
    pub requested_format: Option<OutputFormat>,
    /// A `WxH` segment, when present.
    pub resize: Option<(u32, u32)>,
    /// Sizing directive preceding the dimensions (`fit-in`), consulted by
    /// the stretch filter.
    pub sizing_method: Option<String>,
}

/// Apply the configured legacy rewrite to a raw path.
///
/// Both halves of the rewrite pair are required; a half-configured rewrite
/// is a deployment error, not something to paper over.
pub fn rewrite_legacy_path(
    raw_path: &str,
    rewrite_match: Option<&str>,
    rewrite_subst: Option<&str>,
) -> PipelineResult<String> {
    let (pattern, subst) = match (rewrite_match, rewrite_subst) {
        (Some(pattern), Some(subst)) => (pattern, subst),
        _ => {
            return Err(PipelineError::parsing(
                "rewrite match pattern and substitution must both be configured",
            ))
        }
    };

    let regex = Regex::new(&normalize_pattern(pattern))
        .map_err(|e| PipelineError::parsing(format!("invalid rewrite pattern: {}", e)))?;
    Ok(regex.replace_all(raw_path, subst).into_owned())
}

/// Accept both a plain regex and a `/pattern/flags` literal, the form the
/// configuration historically carried.
fn normalize_pattern(pattern: &str) -> String {
    if let Some(rest) = pattern.strip_prefix('/') {
        if let Some(end) = rest.rfind('/') {
            let (inner, flags) = rest.split_at(end);
            if flags[1..].contains('i') {
                return format!("(?i){}", inner);
            }
            return inner.to_string();
        }
    }
    pattern.to_string()
}

/// Split a request path into filter tokens, resize primitives and the
/// image key.
pub fn parse_path(raw_path: &str) -> PipelineResult<ParsedPath> {
    let segments: Vec<&str> = raw_path.split('/').filter(|s| !s.is_empty()).collect();
    let image_key = match segments.last() {
        Some(last) => (*last).to_string(),
        None => return Err(PipelineError::parsing("request path is empty")),
    };

    let requested_format = image_key
        .rsplit_once('.')
        .and_then(|(_, ext)| OutputFormat::from_extension(ext));

    let mut parsed = ParsedPath {
        tokens: Vec::new(),
        image_key,
        requested_format,
        resize: None,
        sizing_method: None,
    };

    for segment in &segments[..segments.len() - 1] {
        if *segment == "fit-in" {
            parsed.sizing_method = Some("fit-in".to_string());
        } else if let Some(dims) = parse_dimensions(segment) {
            parsed.resize = Some(dims);
        } else if let Some(rest) = segment.strip_prefix("filters:") {
            for raw_token in split_filter_chain(rest) {
                if let Some(token) = parse_filter_token(raw_token) {
                    parsed.tokens.push(token);
                } else {
                    tracing::debug!(segment = %raw_token, "malformed filter segment, skipping");
                }
            }
        }
        // Anything else is an unrecognized path segment; the grammar is an
        // open superset, so it is ignored.
    }

    Ok(parsed)
}

fn parse_dimensions(segment: &str) -> Option<(u32, u32)> {
    let (w, h) = segment.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

/// Filters can chain inside one segment (`filters:a():b()`); split on the
/// colons between them, never on characters inside an argument list.
fn split_filter_chain(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = (depth - 1).max(0),
            ':' if depth == 0 => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

/// Parse `name(arg1,arg2,...)`. Argument splitting happens on top-level
/// commas only, so a semicolon-delimited kernel argument stays intact.
fn parse_filter_token(raw: &str) -> Option<FilterToken> {
    let open = raw.find('(')?;
    let inner = raw[open..].strip_prefix('(')?.strip_suffix(')')?;
    let name = raw[..open].to_string();
    if name.is_empty() {
        return None;
    }
    let args = if inner.is_empty() {
        Vec::new()
    } else {
        inner.split(',').map(|a| a.trim().to_string()).collect()
    };
    Some(FilterToken { name, args })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fit_in_with_filters() {
        let parsed = parse_path("/fit-in/200x300/filters:grayscale()/test-image-001.jpg").unwrap();
        assert_eq!(parsed.sizing_method.as_deref(), Some("fit-in"));
        assert_eq!(parsed.resize, Some((200, 300)));
        assert_eq!(parsed.image_key, "test-image-001.jpg");
        assert_eq!(parsed.requested_format, Some(OutputFormat::Jpeg));
        assert_eq!(
            parsed.tokens,
            vec![FilterToken {
                name: "grayscale".to_string(),
                args: vec![],
            }]
        );
    }

    #[test]
    fn test_parse_preserves_filter_order_and_args() {
        let parsed =
            parse_path("/filters:rotate(90)/filters:watermark(bucket,key,100,100,0)/img.png")
                .unwrap();
        assert_eq!(parsed.tokens.len(), 2);
        assert_eq!(parsed.tokens[0].name, "rotate");
        assert_eq!(parsed.tokens[0].args, vec!["90"]);
        assert_eq!(parsed.tokens[1].name, "watermark");
        assert_eq!(
            parsed.tokens[1].args,
            vec!["bucket", "key", "100", "100", "0"]
        );
        assert_eq!(parsed.requested_format, Some(OutputFormat::Png));
    }

    #[test]
    fn test_kernel_argument_is_not_split_on_semicolons() {
        let parsed = parse_path("/filters:convolution(1;2;1;2;4;2;1;2;1,3,true)/img.jpg").unwrap();
        assert_eq!(
            parsed.tokens[0].args,
            vec!["1;2;1;2;4;2;1;2;1", "3", "true"]
        );
    }

    #[test]
    fn test_chained_filters_in_one_segment() {
        let parsed = parse_path("/filters:rotate(90):grayscale()/img.jpg").unwrap();
        let names: Vec<_> = parsed.tokens.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["rotate", "grayscale"]);
    }

    #[test]
    fn test_empty_path_is_a_parsing_error() {
        assert!(matches!(
            parse_path("").unwrap_err(),
            PipelineError::Parsing(_)
        ));
        assert!(matches!(
            parse_path("/").unwrap_err(),
            PipelineError::Parsing(_)
        ));
    }

    #[test]
    fn test_unknown_extension_has_no_requested_format() {
        let parsed = parse_path("/filters:quality(50)/file.xml").unwrap();
        assert_eq!(parsed.requested_format, None);
    }

    #[test]
    fn test_legacy_rewrite() {
        let rewritten = rewrite_legacy_path(
            "/filters-rotate(90)/filters-grayscale()/thumbor-image.jpg",
            Some("(filters-)"),
            Some("filters:"),
        )
        .unwrap();
        assert_eq!(
            rewritten,
            "/filters:rotate(90)/filters:grayscale()/thumbor-image.jpg"
        );
    }

    #[test]
    fn test_legacy_rewrite_accepts_regex_literal_form() {
        let rewritten = rewrite_legacy_path(
            "/filters-rotate(90)/img.jpg",
            Some("/(filters-)/gm"),
            Some("filters:"),
        )
        .unwrap();
        assert_eq!(rewritten, "/filters:rotate(90)/img.jpg");
    }

    #[test]
    fn test_legacy_rewrite_requires_both_parameters() {
        let err =
            rewrite_legacy_path("/filters-rotate(90)/img.jpg", Some("(filters-)"), None)
                .unwrap_err();
        assert!(matches!(err, PipelineError::Parsing(_)));

        let err = rewrite_legacy_path("/filters-rotate(90)/img.jpg", None, None).unwrap_err();
        assert!(matches!(err, PipelineError::Parsing(_)));
    }
}
