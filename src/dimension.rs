//! CSS dimension normalization.
//!
//! Width and height attributes arrive in every shape authors can think of.
//! [`sanitize_dimension`] turns them into a non-negative pixel count or
//! nothing at all; it never fails.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::format_number;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Width,
    Height,
}

impl Axis {
    pub fn attribute(self) -> &'static str {
        match self {
            Axis::Width => "width",
            Axis::Height => "height",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DimensionInput<'a> {
    Null,
    Number(f64),
    Text(&'a str),
}

impl From<f64> for DimensionInput<'_> {
    fn from(n: f64) -> Self {
        DimensionInput::Number(n)
    }
}

impl From<i64> for DimensionInput<'_> {
    fn from(n: i64) -> Self {
        DimensionInput::Number(n as f64)
    }
}

impl<'a> From<&'a str> for DimensionInput<'a> {
    fn from(s: &'a str) -> Self {
        DimensionInput::Text(s)
    }
}

impl<'a> From<Option<&'a str>> for DimensionInput<'a> {
    fn from(value: Option<&'a str>) -> Self {
        value.map_or(DimensionInput::Null, DimensionInput::Text)
    }
}

fn numeric_regex() -> &'static Regex {
    static NUMERIC_REGEX: OnceLock<Regex> = OnceLock::new();
    NUMERIC_REGEX.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").unwrap()
    })
}

/// Absolute value of the leading integer, `0` when there is none.
fn leading_absint(value: &str) -> u64 {
    static LEADING_INT_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = LEADING_INT_REGEX.get_or_init(|| Regex::new(r"^\s*[+-]?(\d+)").unwrap());
    re.captures(value)
        .and_then(|c| c[1].parse::<u64>().ok())
        .unwrap_or(0)
}

/// Normalize a width/height value to pixels.
///
/// - null → `None`
/// - number or numeric string → `max(0, value)`
/// - `"NNpx"` → absolute integer magnitude
/// - `"NN%"` on the width axis with `content_max_width` set →
///   `round(NN / 100 × content_max_width)`
/// - anything else → `None`
pub fn sanitize_dimension<'a>(
    value: impl Into<DimensionInput<'a>>,
    axis: Axis,
    content_max_width: Option<f64>,
) -> Option<f64> {
    match value.into() {
        DimensionInput::Null => None,
        DimensionInput::Number(n) => non_negative(n),
        DimensionInput::Text(raw) => {
            let text = raw.trim();
            if numeric_regex().is_match(text) {
                return text.parse::<f64>().ok().and_then(non_negative);
            }
            if text.ends_with("px") {
                return Some(leading_absint(text) as f64);
            }
            if text.ends_with('%') && axis == Axis::Width {
                let max_width = content_max_width?;
                let percentage = leading_absint(text) as f64 / 100.0;
                return Some((percentage * max_width).round());
            }
            None
        }
    }
}

fn non_negative(n: f64) -> Option<f64> {
    if n.is_finite() {
        Some(n.max(0.0))
    } else {
        None
    }
}

/// Render a sanitized dimension as an attribute value.
pub fn format_dimension(value: f64) -> String {
    format_number(value)
}
