//! Coordinate Parser
//!
//! Converts the location of one finding into a [`Rect`] in the image's
//! original pixel space. The analysis service emits three encodings:
//!
//! ```text
//! "x: 295, y: 126, width: 440, height: 10"   pixel string (optionally "12.5%")
//! [y1, x1, y2, x2]                           normalized 0-1 box
//! {"x": 295, "y": 126, "width": 440}         structured object
//! ```
//!
//! Parsing never fails: malformed numbers become `0`, unknown shapes become
//! the zero rect.

use serde_json::Value;

use super::types::{ImageDimensions, Rect};

/// Location encodings accepted from the analysis service
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateInput<'a> {
    /// `"x: N, y: N, width: N, height: N"`
    Text(&'a str),
    /// `[y1, x1, y2, x2]` as fractions of the image
    Normalized([f64; 4]),
    /// `{x, y, width?, height?}` in pixels
    Object {
        x: f64,
        y: f64,
        width: Option<f64>,
        height: Option<f64>,
    },
    /// Absent, null, or any other shape
    Missing,
}

impl<'a> CoordinateInput<'a> {
    pub fn detect(value: Option<&'a Value>) -> Self {
        match value {
            Some(Value::String(text)) => CoordinateInput::Text(text),
            Some(Value::Array(items)) if items.len() == 4 => {
                let mut bbox = [0.0; 4];
                for (slot, item) in bbox.iter_mut().zip(items) {
                    *slot = coerce_number(item);
                }
                CoordinateInput::Normalized(bbox)
            }
            Some(Value::Object(map)) => CoordinateInput::Object {
                x: map.get("x").map(coerce_number).unwrap_or(0.0),
                y: map.get("y").map(coerce_number).unwrap_or(0.0),
                width: map.get("width").filter(|v| !v.is_null()).map(coerce_number),
                height: map.get("height").filter(|v| !v.is_null()).map(coerce_number),
            },
            _ => CoordinateInput::Missing,
        }
    }
}

/// Parse a coordinate value against the image's original dimensions.
///
/// When `dims` is unknown, percentages and normalized boxes are resolved
/// against [`ImageDimensions::FALLBACK`].
pub fn parse_coordinates(value: Option<&Value>, dims: Option<ImageDimensions>) -> Rect {
    let frame = dims
        .filter(ImageDimensions::is_valid)
        .unwrap_or(ImageDimensions::FALLBACK);

    let rect = match CoordinateInput::detect(value) {
        CoordinateInput::Text(text) => parse_text(text, frame),
        CoordinateInput::Normalized(bbox) => from_normalized(bbox, frame),
        CoordinateInput::Object {
            x,
            y,
            width,
            height,
        } => Rect {
            x,
            y,
            width,
            height,
        },
        CoordinateInput::Missing => Rect::zero(),
    };

    rect.sanitized()
}

fn parse_text(text: &str, frame: ImageDimensions) -> Rect {
    let mut rect = Rect {
        x: 0.0,
        y: 0.0,
        width: None,
        height: None,
    };

    for part in text.split(',') {
        let Some((key, raw)) = part.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let raw = raw.trim();

        let value = match raw.strip_suffix('%') {
            Some(percent) => {
                let fraction = parse_number(percent) / 100.0;
                match key.as_str() {
                    "x" | "width" => fraction * frame.width as f64,
                    "y" | "height" => fraction * frame.height as f64,
                    _ => continue,
                }
            }
            None => parse_number(raw),
        };

        match key.as_str() {
            "x" => rect.x = value,
            "y" => rect.y = value,
            "width" => rect.width = Some(value),
            "height" => rect.height = Some(value),
            _ => {}
        }
    }

    rect
}

fn from_normalized([y1, x1, y2, x2]: [f64; 4], frame: ImageDimensions) -> Rect {
    let (w, h) = (frame.width as f64, frame.height as f64);
    Rect {
        x: x1 * w,
        y: y1 * h,
        width: Some((x2 - x1) * w),
        height: Some((y2 - y1) * h),
    }
}

/// Lenient numeric coercion: numbers pass through, numeric strings are
/// parsed, everything else (and any non-finite result) is `0`.
pub(crate) fn coerce_number(value: &Value) -> f64 {
    let number = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_number(s),
        _ => 0.0,
    };
    if number.is_finite() {
        number
    } else {
        0.0
    }
}

/// Parse the leading numeric portion of a string (`"12px"` -> 12)
fn parse_number(text: &str) -> f64 {
    let text = text.trim();
    let end = text
        .char_indices()
        .find(|&(i, c)| {
            !(c.is_ascii_digit() || c == '.' || ((c == '-' || c == '+') && i == 0))
        })
        .map(|(i, _)| i)
        .unwrap_or(text.len());

    text[..end]
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_rect(rect: Rect, x: f64, y: f64, width: f64, height: f64) {
        let close = |a: f64, b: f64| (a - b).abs() < 1e-6;
        assert!(close(rect.x, x), "x: {} != {}", rect.x, x);
        assert!(close(rect.y, y), "y: {} != {}", rect.y, y);
        assert!(close(rect.width.unwrap(), width), "width: {:?} != {}", rect.width, width);
        assert!(close(rect.height.unwrap(), height), "height: {:?} != {}", rect.height, height);
    }

    #[test]
    fn test_parse_pixel_string() {
        let value = json!("x: 100, y: 50, width: 40, height: 20");
        assert_rect(parse_coordinates(Some(&value), None), 100.0, 50.0, 40.0, 20.0);
    }

    #[test]
    fn test_parse_reordered_string_without_size() {
        let value = json!("y: 7,x: 3");
        let rect = parse_coordinates(Some(&value), None);
        assert_eq!(rect.x, 3.0);
        assert_eq!(rect.y, 7.0);
        assert!(rect.is_point());
    }

    #[test]
    fn test_parse_percent_string() {
        let dims = Some(ImageDimensions::new(1000, 500));
        let value = json!("x: 10%, y: 20%, width: 50%, height: 5%");
        assert_rect(parse_coordinates(Some(&value), dims), 100.0, 100.0, 500.0, 25.0);
    }

    #[test]
    fn test_parse_malformed_numbers_become_zero() {
        let value = json!("x: abc, y: , width: 12px, height: NaN");
        let rect = parse_coordinates(Some(&value), None);
        assert_eq!(rect.x, 0.0);
        assert_eq!(rect.y, 0.0);
        assert_eq!(rect.width, Some(12.0));
        assert_eq!(rect.height, Some(0.0));
    }

    #[test]
    fn test_parse_normalized_box() {
        let dims = Some(ImageDimensions::new(1000, 500));
        let value = json!([0.1, 0.2, 0.3, 0.6]);
        assert_rect(parse_coordinates(Some(&value), dims), 200.0, 50.0, 400.0, 100.0);
    }

    #[test]
    fn test_parse_normalized_box_without_dimensions_uses_fallback() {
        let value = json!([0.0, 0.0, 0.5, 0.5]);
        assert_rect(parse_coordinates(Some(&value), None), 0.0, 0.0, 960.0, 540.0);
    }

    #[test]
    fn test_parse_object() {
        let value = json!({"x": 100, "y": "50", "width": 40.0, "height": 20});
        assert_rect(parse_coordinates(Some(&value), None), 100.0, 50.0, 40.0, 20.0);

        let point = json!({"x": 5, "y": 6});
        assert!(parse_coordinates(Some(&point), None).is_point());
    }

    #[test]
    fn test_all_encodings_agree() {
        let dims = Some(ImageDimensions::new(1000, 500));
        let text = json!("x: 100, y: 50, width: 40, height: 20");
        let object = json!({"x": 100, "y": 50, "width": 40, "height": 20});
        let normalized = json!([0.1, 0.1, 0.14, 0.14]);

        for value in [text, object, normalized] {
            assert_rect(parse_coordinates(Some(&value), dims), 100.0, 50.0, 40.0, 20.0);
        }
    }

    #[test]
    fn test_unknown_shapes_yield_zero_rect() {
        assert_eq!(parse_coordinates(None, None), Rect::zero());
        assert_eq!(parse_coordinates(Some(&Value::Null), None), Rect::zero());
        assert_eq!(parse_coordinates(Some(&json!([1, 2, 3])), None), Rect::zero());
        assert_eq!(parse_coordinates(Some(&json!(42)), None), Rect::zero());
    }

    #[test]
    fn test_inverted_normalized_box_clamps_to_zero() {
        let dims = Some(ImageDimensions::new(100, 100));
        let rect = parse_coordinates(Some(&json!([0.5, 0.5, 0.2, 0.2])), dims);
        assert_eq!(rect.width, Some(0.0));
        assert_eq!(rect.height, Some(0.0));
    }
}
