//! Overlay Projector
//!
//! Maps finding rectangles from the image's original pixel space into the
//! space the image is currently displayed at.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::analysis::Rect;

/// Smallest box edge, in display pixels
pub const MIN_BOX_SIZE: f64 = 3.0;

/// Displayed and original sizes of one image
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DisplayGeometry {
    pub displayed_width: f64,
    pub displayed_height: f64,
    pub original_width: f64,
    pub original_height: f64,
}

impl DisplayGeometry {
    /// Both sizes known, finite and non-zero
    pub fn is_ready(&self) -> bool {
        [
            self.displayed_width,
            self.displayed_height,
            self.original_width,
            self.original_height,
        ]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0)
    }
}

/// Rectangle in display pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    /// The finding had no box and is drawn as a marker
    pub point: bool,
}

/// Projection result; `Hidden` until the layout is known
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Hidden,
    Visible(ScreenRect),
}

impl Projection {
    pub fn is_visible(&self) -> bool {
        matches!(self, Projection::Visible(_))
    }

    pub fn rect(&self) -> Option<&ScreenRect> {
        match self {
            Projection::Visible(rect) => Some(rect),
            Projection::Hidden => None,
        }
    }
}

impl Serialize for Projection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Projection::Hidden => {
                let mut state = serializer.serialize_struct("Projection", 1)?;
                state.serialize_field("visible", &false)?;
                state.end()
            }
            Projection::Visible(rect) => {
                let mut state = serializer.serialize_struct("Projection", 6)?;
                state.serialize_field("visible", &true)?;
                state.serialize_field("left", &rect.left)?;
                state.serialize_field("top", &rect.top)?;
                state.serialize_field("width", &rect.width)?;
                state.serialize_field("height", &rect.height)?;
                state.serialize_field("point", &rect.point)?;
                state.end()
            }
        }
    }
}

/// Project `rect` into display space.
///
/// The result always lies inside `[0, displayed_width] x [0, displayed_height]`.
pub fn project(rect: &Rect, geom: &DisplayGeometry) -> Projection {
    if !geom.is_ready() {
        return Projection::Hidden;
    }

    let scale_x = geom.displayed_width / geom.original_width;
    let scale_y = geom.displayed_height / geom.original_height;
    let rect = rect.sanitized();

    let sized = |extent: Option<f64>, scale: f64, limit: f64| {
        (extent.unwrap_or(0.0) * scale).max(MIN_BOX_SIZE).min(limit)
    };
    let width = sized(rect.width, scale_x, geom.displayed_width);
    let height = sized(rect.height, scale_y, geom.displayed_height);

    let left = (rect.x * scale_x).clamp(0.0, geom.displayed_width - width);
    let top = (rect.y * scale_y).clamp(0.0, geom.displayed_height - height);

    Projection::Visible(ScreenRect {
        left,
        top,
        width,
        height,
        point: rect.is_point(),
    })
}
