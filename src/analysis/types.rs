//! Analysis Types
//!
//! Canonical shapes produced by response normalization and coordinate
//! parsing, plus the error taxonomy of the analysis pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of error categories understood by the overlay
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Category {
    Spelling,
    Grammatical,
    Space,
    Context,
    Suggestions,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Spelling,
        Category::Grammatical,
        Category::Space,
        Category::Context,
        Category::Suggestions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Spelling => "spelling",
            Category::Grammatical => "grammatical",
            Category::Space => "space",
            Category::Context => "context",
            Category::Suggestions => "suggestions",
        }
    }

    /// Human-readable label shown next to an overlay box
    pub fn label(&self) -> &'static str {
        match self {
            Category::Spelling => "Spelling",
            Category::Grammatical => "Grammar",
            Category::Space => "Spacing",
            Category::Context => "Context",
            Category::Suggestions => "Suggestion",
        }
    }
}

/// Pixel dimensions of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    /// Degraded-mode frame used when no dimensions are known
    pub const FALLBACK: ImageDimensions = ImageDimensions {
        width: 1920,
        height: 1080,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Build from possibly-missing database columns; zero or negative means unknown
    pub fn from_columns(width: Option<i64>, height: Option<i64>) -> Option<Self> {
        match (width, height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => {
                Some(Self::new(u32::try_from(w).ok()?, u32::try_from(h).ok()?))
            }
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    fn differs_from(&self, other: &ImageDimensions, tolerance: f64) -> bool {
        let rel = |a: u32, b: u32| (a as f64 - b as f64).abs() / (b.max(1) as f64);
        rel(self.width, other.width) > tolerance || rel(self.height, other.height) > tolerance
    }
}

/// Pick the frame coordinates are expressed in.
///
/// Dimensions reported by the analysis service win: they describe the frame
/// the service measured its boxes in. Decoded (natural) dimensions are the
/// fallback. A disagreement of more than 1% on either axis is logged.
pub fn reconcile_dimensions(
    reported: Option<ImageDimensions>,
    natural: Option<ImageDimensions>,
) -> Option<ImageDimensions> {
    let reported = reported.filter(ImageDimensions::is_valid);
    let natural = natural.filter(ImageDimensions::is_valid);

    match (reported, natural) {
        (Some(reported), Some(natural)) => {
            if reported.differs_from(&natural, 0.01) {
                tracing::warn!(
                    reported_width = reported.width,
                    reported_height = reported.height,
                    natural_width = natural.width,
                    natural_height = natural.height,
                    "Service-reported image dimensions disagree with decoded dimensions; using reported"
                );
            }
            Some(reported)
        }
        (reported, natural) => reported.or(natural),
    }
}

/// Rectangle in the original pixel space of an image.
///
/// `width`/`height` are `None` for point findings that carry no box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl Rect {
    pub fn zero() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: Some(0.0),
            height: Some(0.0),
        }
    }

    pub fn is_point(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }

    /// Clamp to the non-negative, finite domain
    pub fn sanitized(self) -> Self {
        let clamp = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
        Self {
            x: clamp(self.x),
            y: clamp(self.y),
            width: self.width.map(clamp),
            height: self.height.map(clamp),
        }
    }
}

/// One entry of the service's error list, before canonicalization
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawErrorRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_description: Option<String>,
    #[serde(rename = "Coordinates", skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Value>,
}

/// Canonical normalizer output
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedResponse {
    #[serde(rename = "errorsAndCorrections")]
    pub errors: Vec<RawErrorRecord>,
    #[serde(rename = "image_dimensions", skip_serializing_if = "Option::is_none")]
    pub image_dimensions: Option<ImageDimensions>,
}

/// Canonical error record ready to be persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewDetectedError {
    pub image_id: String,
    pub category: Category,
    pub original_text: Option<String>,
    pub corrected_text: Option<String>,
    pub description: Option<String>,
    pub rect: Rect,
    /// Frame `rect` was parsed against
    pub frame: ImageDimensions,
}

/// Analysis pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Webhook request failed: {0}")]
    Transport(String),

    #[error("Webhook request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Webhook returned HTTP {status}")]
    HttpStatus { status: u16, body: String },

    #[error("Webhook response is not valid JSON: {reason}")]
    InvalidJson { reason: String, body: String },

    #[error("Unrecognized response payload: {0}")]
    ParseFailure(String),
}

impl AnalysisError {
    /// Upstream body carried by the error, kept for audit
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            AnalysisError::HttpStatus { body, .. } | AnalysisError::InvalidJson { body, .. } => {
                Some(body.as_str())
            }
            _ => None,
        }
    }
}
