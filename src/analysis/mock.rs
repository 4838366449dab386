//! Mock analysis
//!
//! A fixed set of five findings, one per category, substituted when the real
//! analysis is unavailable so every upload still ends in a displayable state.

use serde_json::{json, Value};

use super::coordinates::parse_coordinates;
use super::types::{Category, ImageDimensions, NewDetectedError};

pub struct MockFinding {
    pub category: Category,
    pub original_text: &'static str,
    pub corrected_text: &'static str,
    pub description: &'static str,
    /// Box as percentages of the image
    pub coordinates: &'static str,
}

pub const MOCK_FINDINGS: [MockFinding; 5] = [
    MockFinding {
        category: Category::Spelling,
        original_text: "recieve",
        corrected_text: "receive",
        description: "Common spelling mistake: \"i before e except after c\"",
        coordinates: "x: 25%, y: 30%, width: 12%, height: 4%",
    },
    MockFinding {
        category: Category::Grammatical,
        original_text: "They was going",
        corrected_text: "They were going",
        description: "Subject-verb agreement error",
        coordinates: "x: 45%, y: 50%, width: 20%, height: 4%",
    },
    MockFinding {
        category: Category::Space,
        original_text: "alot",
        corrected_text: "a lot",
        description: "Missing space between words",
        coordinates: "x: 65%, y: 40%, width: 8%, height: 4%",
    },
    MockFinding {
        category: Category::Context,
        original_text: "their",
        corrected_text: "there",
        description: "Incorrect word usage in context",
        coordinates: "x: 35%, y: 70%, width: 8%, height: 4%",
    },
    MockFinding {
        category: Category::Suggestions,
        original_text: "good",
        corrected_text: "excellent",
        description: "Consider using a stronger word for emphasis",
        coordinates: "x: 55%, y: 60%, width: 8%, height: 4%",
    },
];

/// Canonical records for the mock set, placed against `dims`
pub fn mock_records(image_id: &str, frame: ImageDimensions) -> Vec<NewDetectedError> {
    MOCK_FINDINGS
        .iter()
        .map(|finding| NewDetectedError {
            image_id: image_id.to_string(),
            category: finding.category,
            original_text: Some(finding.original_text.to_string()),
            corrected_text: Some(finding.corrected_text.to_string()),
            description: Some(finding.description.to_string()),
            rect: parse_coordinates(Some(&Value::from(finding.coordinates)), Some(frame)),
            frame,
        })
        .collect()
}

/// Raw-response payload stored alongside mock results
pub fn mock_payload(reason: &str, upstream: Option<Value>) -> Value {
    let mut payload = json!({
        "mock": true,
        "message": "Mock analysis completed",
        "reason": reason,
    });
    if let Some(upstream) = upstream {
        payload["upstream"] = upstream;
    }
    payload
}
