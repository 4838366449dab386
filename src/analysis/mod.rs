//! Analysis pipeline
//!
//! Posts uploaded images to the external analysis webhook and turns its
//! replies into canonical, persisted findings.

mod category;
mod coordinates;
mod mock;
mod normalizer;
mod submitter;
mod types;
mod webhook;

pub use category::map_category;
pub use coordinates::{parse_coordinates, CoordinateInput};
pub use mock::{mock_payload, mock_records, MockFinding, MOCK_FINDINGS};
pub use normalizer::{normalize, ResponseShape};
pub use submitter::{build_records, AnalysisOutcome, AnalysisSubmitter};
pub use types::*;
pub use webhook::{AnalysisWebhook, ImageUpload, N8nWebhook};

#[cfg(test)]
pub use webhook::MockWebhook;
