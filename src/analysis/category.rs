//! Error type mapping
//!
//! The analysis service labels findings with a free-form vocabulary
//! ("Punctuation/Grammar", "Spacing", "Consistency", ...). Those labels are
//! folded onto the closed [`Category`] set here.

use super::types::Category;

/// Known external labels, compared after trimming and lowercasing
const CATEGORY_TABLE: &[(&str, Category)] = &[
    ("spelling", Category::Spelling),
    ("typo", Category::Spelling),
    ("misspelling", Category::Spelling),
    ("grammar", Category::Grammatical),
    ("grammatical", Category::Grammatical),
    ("punctuation", Category::Grammatical),
    ("punctuation/grammar", Category::Grammatical),
    ("grammar/punctuation", Category::Grammatical),
    ("capitalization", Category::Grammatical),
    ("space", Category::Space),
    ("spacing", Category::Space),
    ("whitespace", Category::Space),
    ("context", Category::Context),
    ("consistency", Category::Context),
    ("word choice", Category::Context),
    ("suggestion", Category::Suggestions),
    ("suggestions", Category::Suggestions),
    ("formatting", Category::Suggestions),
    ("style", Category::Suggestions),
];

/// Map an external label to a category; unknown labels land in `Context`.
pub fn map_category(label: &str) -> Category {
    let normalized = label.trim().to_lowercase();
    CATEGORY_TABLE
        .iter()
        .find(|(known, _)| *known == normalized)
        .map(|(_, category)| *category)
        .unwrap_or(Category::Context)
}
