//! Whole-manual review: one generation call that critiques the draft and flags
//! sections for refinement.

use serde::{Deserialize, Serialize};

use folio_llm::{GenerationRequest, TextGenerator};
use folio_project::{ProjectLayout, SectionSet, StatusUpdate};
use folio_types::{FolioError, Result};

use crate::json::extract_object;
use crate::prompt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub section: String,
    pub suggestion: String,
}

/// The parsed review reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub issues_found: bool,
    #[serde(default)]
    pub improvements: Vec<Improvement>,
    #[serde(default)]
    pub overall_quality: String,
    #[serde(default)]
    pub summary: String,
}

impl Review {
    pub fn parse(reply: &str) -> Result<Self> {
        let value = extract_object(reply, "review")?;
        serde_json::from_value(value).map_err(|e| FolioError::parse("review", e))
    }
}

/// Result of applying a review to the sections.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub review: Review,
    /// Section numbers flagged for revision.
    pub flagged: Vec<String>,
    /// Suggestions naming sections that do not exist.
    pub unmatched: Vec<Improvement>,
}

/// Ask for a review and record its suggestions on the matching sections.
///
/// A reply that cannot be parsed is an error and nothing is changed.
pub async fn review_sections(
    generator: &dyn TextGenerator,
    layout: &ProjectLayout,
    sections: &mut SectionSet,
    manual_description: &str,
) -> Result<ReviewOutcome> {
    let request = GenerationRequest::new(prompt::review_prompt(manual_description, sections.units()))
        .max_tokens(2000)
        .temperature(0.3);
    let reply = generator.generate(&request).await?;
    let review = Review::parse(&reply)?;

    let mut flagged = Vec::new();
    let mut unmatched = Vec::new();
    for improvement in &review.improvements {
        let number = normalize_section_ref(&improvement.section);
        match sections.get_mut(&number) {
            Some(unit) => {
                unit.add_review_note(&improvement.suggestion);
                unit.needs_revision = true;
                if !flagged.contains(&number) {
                    flagged.push(number);
                }
            }
            None => unmatched.push(improvement.clone()),
        }
    }

    layout.save_sections(sections)?;
    let review_data = serde_json::to_value(&review)?;
    layout.status_store().save(
        StatusUpdate::new()
            .phase("review_completed")
            .field("review_data", review_data),
    )?;
    tracing::info!(
        project = %layout.name(),
        flagged = flagged.len(),
        quality = %review.overall_quality,
        "Review recorded"
    );

    Ok(ReviewOutcome {
        review,
        flagged,
        unmatched,
    })
}

/// `"Section 2.1: Leave"` and `"2.1."` both refer to section `2.1`.
fn normalize_section_ref(raw: &str) -> String {
    let s = raw.trim();
    let s = s
        .strip_prefix("Section")
        .or_else(|| s.strip_prefix("section"))
        .unwrap_or(s)
        .trim_start();
    s.split(|c: char| c.is_whitespace() || c == ':')
        .next()
        .unwrap_or("")
        .trim_end_matches('.')
        .to_string()
}
