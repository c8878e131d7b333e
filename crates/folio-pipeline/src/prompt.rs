//! Prompt construction for every stage that talks to the generator.

use std::fmt::Write;

use folio_project::{Notes, PolicyAssignment, ProjectStatus, Responsibility, VariableStore};
use folio_types::{marker_for, SectionUnit};

/// Words of previously generated text carried into each section prompt.
pub const CONTEXT_WINDOW_WORDS: usize = 500;

/// The last `n` whitespace-delimited words of `text`, joined by single spaces.
pub fn trailing_words(text: &str, n: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(n);
    words[start..].join(" ")
}

/// Everything about a project that goes into a section prompt, gathered once
/// per run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptContext {
    pub manual_description: String,
    /// `(marker, description)` pairs such as `("[COMPANY NAME]", "...")`.
    pub variables: Vec<(String, String)>,
    pub responsibilities: Vec<Responsibility>,
    pub notes: String,
}

impl PromptContext {
    pub fn new(manual_description: impl Into<String>) -> Self {
        Self {
            manual_description: manual_description.into(),
            ..Self::default()
        }
    }

    /// Build from the persisted status, the variable registry, and the notes.
    pub fn from_project(status: &ProjectStatus, variables: &VariableStore, notes: &Notes) -> Self {
        let responsibilities = status
            .field("responsibilities")
            .and_then(|v| {
                serde_json::from_value::<std::collections::BTreeMap<String, Responsibility>>(
                    v.clone(),
                )
                .ok()
            })
            .map(|m| m.into_values().collect())
            .unwrap_or_default();

        Self {
            manual_description: status.manual_description.clone(),
            variables: variables
                .iter()
                .map(|(name, var)| (marker_for(name), var.description.clone()))
                .collect(),
            responsibilities,
            notes: notes.prompt_context(),
        }
    }

    fn variables_block(&self) -> String {
        if self.variables.is_empty() {
            return String::new();
        }
        let mut out = String::from("Available placeholders (use them where they fit):\n");
        for (marker, description) in &self.variables {
            let description = if description.is_empty() {
                "No description"
            } else {
                description
            };
            let _ = writeln!(out, "- {marker}: {description}");
        }
        out.push('\n');
        out
    }

    fn responsibilities_block(&self) -> String {
        if self.responsibilities.is_empty() {
            return String::new();
        }
        let mut out = String::from("Key roles for this policy:\n");
        for r in &self.responsibilities {
            let _ = writeln!(out, "- {}: {} ({})", r.title, r.name, r.email);
        }
        out.push_str(
            "Reference these roles for responsibilities, approvals, and escalation.\n\n",
        );
        out
    }
}

/// Prompt for the body of one section. `previous` is the trailing context
/// window of earlier sections, possibly empty.
pub fn section_prompt(ctx: &PromptContext, unit: &SectionUnit, previous: &str) -> String {
    let mut p = String::new();
    let _ = writeln!(
        p,
        "You are writing a policy manual about: {}\n",
        ctx.manual_description
    );
    let _ = writeln!(p, "Write the content of section {}: {}\n", unit.number, unit.title);
    if !unit.description.is_empty() {
        let _ = writeln!(p, "What this section must cover:\n{}\n", unit.description);
    }
    p.push_str(&ctx.variables_block());
    p.push_str(&ctx.responsibilities_block());
    p.push_str(&ctx.notes);
    p.push_str(
        "Requirements:\n\
         - 400 to 1000 words of clear, professional policy language\n\
         - specific guidelines, procedures, and requirements where relevant\n\
         - subheadings where the description calls for them\n\
         - do not repeat material from other sections\n\
         - use the placeholders above instead of inventing names, dates, or contacts\n\n",
    );
    if !previous.is_empty() {
        let _ = writeln!(p, "Previously written content, for continuity:\n{previous}\n");
    }
    p.push_str("Write only the section body. Do not repeat the section number or title.");
    p
}

/// Prompt asking for a revised section that addresses review feedback.
pub fn refine_prompt(ctx: &PromptContext, unit: &SectionUnit) -> String {
    let mut p = String::new();
    let _ = writeln!(
        p,
        "You are revising a section of a policy manual about: {}\n",
        ctx.manual_description
    );
    let _ = writeln!(p, "Section {}: {}\n", unit.number, unit.title);
    let _ = writeln!(p, "Current text:\n{}\n", unit.content);
    let _ = writeln!(p, "Reviewer feedback:\n{}\n", unit.review_notes);
    p.push_str(&ctx.variables_block());
    p.push_str(
        "Rewrite the section so that it addresses the feedback while keeping what is \
         already correct. Keep the placeholders in [BRACKETS]. Write only the revised \
         section body.",
    );
    p
}

/// Prompt for the table of contents. The reply must be
/// `{"sections": [{"number", "title", "description"}]}`.
pub fn outline_prompt(manual_description: &str) -> String {
    format!(
        r#"Create a comprehensive table of contents for a policy manual about: {manual_description}

Return a JSON object of this shape:
{{
  "sections": [
    {{"number": "1", "title": "Introduction", "description": "Purpose of the manual, its scope, and how to use it"}},
    {{"number": "1.1", "title": "Purpose and Scope", "description": "What the manual is for and where its boundaries lie"}},
    {{"number": "1.1.1", "title": "Applicability", "description": "Who the manual applies to and in which circumstances"}},
    {{"number": "2", "title": "Definitions", "description": "Terms and acronyms used throughout the manual"}}
  ]
}}

Requirements:
- at most 3 levels of numbering: 1, 1.1, 1.1.1
- every section has a clear title and a 2-3 sentence description of what it covers
- descriptions do not overlap
- cover every essential topic for: {manual_description}

Return ONLY the JSON object."#
    )
}

/// Prompt for the manual's variables. The reply must be
/// `{"variables": {NAME: {"description", "default_value", "category"}}}`.
pub fn variables_prompt(manual_description: &str, assignment: &PolicyAssignment) -> String {
    let mut roles = String::new();
    if !assignment.responsibilities.is_empty() {
        roles.push_str("\nThe following organisational roles are relevant:\n");
        for (role_type, r) in &assignment.responsibilities {
            let _ = writeln!(roles, "- {role_type}: {} ({})", r.title, r.name);
        }
    }
    format!(
        r#"List the variables needed to personalise a policy manual about: {manual_description}
{roles}
Return a JSON object of this shape:
{{
  "variables": {{
    "POLICY_OWNER": {{"description": "Person responsible for maintaining this policy", "default_value": "[POLICY OWNER]", "category": "policy"}},
    "EFFECTIVE_DATE": {{"description": "Date the policy takes effect", "default_value": "[EFFECTIVE DATE]", "category": "policy"}},
    "DEPARTMENT": {{"description": "Department responsible for this policy", "default_value": "[DEPARTMENT]", "category": "organization"}}
  }}
}}

Requirements:
- categories: organization, contact, policy, legal, operational
- default values are placeholder text in [BRACKETS]
- include company details, contacts, dates, and legal requirements

Return ONLY the JSON object."#
    )
}

/// Prompt for a review of the generated manual. The reply must be
/// `{"issues_found", "improvements": [{"section", "suggestion"}],
/// "overall_quality", "summary"}`.
pub fn review_prompt(manual_description: &str, units: &[SectionUnit]) -> String {
    let mut body = String::new();
    for unit in units.iter().filter(|u| !u.content.trim().is_empty()) {
        let _ = writeln!(
            body,
            "Section {}: {}\n{}\n",
            unit.number,
            unit.title,
            leading_words(&unit.content, 200)
        );
    }
    format!(
        r#"Review this draft policy manual about: {manual_description}

{body}
Check for gaps, contradictions, unclear directives, and missing responsibilities.

Return a JSON object of this shape:
{{
  "issues_found": true,
  "improvements": [{{"section": "2.1", "suggestion": "State who approves exceptions"}}],
  "overall_quality": "good",
  "summary": "One paragraph assessment"
}}

Only list sections that genuinely need revision. Return ONLY the JSON object."#
    )
}

/// The first `n` words of `text`, marked when truncated.
fn leading_words(text: &str, n: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= n {
        words.join(" ")
    } else {
        format!("{} ...", words[..n].join(" "))
    }
}
