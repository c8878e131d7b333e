//! Stage 4: resolve placeholders and write the finished manual.
//!
//! Rendering is a pure function of a [`DocumentModel`]. Word (`.docx`) is the
//! default output; RTF and Markdown are also built in. The model is built
//! from the sections after every `{dotted.path}` and `[MARKER]` placeholder
//! has been resolved against one snapshot of the configuration and the
//! variable registry.

use std::fmt::Write;
use std::io::Cursor;
use std::path::PathBuf;
use std::str::FromStr;

use docx_rs::{AlignmentType, BreakType, Docx, Paragraph, Run, Style, StyleType};
use serde::Serialize;

use folio_config::{ConfigStore, TemplateResolver};
use folio_project::{ProjectLayout, SectionSet, StatusUpdate, Workspace};
use folio_types::{atomic, FolioError, Result, SectionUnit, Stage};

/// Output directory used when none is given, relative to the workspace root.
pub const DEFAULT_OUTPUT_DIR: &str = "generated_documents";

// ---------------------------------------------------------------------------
// Document model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedSection {
    pub number: String,
    pub title: String,
    pub content: String,
    pub depth: usize,
}

/// A manual ready for a renderer. All text is already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentModel {
    pub title: String,
    pub subject: String,
    /// Human-readable generation date, e.g. `March 04, 2025`.
    pub generated: String,
    pub sections: Vec<RenderedSection>,
}

/// Turns a document model into file contents.
pub trait DocumentRenderer: Send + Sync {
    fn name(&self) -> &'static str;
    fn extension(&self) -> &'static str;
    fn render(&self, doc: &DocumentModel) -> Result<Vec<u8>>;
}

/// Paragraphs of a section body: blank-line separated, inner newlines folded.
fn body_paragraphs(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.replace('\n', " "))
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

pub struct MarkdownRenderer;

impl DocumentRenderer for MarkdownRenderer {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn extension(&self) -> &'static str {
        "md"
    }

    fn render(&self, doc: &DocumentModel) -> Result<Vec<u8>> {
        let mut out = String::new();
        let _ = writeln!(out, "# {}\n", doc.title);
        let _ = writeln!(out, "**Subject:** {}  ", doc.subject);
        let _ = writeln!(out, "**Generated:** {}\n", doc.generated);

        out.push_str("## Table of Contents\n\n");
        for s in &doc.sections {
            let indent = "  ".repeat(s.depth.saturating_sub(1));
            let _ = writeln!(out, "{indent}- {}. {}", s.number, s.title);
        }
        out.push('\n');

        for s in doc.sections.iter().filter(|s| !s.content.trim().is_empty()) {
            let level = "#".repeat((s.depth + 1).min(6));
            let _ = writeln!(out, "{level} {} {}\n", s.number, s.title);
            let _ = writeln!(out, "{}\n", s.content.trim());
        }
        Ok(out.into_bytes())
    }
}

// ---------------------------------------------------------------------------
// RTF
// ---------------------------------------------------------------------------

pub struct RtfRenderer;

impl RtfRenderer {
    /// Escape RTF control characters; non-ASCII becomes `\uN?`.
    fn escape(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '{' => out.push_str("\\{"),
                '}' => out.push_str("\\}"),
                c if c.is_ascii() => out.push(c),
                c => {
                    let mut units = [0u16; 2];
                    for unit in c.encode_utf16(&mut units) {
                        let _ = write!(out, "\\u{}?", *unit as i16);
                    }
                }
            }
        }
        out
    }
}

impl DocumentRenderer for RtfRenderer {
    fn name(&self) -> &'static str {
        "rtf"
    }

    fn extension(&self) -> &'static str {
        "rtf"
    }

    fn render(&self, doc: &DocumentModel) -> Result<Vec<u8>> {
        let mut lines: Vec<String> = vec![
            r"{\rtf1\ansi\deff0".into(),
            r"{\fonttbl{\f0 Times New Roman;}{\f1 Arial;}}".into(),
            r"{\colortbl;\red0\green0\blue0;}".into(),
            format!(r"\pard\qc\f0\fs36\b {}\b0\fs24\par", Self::escape(&doc.title)),
            r"\par".into(),
            format!(r"\pard\qc\f0\fs20\b Subject: {}\b0\par", Self::escape(&doc.subject)),
            r"\par".into(),
            format!(r"\pard\qc\f0\fs16 Generated: {}\par", Self::escape(&doc.generated)),
            r"\par\par".into(),
            r"\pard\ql\f0\fs24\b\ul TABLE OF CONTENTS\ul0\b0\par".into(),
            r"\par".into(),
        ];
        for s in &doc.sections {
            let indent = r"\tab ".repeat(s.depth.saturating_sub(1));
            lines.push(format!(
                r"\pard\ql\f0\fs18 {indent}{}. {}\par",
                Self::escape(&s.number),
                Self::escape(&s.title)
            ));
        }
        lines.push(r"\par\par".into());
        lines.push(r"\page".into());

        for s in doc.sections.iter().filter(|s| !s.content.trim().is_empty()) {
            lines.push(format!(
                r"\pard\ql\f0\fs20\b\ul Section {}: {}\ul0\b0\par",
                Self::escape(&s.number),
                Self::escape(&s.title)
            ));
            lines.push(r"\par".into());
            for paragraph in body_paragraphs(&s.content) {
                lines.push(format!(r"\pard\ql\f0\fs20 {}\par", Self::escape(&paragraph)));
                lines.push(r"\par".into());
            }
            lines.push(r"\par".into());
        }
        lines.push("}".into());
        Ok(lines.join("\n").into_bytes())
    }
}

// ---------------------------------------------------------------------------
// Word
// ---------------------------------------------------------------------------

/// Half an inch per contents level, in twentieths of a point.
const DOCX_TOC_INDENT: i32 = 720;

/// Word document: centred title block, contents with one indent per level,
/// a page break, then one `Section N: title` heading per written section.
pub struct DocxRenderer;

impl DocxRenderer {
    fn styles(docx: Docx) -> Docx {
        docx.add_style(
            Style::new("Title", StyleType::Paragraph)
                .name("Title")
                .size(52)
                .bold(),
        )
        .add_style(
            Style::new("Heading1", StyleType::Paragraph)
                .name("Heading 1")
                .size(32)
                .bold(),
        )
        .add_style(
            Style::new("Heading2", StyleType::Paragraph)
                .name("Heading 2")
                .size(26)
                .bold(),
        )
    }

    fn text(text: &str) -> Paragraph {
        Paragraph::new().add_run(Run::new().add_text(text))
    }

    fn build(doc: &DocumentModel) -> Docx {
        let mut docx = Self::styles(Docx::new())
            .add_paragraph(
                Self::text(&doc.title)
                    .style("Title")
                    .align(AlignmentType::Center),
            )
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text(format!("Subject: {}", doc.subject)).bold())
                    .align(AlignmentType::Center),
            )
            .add_paragraph(
                Self::text(&format!("Generated: {}", doc.generated)).align(AlignmentType::Center),
            )
            .add_paragraph(Paragraph::new())
            .add_paragraph(Self::text("TABLE OF CONTENTS").style("Heading1"));

        for s in &doc.sections {
            let level = i32::try_from(s.depth.saturating_sub(1)).unwrap_or(0);
            docx = docx.add_paragraph(
                Self::text(&format!("{}. {}", s.number, s.title)).indent(
                    Some(DOCX_TOC_INDENT * level),
                    None,
                    None,
                    None,
                ),
            );
        }
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_break(BreakType::Page)));

        for s in doc.sections.iter().filter(|s| !s.content.trim().is_empty()) {
            docx = docx.add_paragraph(
                Self::text(&format!("Section {}: {}", s.number, s.title)).style("Heading2"),
            );
            for paragraph in body_paragraphs(&s.content) {
                docx = docx.add_paragraph(Self::text(&paragraph));
            }
        }
        docx
    }
}

impl DocumentRenderer for DocxRenderer {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn extension(&self) -> &'static str {
        "docx"
    }

    fn render(&self, doc: &DocumentModel) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        Self::build(doc)
            .build()
            .pack(&mut buffer)
            .map_err(|e| FolioError::Other(format!("failed to write docx package: {e}")))?;
        Ok(buffer.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Format selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocumentFormat {
    #[default]
    Docx,
    Rtf,
    Markdown,
}

impl DocumentFormat {
    pub fn renderer(self) -> Box<dyn DocumentRenderer> {
        match self {
            DocumentFormat::Docx => Box::new(DocxRenderer),
            DocumentFormat::Rtf => Box::new(RtfRenderer),
            DocumentFormat::Markdown => Box::new(MarkdownRenderer),
        }
    }
}

impl FromStr for DocumentFormat {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "docx" | "word" => Ok(DocumentFormat::Docx),
            "rtf" => Ok(DocumentFormat::Rtf),
            "markdown" | "md" => Ok(DocumentFormat::Markdown),
            other => Err(FolioError::Validation(format!(
                "unknown document format '{other}' (expected docx, rtf or markdown)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage driver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_sections: usize,
    pub total_words: usize,
    pub sections_needing_revision: usize,
}

impl Statistics {
    pub fn of(sections: &SectionSet) -> Self {
        Self {
            total_sections: sections.len(),
            total_words: sections.total_words(),
            sections_needing_revision: sections.needing_revision().count(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Defaults to [`DEFAULT_OUTPUT_DIR`] under the workspace root.
    pub output_dir: Option<PathBuf>,
    pub format: DocumentFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutcome {
    pub document: PathBuf,
    pub data: PathBuf,
    pub statistics: Statistics,
    /// Placeholders left in the output, first occurrence order.
    pub unresolved: Vec<String>,
}

#[derive(Serialize)]
struct DataExport<'a> {
    manual_description: &'a str,
    generated_date: String,
    sections: &'a [SectionUnit],
    variables: &'a std::collections::BTreeMap<String, String>,
    statistics: Statistics,
    unresolved_placeholders: &'a [String],
}

/// Render a project whose content stage is complete.
pub fn render_project(
    workspace: &Workspace,
    layout: &ProjectLayout,
    config: &ConfigStore,
    options: &RenderOptions,
) -> Result<RenderOutcome> {
    let store = layout.status_store();
    let status = store.enter(Stage::Render)?;
    let sections = layout.load_sections()?;
    let markers = workspace.variables()?.markers();
    let resolver = TemplateResolver::from_store(config).with_markers(markers.clone());

    let mut unresolved: Vec<String> = Vec::new();
    let mut resolve = |text: &str| {
        let resolution = resolver.resolve_detailed(text);
        for placeholder in resolution.unresolved {
            if !unresolved.contains(&placeholder) {
                unresolved.push(placeholder);
            }
        }
        resolution.text
    };

    let now = chrono::Local::now();
    let title_template = config.get_string("document.title", "POLICY MANUAL");
    let model = DocumentModel {
        title: resolve(&title_template),
        subject: resolve(&status.manual_description),
        generated: now.format("%B %d, %Y").to_string(),
        sections: sections
            .units()
            .iter()
            .map(|u| RenderedSection {
                number: u.number.clone(),
                title: resolve(&u.title),
                content: resolve(&u.content),
                depth: u.depth(),
            })
            .collect(),
    };

    let renderer = options.format.renderer();
    let output_dir = options
        .output_dir
        .clone()
        .unwrap_or_else(|| workspace.root().join(DEFAULT_OUTPUT_DIR));
    let document = output_dir.join(format!("{}_manual.{}", layout.name(), renderer.extension()));
    atomic::write_atomic(&document, &renderer.render(&model)?)?;

    let statistics = Statistics::of(&sections);
    let data = output_dir.join(format!("{}_data.json", layout.name()));
    atomic::write_json(
        &data,
        &DataExport {
            manual_description: &status.manual_description,
            generated_date: now.to_rfc3339(),
            sections: sections.units(),
            variables: &markers,
            statistics,
            unresolved_placeholders: &unresolved,
        },
    )?;

    store.complete(
        Stage::Render,
        StatusUpdate::new()
            .phase("documents_generated")
            .field("output_file", document.display().to_string())
            .field("output_format", renderer.name()),
    )?;
    if unresolved.is_empty() {
        tracing::info!(project = %layout.name(), path = %document.display(), "Document rendered");
    } else {
        tracing::warn!(
            project = %layout.name(),
            path = %document.display(),
            unresolved = ?unresolved,
            "Document rendered with unresolved placeholders"
        );
    }

    Ok(RenderOutcome {
        document,
        data,
        statistics,
        unresolved,
    })
}
