//! Stage drivers and the resumable unit loop.
//!
//! This crate implements the four Folio stages on top of `folio-project`:
//! initiation (outline and variables), expansion (user edits and notes),
//! content generation with optional review and refinement, and rendering
//! to Markdown or RTF. Long stages can run on a [`StageTask`] that reports
//! [`ProgressEvent`]s and stops cleanly between units.

pub mod error;
pub mod events;
pub mod expand;
pub mod generate;
pub mod initiate;
pub mod json;
pub mod prompt;
pub mod render;
pub mod review;
pub mod runner;
pub mod task;

pub use error::RunError;
pub use events::{EventEmitter, ProgressEvent};
pub use expand::ExpandSession;
pub use generate::{pending_numbers, ContentStage, GenerateOptions, GenerateOutcome};
pub use initiate::{read_input_file, write_remaining, BatchReport, InitiateOutcome, Initiator};
pub use prompt::PromptContext;
pub use render::{
    render_project, DocumentFormat, DocumentModel, DocumentRenderer, DocxRenderer,
    MarkdownRenderer, RenderOptions, RenderOutcome, RenderedSection, RtfRenderer, Statistics,
};
pub use review::{review_sections, Review, ReviewOutcome};
pub use runner::{RunReport, RunnerConfig, StageRunner, UnitFailure};
pub use task::StageTask;
