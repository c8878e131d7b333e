//! The resumable per-section loop.
//!
//! Units are processed strictly in order, one generation call in flight at a
//! time. After every unit, success or failure, the whole section collection
//! and the status progress counters are written before the next unit starts,
//! so a run killed at any point resumes at the first unit still pending.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use folio_llm::{GenerationRequest, SharedGenerator};
use folio_project::{ProjectLayout, SectionSet, StatusStore, StatusUpdate};
use folio_types::{ErrorKind, FolioError, SectionUnit};

use crate::error::RunError;
use crate::events::{EventEmitter, ProgressEvent};
use crate::prompt::{self, PromptContext, CONTEXT_WINDOW_WORDS};

/// Sampling and loop settings for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub refine_temperature: f32,
    pub context_words: usize,
    /// Regenerate units that already have content.
    pub force: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1500,
            temperature: 0.6,
            refine_temperature: 0.5,
            context_words: CONTEXT_WINDOW_WORDS,
            force: false,
        }
    }
}

/// A unit the generator could not produce.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitFailure {
    pub index: usize,
    pub number: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// What a run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub start_index: usize,
    /// Units a generation call was made for.
    pub attempted: usize,
    pub generated: usize,
    pub skipped: usize,
    pub failed: Vec<UnitFailure>,
    pub cancelled: bool,
    /// First pending unit after the run; equal to the unit count when done.
    pub next_index: usize,
    pub total: usize,
}

impl RunReport {
    fn new(start_index: usize, total: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            start_index,
            attempted: 0,
            generated: 0,
            skipped: 0,
            failed: Vec::new(),
            cancelled: false,
            next_index: start_index,
            total,
        }
    }

    /// Every unit has content.
    pub fn is_complete(&self) -> bool {
        self.next_index >= self.total
    }

    /// A failure left unresolved because the service could not be reached.
    pub fn has_connectivity_failures(&self) -> bool {
        self.failed.iter().any(|f| f.kind == ErrorKind::Connectivity)
    }
}

/// Drives generation over a project's sections.
pub struct StageRunner {
    generator: SharedGenerator,
    layout: ProjectLayout,
    status: StatusStore,
    context: PromptContext,
    config: RunnerConfig,
    events: EventEmitter,
    cancel: CancellationToken,
}

impl StageRunner {
    pub fn new(generator: SharedGenerator, layout: ProjectLayout, context: PromptContext) -> Self {
        let status = layout.status_store();
        Self {
            generator,
            layout,
            status,
            context,
            config: RunnerConfig::default(),
            events: EventEmitter::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    /// Stop between units once `cancel` fires. The unit in flight finishes.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Continue at the first pending unit.
    pub async fn resume(&self, sections: &mut SectionSet) -> Result<RunReport, RunError> {
        let start = sections.resume_index();
        self.run_from(sections, start).await
    }

    /// Process units `[start, len)` in order.
    ///
    /// Units that already have content are skipped unless `force` is set;
    /// their text still feeds the context window. A generation failure leaves
    /// the unit pending and the run moves on. Persistence failures stop the
    /// run and report how many units were saved before it.
    pub async fn run_from(
        &self,
        sections: &mut SectionSet,
        start: usize,
    ) -> Result<RunReport, RunError> {
        let total = sections.len();
        if start > total {
            return Err(FolioError::Validation(format!(
                "start index {start} is past the last of {total} sections"
            ))
            .into());
        }

        let mut report = RunReport::new(start, total);
        let mut history = accumulated_text(&sections.units()[..start]);
        let mut advanced = 0;

        tracing::info!(
            project = %self.layout.name(),
            run_id = %report.run_id,
            start,
            total,
            "Generation run started"
        );
        self.events.emit(ProgressEvent::RunStarted {
            run_id: report.run_id,
            start_index: start,
            total,
        });

        for index in start..total {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let Some(unit) = sections.unit_at(index).cloned() else {
                break;
            };

            if !self.config.force && !unit.status.is_pending() {
                report.skipped += 1;
                append_unit(&mut history, &unit);
                self.events.emit(ProgressEvent::UnitSkipped {
                    index,
                    number: unit.number.clone(),
                });
                continue;
            }

            self.events.emit(ProgressEvent::UnitStarted {
                index,
                number: unit.number.clone(),
                title: unit.title.clone(),
            });
            let window = prompt::trailing_words(&history, self.config.context_words);
            let request = GenerationRequest::new(prompt::section_prompt(&self.context, &unit, &window))
                .max_tokens(self.config.max_tokens)
                .temperature(self.config.temperature);

            report.attempted += 1;
            match self.generator.generate(&request).await {
                Ok(text) => {
                    let Some(slot) = sections.unit_at_mut(index) else {
                        break;
                    };
                    slot.record_generated(text);
                    let word_count = slot.word_count;
                    append_unit(&mut history, slot);
                    report.generated += 1;

                    self.persist(sections, Some(&unit.number))
                        .map_err(|e| RunError::new(advanced, e))?;
                    advanced += 1;

                    tracing::info!(
                        section = %unit.number,
                        words = word_count,
                        "Section generated"
                    );
                    self.events.emit(ProgressEvent::UnitCompleted {
                        index,
                        number: unit.number.clone(),
                        word_count,
                    });
                }
                Err(e) => {
                    tracing::warn!(section = %unit.number, error = %e, "Section generation failed; left pending");
                    self.events.emit(ProgressEvent::UnitFailed {
                        index,
                        number: unit.number.clone(),
                        error: e.to_string(),
                    });
                    report.failed.push(UnitFailure {
                        index,
                        number: unit.number.clone(),
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                    self.persist(sections, Some(&unit.number))
                        .map_err(|e| RunError::new(advanced, e))?;
                }
            }
        }

        report.next_index = sections.resume_index();
        if report.cancelled {
            tracing::info!(next = report.next_index, "Generation run cancelled between units");
            self.events.emit(ProgressEvent::RunCancelled {
                run_id: report.run_id,
                next_index: report.next_index,
            });
        }
        tracing::info!(
            run_id = %report.run_id,
            generated = report.generated,
            failed = report.failed.len(),
            skipped = report.skipped,
            "Generation run finished"
        );
        self.events.emit(ProgressEvent::RunFinished {
            run_id: report.run_id,
            generated: report.generated,
            failed: report.failed.len(),
        });
        Ok(report)
    }

    /// Regenerate every unit flagged `needs_revision` using its review notes.
    /// Refined units are saved one at a time, like a normal run.
    pub async fn refine_flagged(&self, sections: &mut SectionSet) -> Result<RunReport, RunError> {
        let flagged: Vec<usize> = sections
            .units()
            .iter()
            .enumerate()
            .filter(|(_, u)| u.needs_revision)
            .map(|(i, _)| i)
            .collect();
        let mut report = RunReport::new(0, sections.len());
        let mut advanced = 0;

        for index in flagged {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let Some(unit) = sections.unit_at(index).cloned() else {
                break;
            };
            let request = GenerationRequest::new(prompt::refine_prompt(&self.context, &unit))
                .max_tokens(self.config.max_tokens)
                .temperature(self.config.refine_temperature);

            report.attempted += 1;
            match self.generator.generate(&request).await {
                Ok(text) => {
                    if let Some(slot) = sections.unit_at_mut(index) {
                        slot.record_refined(text);
                    }
                    report.generated += 1;
                    self.persist(sections, Some(&unit.number))
                        .map_err(|e| RunError::new(advanced, e))?;
                    advanced += 1;
                    tracing::info!(section = %unit.number, "Section refined");
                }
                Err(e) => {
                    tracing::warn!(section = %unit.number, error = %e, "Section refinement failed; kept previous text");
                    report.failed.push(UnitFailure {
                        index,
                        number: unit.number.clone(),
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }
        report.next_index = sections.resume_index();
        Ok(report)
    }

    fn persist(&self, sections: &SectionSet, current: Option<&str>) -> folio_types::Result<()> {
        self.layout.save_sections(sections)?;
        let completed = sections.completed_count();
        let total = sections.len();
        self.status.save(
            StatusUpdate::new()
                .phase("generating_content")
                .progress(completed, total)
                .current_unit(current.map(str::to_string)),
        )?;
        self.events
            .emit(ProgressEvent::ProgressSaved { completed, total });
        Ok(())
    }
}

fn accumulated_text(units: &[SectionUnit]) -> String {
    let mut history = String::new();
    for unit in units {
        append_unit(&mut history, unit);
    }
    history
}

fn append_unit(history: &mut String, unit: &SectionUnit) {
    if unit.content.trim().is_empty() {
        return;
    }
    history.push_str(&format!(
        "\n\nSection {}: {}\n{}",
        unit.number, unit.title, unit.content
    ));
}
