//! Stage 3: generate section content, optionally review and refine it.

use tokio_util::sync::CancellationToken;

use folio_llm::SharedGenerator;
use folio_project::{Notes, ProjectLayout, SectionSet, StatusUpdate, Workspace};
use folio_types::{FolioError, Stage};

use crate::error::RunError;
use crate::events::{EventEmitter, ProgressEvent};
use crate::prompt::PromptContext;
use crate::review::{review_sections, ReviewOutcome};
use crate::runner::{RunReport, RunnerConfig, StageRunner};

/// What the user asked stage 3 to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Regenerate every unit from the first, including ones with content.
    pub restart: bool,
    /// Review the manual once every unit has content.
    pub review: bool,
    /// Regenerate units flagged by a review.
    pub refine: bool,
}

/// What stage 3 did.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOutcome {
    pub run: RunReport,
    pub review: Option<ReviewOutcome>,
    pub refine: Option<RunReport>,
    /// Stage 3 is marked completed.
    pub stage_completed: bool,
}

impl GenerateOutcome {
    /// Every requested unit was attempted and none was lost to the service
    /// being unreachable.
    pub fn is_success(&self) -> bool {
        let refine_ok = self
            .refine
            .as_ref()
            .map_or(true, |r| !r.cancelled && !r.has_connectivity_failures());
        !self.run.cancelled && !self.run.has_connectivity_failures() && refine_ok
    }
}

/// Runs stage 3 for one project.
pub struct ContentStage {
    generator: SharedGenerator,
    workspace: Workspace,
    config: RunnerConfig,
    events: EventEmitter,
    cancel: CancellationToken,
}

impl ContentStage {
    pub fn new(generator: SharedGenerator, workspace: Workspace) -> Self {
        Self {
            generator,
            workspace,
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

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(
        &self,
        layout: &ProjectLayout,
        options: GenerateOptions,
    ) -> Result<GenerateOutcome, RunError> {
        let store = layout.status_store();
        let status = store.enter(Stage::Generate)?;
        let mut sections = layout.load_sections()?;
        if sections.is_empty() {
            return Err(FolioError::Validation(format!(
                "project {} has no sections to generate",
                layout.name()
            ))
            .into());
        }
        self.events.emit(ProgressEvent::StageEntered {
            project: layout.name().to_string(),
            stage: Stage::Generate,
        });

        let variables = self.workspace.variables()?;
        let notes = Notes::read(&layout.notes_dir())?;
        let context = PromptContext::from_project(&status, &variables, &notes);
        let config = RunnerConfig {
            force: options.restart,
            ..self.config.clone()
        };
        let runner = StageRunner::new(self.generator.clone(), layout.clone(), context)
            .with_config(config)
            .with_events(self.events.clone())
            .with_cancellation(self.cancel.clone());

        let run = if options.restart {
            tracing::info!(project = %layout.name(), "Restarting generation from the first section");
            runner.run_from(&mut sections, 0).await?
        } else {
            runner.resume(&mut sections).await?
        };
        let advanced = run.generated;

        let stage_completed = run.is_complete() && !run.cancelled;
        if stage_completed {
            store
                .complete(
                    Stage::Generate,
                    StatusUpdate::new()
                        .phase("content_generated")
                        .progress(sections.completed_count(), sections.len())
                        .current_unit(None)
                        .field("total_words", sections.total_words()),
                )
                .map_err(|e| RunError::new(advanced, e))?;
            self.events.emit(ProgressEvent::StageCompleted {
                project: layout.name().to_string(),
                stage: Stage::Generate,
            });
        } else {
            tracing::warn!(
                project = %layout.name(),
                pending = sections.len() - sections.completed_count(),
                "Stage 3 left incomplete; run generate again to resume"
            );
        }

        let review = if options.review && stage_completed {
            let outcome = review_sections(
                self.generator.as_ref(),
                layout,
                &mut sections,
                &status.manual_description,
            )
            .await
            .map_err(|e| RunError::new(advanced, e))?;
            Some(outcome)
        } else {
            None
        };

        let refine = if options.refine && stage_completed {
            let report = runner
                .refine_flagged(&mut sections)
                .await
                .map_err(|e| RunError::new(advanced + e.units_advanced, e.source))?;
            if report.generated > 0 {
                store
                    .save(StatusUpdate::new().phase("content_refined").current_unit(None))
                    .map_err(|e| RunError::new(advanced + report.generated, e))?;
            }
            Some(report)
        } else {
            None
        };

        Ok(GenerateOutcome {
            run,
            review,
            refine,
            stage_completed,
        })
    }
}

/// Sections still without content, for status displays.
pub fn pending_numbers(sections: &SectionSet) -> Vec<String> {
    sections
        .units()
        .iter()
        .filter(|u| u.status.is_pending())
        .map(|u| u.number.clone())
        .collect()
}
