//! CLI binary for running the Folio manual pipeline.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use folio_config::{ConfigStore, FieldCatalog};
use folio_llm::{
    BackoffPolicy, ChatCompletionsClient, GenerationSettings, RetryingGenerator, SharedGenerator,
    TextGenerator,
};
use folio_pipeline::{
    pending_numbers, read_input_file, render_project, write_remaining, BatchReport, ContentStage,
    DocumentFormat, ExpandSession, GenerateOptions, InitiateOutcome, Initiator, ProgressEvent,
    RenderOptions, StageTask,
};
use folio_project::{Notes, Organogram, ProjectLayout, SectionEdit, Workspace};
use folio_types::{SectionUnit, Stage, VariableOrigin};

#[derive(Parser)]
#[command(name = "folio", version, about = "Staged, resumable policy-manual generation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace directory holding the config, variables, and projects
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Company config file (default: <workspace>/company.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Generation service base URL (overrides config and FOLIO_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Model name (overrides config and FOLIO_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage 1: create projects with an outline and variables
    Init {
        /// Organogram file (default: <workspace>/organogram.json)
        #[arg(long)]
        organogram: Option<PathBuf>,

        /// Manual keys from the organogram catalogue
        #[arg(long, num_args = 1..)]
        manuals: Vec<String>,

        /// A single manual description
        #[arg(short, long)]
        description: Option<String>,

        /// File with one manual description per line; rewritten with the
        /// manuals that failed
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Stage 2: open a project for editing and create its note templates
    Expand {
        project: String,

        /// Mark stage 2 complete
        #[arg(long)]
        finalize: bool,
    },

    /// Stage 2: edit a project's sections
    Section {
        #[command(subcommand)]
        action: SectionCommand,
    },

    /// Stage 3: generate section content, resuming where the last run stopped
    Generate {
        project: String,

        /// Regenerate every section from the first
        #[arg(long)]
        restart: bool,

        /// Review the finished manual and flag weak sections
        #[arg(long)]
        review: bool,

        /// Regenerate sections flagged by a review
        #[arg(long)]
        refine: bool,
    },

    /// Stage 4: render the manual
    Render {
        project: String,

        /// Output directory (default: <workspace>/generated_documents)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// docx, rtf, or markdown
        #[arg(short, long, default_value = "docx")]
        format: String,
    },

    /// Show one project's progress, or every project's
    Status { project: Option<String> },

    /// List projects
    List {
        /// Only projects currently in this stage (1-4)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
        stage: Option<u8>,
    },

    /// Move a project aside as completed
    Archive { project: String },

    /// Return a project to the start of stage 1
    Reset { project: String },

    /// Read, change, or validate the company configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },

    /// Inspect or set shared variables
    Variables {
        #[command(subcommand)]
        action: VariablesCommand,
    },

    /// Test the connection to the generation service
    Check,
}

#[derive(Subcommand)]
enum SectionCommand {
    /// Add a section
    Add {
        project: String,
        number: String,
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Change a section's title, description, or content
    Edit {
        project: String,
        number: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Replace the content; an empty string sends the section back to pending
        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,
        /// Replace the content with a file's text
        #[arg(long)]
        content_file: Option<PathBuf>,
    },
    /// Remove a section
    Remove { project: String, number: String },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the value at a dotted path
    Get { path: String },
    /// Set the value at a dotted path (JSON literals are parsed, anything else is a string)
    Set { path: String, value: String },
    /// Validate the configuration
    Validate,
    /// List the declared fields with their current values
    Fields,
}

#[derive(Subcommand)]
enum VariablesCommand {
    /// List variables
    List {
        /// Only variables produced for this manual
        #[arg(long)]
        manual: Option<String>,
    },
    /// Set a variable's value
    Set { name: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let workspace = workspace(&cli);
    match &cli.command {
        Commands::Init {
            organogram,
            manuals,
            description,
            input,
        } => {
            cmd_init(
                &cli,
                &workspace,
                organogram.as_deref(),
                manuals,
                description.as_deref(),
                input.as_deref(),
            )
            .await?;
        }
        Commands::Expand { project, finalize } => cmd_expand(&workspace, project, *finalize)?,
        Commands::Section { action } => cmd_section(&workspace, action)?,
        Commands::Generate {
            project,
            restart,
            review,
            refine,
        } => {
            let options = GenerateOptions {
                restart: *restart,
                review: *review,
                refine: *refine,
            };
            cmd_generate(&cli, &workspace, project, options).await?;
        }
        Commands::Render {
            project,
            output,
            format,
        } => cmd_render(&workspace, project, output.clone(), format)?,
        Commands::Status { project } => cmd_status(&workspace, project.as_deref())?,
        Commands::List { stage } => cmd_list(&workspace, *stage)?,
        Commands::Archive { project } => {
            let layout = open_project(&workspace, project)?;
            let target = workspace.archive(&layout)?;
            println!("Archived {} to {}", layout.name(), target.display());
        }
        Commands::Reset { project } => {
            let layout = open_project(&workspace, project)?;
            layout.status_store().reset()?;
            println!("Project {} reset to stage 1", layout.name());
        }
        Commands::Config { action } => cmd_config(&workspace, action)?,
        Commands::Variables { action } => cmd_variables(&workspace, action)?,
        Commands::Check => cmd_check(&cli, &workspace).await?,
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn workspace(cli: &Cli) -> Workspace {
    let ws = Workspace::new(&cli.workspace);
    match &cli.config {
        Some(path) => ws.with_config_path(path),
        None => ws,
    }
}

fn open_config(workspace: &Workspace) -> anyhow::Result<ConfigStore> {
    Ok(ConfigStore::open(workspace.config_path())?)
}

fn settings(cli: &Cli, config: &ConfigStore) -> GenerationSettings {
    let mut settings = GenerationSettings::from_store(config).with_env_overrides();
    if let Some(url) = &cli.base_url {
        settings.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(model) = &cli.model {
        settings.model = model.clone();
    }
    settings
}

fn build_generator(cli: &Cli, workspace: &Workspace) -> anyhow::Result<SharedGenerator> {
    let config = open_config(workspace)?;
    let settings = settings(cli, &config);
    tracing::debug!(base_url = %settings.base_url, model = %settings.model, "Generation service");
    let client = ChatCompletionsClient::new(&settings)?;
    Ok(Arc::new(RetryingGenerator::new(
        client,
        settings.max_retries,
        BackoffPolicy::default(),
    )))
}

/// Layout of an existing project.
fn open_project(workspace: &Workspace, name: &str) -> anyhow::Result<ProjectLayout> {
    let layout = workspace.project(name);
    if !layout.dir().is_dir() {
        anyhow::bail!(
            "No project '{}' in {} (try `folio list`)",
            name,
            workspace.root().display()
        );
    }
    Ok(layout)
}

// ---------------------------------------------------------------------------
// Stage 1
// ---------------------------------------------------------------------------

async fn cmd_init(
    cli: &Cli,
    workspace: &Workspace,
    organogram_path: Option<&Path>,
    manuals: &[String],
    description: Option<&str>,
    input: Option<&Path>,
) -> anyhow::Result<()> {
    if manuals.is_empty() && description.is_none() && input.is_none() {
        anyhow::bail!("Nothing to initiate: pass --manuals, --description, or --input");
    }

    let generator = build_generator(cli, workspace)?;
    if let Err(e) = generator.check_connection().await {
        println!("Cannot reach the generation service: {e}");
        std::process::exit(1);
    }

    let organogram_path = organogram_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| workspace.organogram_path());
    let organogram = if manuals.is_empty() {
        Organogram::load_or_default(&organogram_path)
    } else {
        Organogram::load(&organogram_path)?
    };
    let initiator = Initiator::new(generator, workspace.clone(), organogram);

    let mut report = BatchReport::default();
    if let Some(desc) = description {
        match initiator.initiate(desc).await {
            Ok(InitiateOutcome::Created {
                project,
                sections,
                variables,
                variables_error,
            }) => {
                println!("Created {project}: {sections} sections, {variables} variables");
                if let Some(e) = variables_error {
                    println!("  Variables could not be generated: {e}");
                }
                report.initialized.push(project);
            }
            Ok(InitiateOutcome::Skipped { project }) => report.skipped.push(project),
            Err(e) => report.failed.push((desc.to_string(), e.to_string())),
        }
    }
    if !manuals.is_empty() {
        merge_reports(&mut report, initiator.initiate_catalog(manuals).await);
    }
    if let Some(path) = input {
        let descriptions = read_input_file(path)?;
        if descriptions.is_empty() {
            println!("No manuals listed in {}", path.display());
        }
        let batch = initiator.initiate_batch(&descriptions).await;
        let remaining: Vec<String> = batch.failed.iter().map(|(d, _)| d.clone()).collect();
        write_remaining(path, &remaining)?;
        merge_reports(&mut report, batch);
    }

    print_batch(&report);
    if !report.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn merge_reports(into: &mut BatchReport, from: BatchReport) {
    into.initialized.extend(from.initialized);
    into.skipped.extend(from.skipped);
    into.failed.extend(from.failed);
}

fn print_batch(report: &BatchReport) {
    println!("\nInitialized: {}", report.initialized.len());
    for name in &report.initialized {
        println!("  + {name}");
    }
    if !report.skipped.is_empty() {
        println!("Skipped (already exist): {}", report.skipped.len());
        for name in &report.skipped {
            println!("  = {name}");
        }
    }
    if !report.failed.is_empty() {
        println!("Failed: {}", report.failed.len());
        for (manual, error) in &report.failed {
            println!("  x {manual}: {error}");
        }
    }
}

// ---------------------------------------------------------------------------
// Stage 2
// ---------------------------------------------------------------------------

fn cmd_expand(workspace: &Workspace, project: &str, finalize: bool) -> anyhow::Result<()> {
    let session = ExpandSession::open(open_project(workspace, project)?)?;
    let status = session.status();
    println!("Project: {}", session.layout().name());
    println!("Manual: {}", status.manual_description);
    if !status.stale_stages.is_empty() {
        let stale: Vec<String> = status.stale_stages.iter().map(|s| s.to_string()).collect();
        println!("Warning: output of {} may be out of date", stale.join(", "));
    }

    println!("\nSections:");
    for unit in session.sections().units() {
        let indent = "  ".repeat(unit.depth().saturating_sub(1));
        println!("  {indent}{} {}", unit.number, unit.title);
    }
    println!("\nNotes:");
    for path in Notes::paths(&session.layout().notes_dir()) {
        println!("  {}", path.display());
    }

    if finalize {
        session.finalize()?;
        println!("\nStage 2 complete; run `folio generate {project}` next");
    }
    Ok(())
}

fn cmd_section(workspace: &Workspace, action: &SectionCommand) -> anyhow::Result<()> {
    match action {
        SectionCommand::Add {
            project,
            number,
            title,
            description,
        } => {
            let mut session = ExpandSession::open(open_project(workspace, project)?)?;
            session.add(SectionUnit::new(number.as_str(), title.as_str(), description.as_str()))?;
            println!("Added section {number}");
        }
        SectionCommand::Edit {
            project,
            number,
            title,
            description,
            content,
            content_file,
        } => {
            let content = match content_file {
                Some(path) => Some(std::fs::read_to_string(path)?),
                None => content.clone(),
            };
            let mut session = ExpandSession::open(open_project(workspace, project)?)?;
            let unit = session.update(
                number,
                SectionEdit {
                    title: title.clone(),
                    description: description.clone(),
                    content,
                },
            )?;
            println!("Updated section {} ({:?}, {} words)", unit.number, unit.status, unit.word_count);
        }
        SectionCommand::Remove { project, number } => {
            let mut session = ExpandSession::open(open_project(workspace, project)?)?;
            let unit = session.remove(number)?;
            println!("Removed section {} {}", unit.number, unit.title);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stage 3
// ---------------------------------------------------------------------------

async fn cmd_generate(
    cli: &Cli,
    workspace: &Workspace,
    project: &str,
    options: GenerateOptions,
) -> anyhow::Result<()> {
    let layout = open_project(workspace, project)?;
    let generator = build_generator(cli, workspace)?;

    let stage_workspace = workspace.clone();
    let stage_layout = layout.clone();
    let (task, mut events) = StageTask::spawn_subscribed(move |events, cancel| async move {
        ContentStage::new(generator, stage_workspace)
            .with_events(events)
            .with_cancellation(cancel)
            .run(&stage_layout, options)
            .await
    });

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    // First Ctrl+C stops after the current section, second force-exits.
    let cancel = task.cancellation_token();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_signal.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nStopping after the current section (Ctrl+C again to force)...");
            cancel.cancel();
        }
    });

    let outcome = task.join().await??;
    printer.await.ok();

    let run = &outcome.run;
    println!(
        "\nGenerated {} section(s), skipped {}, failed {}",
        run.generated,
        run.skipped,
        run.failed.len()
    );
    for failure in &run.failed {
        println!("  x {}: {}", failure.number, failure.message);
    }
    if let Some(review) = &outcome.review {
        println!(
            "Review: quality {}, {} section(s) flagged",
            review.review.overall_quality,
            review.flagged.len()
        );
        for improvement in &review.unmatched {
            println!("  ? unknown section {}: {}", improvement.section, improvement.suggestion);
        }
    }
    if let Some(refine) = &outcome.refine {
        println!("Refined {} section(s)", refine.generated);
    }

    if outcome.stage_completed {
        println!("Stage 3 complete; run `folio render {}` next", layout.name());
    } else {
        let pending = pending_numbers(&layout.load_sections()?);
        println!(
            "{} section(s) still pending; run `folio generate {}` to resume",
            pending.len(),
            layout.name()
        );
    }
    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::RunStarted {
            start_index, total, ..
        } => println!("Generating sections {}..{} of {}", start_index + 1, total, total),
        ProgressEvent::UnitStarted { number, title, .. } => {
            println!("  > {number} {title}");
        }
        ProgressEvent::UnitCompleted {
            number, word_count, ..
        } => println!("    {number}: {word_count} words"),
        ProgressEvent::UnitFailed { number, error, .. } => {
            println!("    {number}: failed ({error})");
        }
        ProgressEvent::RunCancelled { next_index, .. } => {
            println!("Stopped; next run resumes at section {}", next_index + 1);
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Stage 4
// ---------------------------------------------------------------------------

fn cmd_render(
    workspace: &Workspace,
    project: &str,
    output: Option<PathBuf>,
    format: &str,
) -> anyhow::Result<()> {
    let layout = open_project(workspace, project)?;
    let config = open_config(workspace)?;
    let options = RenderOptions {
        output_dir: output,
        format: format.parse::<DocumentFormat>()?,
    };
    let outcome = render_project(workspace, &layout, &config, &options)?;

    println!("Created {}", outcome.document.display());
    println!("Data: {}", outcome.data.display());
    println!(
        "{} sections, {} words, {} needing revision",
        outcome.statistics.total_sections,
        outcome.statistics.total_words,
        outcome.statistics.sections_needing_revision
    );
    if !outcome.unresolved.is_empty() {
        println!("Unresolved placeholders ({}):", outcome.unresolved.len());
        for placeholder in &outcome.unresolved {
            println!("  {placeholder}");
        }
        println!("Set them with `folio variables set` or `folio config set`.");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Project management
// ---------------------------------------------------------------------------

fn cmd_status(workspace: &Workspace, project: Option<&str>) -> anyhow::Result<()> {
    let Some(project) = project else {
        return cmd_list(workspace, None);
    };
    let layout = open_project(workspace, project)?;
    let Some(status) = layout.status_store().load()? else {
        println!("{}: not started", layout.name());
        return Ok(());
    };

    println!("Project: {}", status.project_name);
    println!("Manual: {}", status.manual_description);
    println!("Current: {}", status.stage);
    println!("Phase: {}", status.phase);
    println!("Progress: {}/{}", status.completed_count, status.total_count);
    for stage in Stage::ALL {
        let state = match status.state_of(stage) {
            Some(state) => format!("{state:?}"),
            None => "-".to_string(),
        };
        let stale = if status.is_stale(stage) { " (stale)" } else { "" };
        println!("  {} {:<22} {state}{stale}", stage.ordinal(), stage.name());
    }
    if let Some(unit) = &status.current_unit {
        println!("Last section: {unit}");
    }
    if let Some(updated) = &status.last_updated {
        println!("Updated: {updated}");
    }
    let pending = pending_numbers(&layout.load_sections()?);
    if !pending.is_empty() && status.stage >= Stage::Generate {
        println!("Pending sections: {}", pending.join(", "));
    }
    Ok(())
}

fn cmd_list(workspace: &Workspace, stage: Option<u8>) -> anyhow::Result<()> {
    let stage = stage.and_then(Stage::from_ordinal);
    let projects = workspace.list_projects(stage)?;
    if projects.is_empty() {
        println!("No projects in {}", workspace.root().display());
        return Ok(());
    }
    for summary in &projects {
        match (&summary.status, &summary.error) {
            (Some(status), _) => println!(
                "{:<32} stage {} {:<24} {}/{}",
                summary.layout.name(),
                status.stage.ordinal(),
                status.phase,
                status.completed_count,
                status.total_count
            ),
            (None, Some(error)) => println!("{:<32} unreadable: {error}", summary.layout.name()),
            (None, None) => println!("{:<32} not started", summary.layout.name()),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Configuration and variables
// ---------------------------------------------------------------------------

fn cmd_config(workspace: &Workspace, action: &ConfigCommand) -> anyhow::Result<()> {
    let mut store = open_config(workspace)?;
    match action {
        ConfigCommand::Get { path } => match store.get(path) {
            Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
            None => println!("(not set)"),
        },
        ConfigCommand::Set { path, value } => {
            let parsed = serde_json::from_str::<serde_json::Value>(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
            store.set(path, parsed)?;
            store.save()?;
            println!("Set {path}");
        }
        ConfigCommand::Validate => {
            let result = store.validate();
            for error in result.errors() {
                println!("[ERROR] {error}");
            }
            for warning in result.warnings() {
                println!("[WARN] {warning}");
            }
            if !result.is_valid() {
                std::process::exit(1);
            }
            println!("Configuration is valid");
        }
        ConfigCommand::Fields => {
            let catalog = FieldCatalog::standard();
            for (category, fields) in catalog.categories() {
                println!("{category}:");
                for field in fields {
                    let info = catalog.field_info(&store, &field.path);
                    let value = info
                        .value
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "-".into());
                    let required = if info.is_required { " *" } else { "" };
                    println!("  {}{required} = {value}", field.path);
                }
            }
        }
    }
    Ok(())
}

fn cmd_variables(workspace: &Workspace, action: &VariablesCommand) -> anyhow::Result<()> {
    let mut store = workspace.variables()?;
    match action {
        VariablesCommand::List { manual } => {
            let vars: Vec<_> = match manual {
                Some(m) => store.for_manual(m).collect(),
                None => store.iter().collect(),
            };
            if vars.is_empty() {
                println!("No variables");
            }
            for (name, var) in vars {
                let origin = match var.origin {
                    VariableOrigin::Generated => "generated",
                    VariableOrigin::Organogram => "organogram",
                    VariableOrigin::User => "user",
                };
                println!("{name:<28} {:<28} [{}, {origin}]", var.default_value, var.category);
            }
        }
        VariablesCommand::Set { name, value } => {
            store.set_default(name, value.as_str());
            store.save()?;
            println!("Set {name}");
        }
    }
    Ok(())
}

async fn cmd_check(cli: &Cli, workspace: &Workspace) -> anyhow::Result<()> {
    let config = open_config(workspace)?;
    let settings = settings(cli, &config);
    let client = ChatCompletionsClient::new(&settings)?;
    println!("Checking {} (model {})", settings.base_url, settings.model);
    match client.check_connection().await {
        Ok(()) => println!("Connection OK"),
        Err(e) => {
            println!("Connection failed: {e}");
            std::process::exit(1);
        }
    }
    Ok(())
}
