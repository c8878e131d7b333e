//! End-to-end integration tests for the Folio pipeline.
//!
//! Each test drives real project directories in a temp workspace through the
//! stage drivers with a scripted generator: initiate -> expand -> generate ->
//! render, plus interruption and resume.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Semaphore;

use folio_config::ConfigStore;
use folio_llm::{GenerationRequest, ScriptedGenerator, Step, TextGenerator};
use folio_pipeline::{
    render_project, ContentStage, DocumentFormat, ExpandSession, GenerateOptions, Initiator,
    ProgressEvent, RenderOptions, StageTask,
};
use folio_project::{Organogram, ProjectLayout, SectionSet, StatusUpdate, Workspace};
use folio_types::{FolioError, SectionStatus, SectionUnit, Stage};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const OUTLINE: &str = r#"Here is the outline:
```json
{"sections": [
  {"number": "1", "title": "Introduction", "description": "Purpose and scope"},
  {"number": "1.1", "title": "Applicability", "description": "Who is covered"},
  {"number": "2", "title": "Annual Leave", "description": "Entitlement and booking"}
]}
```"#;

const VARIABLES: &str = r#"{"variables": {
  "EFFECTIVE_DATE": {"description": "Date the policy takes effect", "default_value": "[EFFECTIVE DATE]", "category": "policy"}
}}"#;

fn organogram() -> Organogram {
    serde_json::from_value(json!({
        "departments": {
            "hr": {"roles": {"hr_manager": {"title": "HR Manager", "name": "Jane Doe", "email": "jane@acme.test"}}}
        },
        "responsibility_matrix": {"policy_types": {"hr_policies": {"owner": "hr_manager"}}},
        "manuals": {"hr": {"name": "HR Manual", "description": "Human resources policies"}}
    }))
    .expect("organogram fixture")
}

/// A project that has finished stage 2 with `n` pending sections titled
/// `Topic 1..n`.
fn expanded_project(workspace: &Workspace, n: usize) -> ProjectLayout {
    let layout = workspace.project("handbook");
    layout.create().unwrap();
    let store = layout.status_store();
    store.begin("Employee handbook").unwrap();
    let units = (1..=n)
        .map(|i| SectionUnit::new(i.to_string(), format!("Topic {i}"), format!("About topic {i}")))
        .collect();
    layout.save_sections(&SectionSet::new(units).unwrap()).unwrap();
    store
        .complete(Stage::Initiate, StatusUpdate::new().progress(0, n))
        .unwrap();
    store.advance(Stage::Expand).unwrap();
    store.complete(Stage::Expand, StatusUpdate::new()).unwrap();
    layout
}

fn statuses(layout: &ProjectLayout) -> Vec<SectionStatus> {
    layout
        .load_sections()
        .unwrap()
        .units()
        .iter()
        .map(|u| u.status)
        .collect()
}

/// Answers the first call at once and blocks every later call until a permit
/// is released.
struct GatedGenerator {
    calls: AtomicUsize,
    gate: Semaphore,
}

#[async_trait]
impl TextGenerator for GatedGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> folio_types::Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n >= 1 {
            self.gate
                .acquire()
                .await
                .map_err(|e| FolioError::Other(e.to_string()))?
                .forget();
        }
        Ok(format!("Content of call {n}"))
    }

    fn name(&self) -> &str {
        "gated"
    }
}

// ---------------------------------------------------------------------------
// Test 1: Full pipeline from organogram catalogue to RTF
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_pipeline_produces_resolved_document() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path());

    // 1. Initiate from the catalogue; the unknown key fails on its own.
    let init_gen = Arc::new(ScriptedGenerator::new([
        Step::reply(OUTLINE),
        Step::reply(VARIABLES),
    ]));
    let initiator = Initiator::new(init_gen.clone(), workspace.clone(), organogram());
    let report = initiator.initiate_catalog(&["hr", "missing"]).await;
    assert_eq!(report.initialized, vec!["human_resources_policies".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "missing");
    assert_eq!(init_gen.call_count(), 2);

    let layout = workspace.project("human_resources_policies");
    let status = layout.status_store().load().unwrap().unwrap();
    assert!(status.is_completed(Stage::Initiate));
    assert_eq!(status.phase, "project_initialized");
    assert_eq!(status.total_count, 3);
    assert_eq!(status.field("policy_type"), Some(&json!("hr_policies")));

    let variables = workspace.variables().unwrap();
    assert_eq!(variables.get("OWNER_NAME").unwrap().default_value, "Jane Doe");
    assert!(variables.get("EFFECTIVE_DATE").is_some());

    // 2. Initiating again skips the existing project without any call.
    let again = initiator.initiate_catalog(&["hr"]).await;
    assert_eq!(again.skipped, vec!["human_resources_policies".to_string()]);
    assert_eq!(init_gen.call_count(), 2);

    // 3. Expand and finalize.
    ExpandSession::open(layout.clone()).unwrap().finalize().unwrap();

    // 4. Generate every section.
    let content_gen = Arc::new(ScriptedGenerator::always(
        "Owned by [OWNER NAME] at {COMPANY_NAME}.\n\nEffective [EFFECTIVE DATE].",
    ));
    let outcome = ContentStage::new(content_gen.clone(), workspace.clone())
        .run(&layout, GenerateOptions::default())
        .await
        .unwrap();
    assert!(outcome.stage_completed);
    assert!(outcome.is_success());
    assert_eq!(outcome.run.generated, 3);
    assert!(content_gen.prompts()[0].contains("HR Manager: Jane Doe"));

    // 5. Render.
    let config = ConfigStore::in_memory(json!({
        "organization": {"profile": {"name": "Acme"}}
    }));
    let rendered = render_project(
        &workspace,
        &layout,
        &config,
        &RenderOptions {
            output_dir: None,
            format: DocumentFormat::Rtf,
        },
    )
    .unwrap();

    let rtf = std::fs::read_to_string(&rendered.document).unwrap();
    assert!(rendered
        .document
        .ends_with("generated_documents/human_resources_policies_manual.rtf"));
    assert!(rtf.contains("Owned by Jane Doe at Acme."));
    assert!(rtf.contains("Section 1.1: Applicability"));
    assert_eq!(rendered.unresolved, vec!["[EFFECTIVE DATE]".to_string()]);

    let data: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&rendered.data).unwrap()).unwrap();
    assert_eq!(data["statistics"]["total_sections"], 3);
    assert_eq!(data["statistics"]["sections_needing_revision"], 0);

    let status = layout.status_store().load().unwrap().unwrap();
    assert_eq!(status.stage, Stage::Render);
    assert!(status.is_completed(Stage::Render));
    assert_eq!(status.phase, "documents_generated");

    // 6. Rendering again with the default format writes a Word package.
    let word = render_project(&workspace, &layout, &config, &RenderOptions::default()).unwrap();
    assert!(word
        .document
        .ends_with("generated_documents/human_resources_policies_manual.docx"));
    assert!(std::fs::read(&word.document).unwrap().starts_with(b"PK"));
    let status = layout.status_store().load().unwrap().unwrap();
    assert_eq!(status.field("output_format"), Some(&json!("docx")));
}

// ---------------------------------------------------------------------------
// Test 2: Resume after interruption never regenerates finished units
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resume_starts_at_first_pending_unit() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path());
    let layout = expanded_project(&workspace, 5);

    // First run: the service drops out after two sections.
    let first = Arc::new(ScriptedGenerator::new([
        Step::reply("one"),
        Step::reply("two"),
    ]));
    let outcome = ContentStage::new(first, workspace.clone())
        .run(&layout, GenerateOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.run.generated, 2);
    assert_eq!(outcome.run.failed.len(), 3);
    assert!(outcome.run.has_connectivity_failures());
    assert!(!outcome.stage_completed);
    assert!(!outcome.is_success());

    // Persisted state is authoritative.
    let sections = layout.load_sections().unwrap();
    assert_eq!(sections.resume_index(), 2);
    let status = layout.status_store().load().unwrap().unwrap();
    assert_eq!(status.completed_count, 2);
    assert!(!status.is_completed(Stage::Generate));

    // Second run picks up at unit 3.
    let second = Arc::new(ScriptedGenerator::always("resumed"));
    let outcome = ContentStage::new(second.clone(), workspace.clone())
        .run(&layout, GenerateOptions::default())
        .await
        .unwrap();
    assert_eq!(second.call_count(), 3);
    assert!(second.prompts()[0].contains("section 3: Topic 3"));
    assert!(outcome.stage_completed);

    let sections = layout.load_sections().unwrap();
    assert_eq!(sections.get("1").unwrap().content, "one");
    assert_eq!(sections.get("5").unwrap().content, "resumed");
}

#[tokio::test]
async fn generated_generated_pending_resumes_at_two() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path());
    let layout = expanded_project(&workspace, 3);

    let mut sections = layout.load_sections().unwrap();
    sections.unit_at_mut(0).unwrap().record_generated("a");
    sections.unit_at_mut(1).unwrap().record_generated("b");
    layout.save_sections(&sections).unwrap();
    assert_eq!(sections.resume_index(), 2);

    let gen = Arc::new(ScriptedGenerator::always("c"));
    let outcome = ContentStage::new(gen.clone(), workspace)
        .run(&layout, GenerateOptions::default())
        .await
        .unwrap();
    assert_eq!(gen.call_count(), 1);
    assert_eq!(outcome.run.start_index, 2);
    assert!(gen.prompts()[0].contains("Section 2: Topic 2 b"));
}

#[tokio::test]
async fn restart_regenerates_everything() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path());
    let layout = expanded_project(&workspace, 2);

    let gen = Arc::new(ScriptedGenerator::always("first"));
    ContentStage::new(gen, workspace.clone())
        .run(&layout, GenerateOptions::default())
        .await
        .unwrap();

    let gen = Arc::new(ScriptedGenerator::always("second"));
    let options = GenerateOptions {
        restart: true,
        ..GenerateOptions::default()
    };
    ContentStage::new(gen.clone(), workspace)
        .run(&layout, options)
        .await
        .unwrap();
    assert_eq!(gen.call_count(), 2);
    assert_eq!(layout.load_sections().unwrap().get("2").unwrap().content, "second");
}

// ---------------------------------------------------------------------------
// Test 3: Stage ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn skipping_a_stage_is_rejected_and_resave_keeps_progress() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Workspace::new(dir.path()).project("ordering");
    layout.create().unwrap();
    let store = layout.status_store();
    store.begin("Ordering").unwrap();
    store.save(StatusUpdate::new().progress(1, 3)).unwrap();

    let err = store.advance(Stage::Generate).unwrap_err();
    assert!(matches!(err, FolioError::InvalidTransition { .. }));

    let status = store.advance(Stage::Initiate).unwrap();
    assert_eq!(status.stage, Stage::Initiate);
    assert_eq!(status.completed_count, 1);

    // Generation refuses to start before expansion completes.
    let gen = Arc::new(ScriptedGenerator::always("x"));
    let err = ContentStage::new(gen.clone(), Workspace::new(dir.path()))
        .run(&layout, GenerateOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_clean());
    assert_eq!(gen.call_count(), 0);
}

#[tokio::test]
async fn revisiting_expansion_flags_generation_stale() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path());
    let layout = expanded_project(&workspace, 2);
    let gen = Arc::new(ScriptedGenerator::always("text"));
    ContentStage::new(gen.clone(), workspace.clone())
        .run(&layout, GenerateOptions::default())
        .await
        .unwrap();

    // 1. Re-open stage 2 after stage 3 completed.
    let mut session = ExpandSession::open(layout.clone()).unwrap();
    assert_eq!(session.status().revisiting, Some(Stage::Expand));
    assert!(session.status().is_stale(Stage::Generate));
    assert!(session.status().is_completed(Stage::Generate));
    session.add(SectionUnit::new("3", "Topic 3", "New")).unwrap();
    let status = session.finalize().unwrap();
    assert_eq!(status.stage, Stage::Generate);
    assert!(status.is_stale(Stage::Generate));

    // 2. Generating again fills the new section and clears the flag.
    let outcome = ContentStage::new(gen.clone(), workspace)
        .run(&layout, GenerateOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.run.generated, 1);
    let status = layout.status_store().load().unwrap().unwrap();
    assert!(!status.is_stale(Stage::Generate));
    assert_eq!(status.completed_count, 3);
}

// ---------------------------------------------------------------------------
// Test 4: Review and refine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn review_flags_and_refine_rewrites() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path());
    let layout = expanded_project(&workspace, 2);

    let gen = Arc::new(ScriptedGenerator::new([
        Step::reply("one"),
        Step::reply("two"),
        Step::reply(
            r#"{"issues_found": true,
                "improvements": [{"section": "2", "suggestion": "Say who approves"}],
                "overall_quality": "fair", "summary": "ok"}"#,
        ),
        Step::reply("two, with approver"),
    ]));
    let options = GenerateOptions {
        review: true,
        refine: true,
        ..GenerateOptions::default()
    };
    let outcome = ContentStage::new(gen.clone(), workspace)
        .run(&layout, options)
        .await
        .unwrap();

    assert_eq!(outcome.review.unwrap().flagged, vec!["2".to_string()]);
    assert_eq!(outcome.refine.unwrap().generated, 1);
    assert!(gen.prompts()[3].contains("Say who approves"));

    let sections = layout.load_sections().unwrap();
    let refined = sections.get("2").unwrap();
    assert_eq!(refined.status, SectionStatus::Refined);
    assert_eq!(refined.content, "two, with approver");
    assert!(!refined.needs_revision);
    assert_eq!(sections.get("1").unwrap().status, SectionStatus::Generated);
    assert_eq!(
        layout.status_store().load().unwrap().unwrap().phase,
        "content_refined"
    );
}

// ---------------------------------------------------------------------------
// Test 5: Cancellation through a stage task
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_task_stops_between_units() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path());
    let layout = expanded_project(&workspace, 4);

    let gen = Arc::new(GatedGenerator {
        calls: AtomicUsize::new(0),
        gate: Semaphore::new(0),
    });
    let task_gen = gen.clone();
    let task_layout = layout.clone();
    let task = StageTask::spawn(move |events, cancel| async move {
        ContentStage::new(task_gen, workspace)
            .with_events(events)
            .with_cancellation(cancel)
            .run(&task_layout, GenerateOptions::default())
            .await
    });

    // 1. Wait until the second unit is in flight.
    for _ in 0..400 {
        if gen.calls.load(Ordering::SeqCst) >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(gen.calls.load(Ordering::SeqCst), 2);

    // 2. Cancel, then let the in-flight unit finish.
    let mut events = task.subscribe();
    task.cancel();
    gen.gate.add_permits(1);
    let outcome = task.join().await.unwrap().unwrap();

    assert!(outcome.run.cancelled);
    assert_eq!(outcome.run.generated, 2);
    assert_eq!(outcome.run.next_index, 2);
    assert!(!outcome.stage_completed);
    assert_eq!(gen.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        statuses(&layout),
        vec![
            SectionStatus::Generated,
            SectionStatus::Generated,
            SectionStatus::Pending,
            SectionStatus::Pending,
        ]
    );

    let mut seen_cancel = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ProgressEvent::RunCancelled { next_index: 2, .. }) {
            seen_cancel = true;
        }
    }
    assert!(seen_cancel);
}
