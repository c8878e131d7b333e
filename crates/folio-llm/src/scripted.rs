//! A queue-driven [`TextGenerator`] for tests and dry runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use folio_types::{FolioError, Result};

use crate::{GenerationRequest, TextGenerator};

const ENDPOINT: &str = "scripted://generator";

/// One scripted reaction to a generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Reply(String),
    /// Fail as if the service could not be reached (retryable).
    Unreachable,
    /// Fail as if the service answered with nothing.
    Empty,
}

impl Step {
    pub fn reply(text: impl Into<String>) -> Self {
        Step::Reply(text.into())
    }
}

type Fallback = Box<dyn Fn(&GenerationRequest) -> Step + Send + Sync>;

/// Replays queued [`Step`]s in order, then defers to a fallback (or fails as
/// unreachable when none is set). Every prompt is recorded.
pub struct ScriptedGenerator {
    steps: Mutex<VecDeque<Step>>,
    fallback: Option<Fallback>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer every call with `f` once the queue is drained.
    pub fn with_fallback(
        mut self,
        f: impl Fn(&GenerationRequest) -> Step + Send + Sync + 'static,
    ) -> Self {
        self.fallback = Some(Box::new(f));
        self
    }

    /// A generator that echoes a fixed reply forever.
    pub fn always(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(Vec::<Step>::new()).with_fallback(move |_| Step::Reply(text.clone()))
    }

    pub fn push(&self, step: Step) {
        self.steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.prompt.clone());

        let queued = self
            .steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let step = match (queued, &self.fallback) {
            (Some(step), _) => step,
            (None, Some(fallback)) => fallback(request),
            (None, None) => Step::Unreachable,
        };

        match step {
            Step::Reply(text) => Ok(text),
            Step::Unreachable => Err(FolioError::Connectivity {
                endpoint: ENDPOINT.into(),
                message: "connection refused".into(),
                retryable: true,
            }),
            Step::Empty => Err(FolioError::EmptyResponse {
                endpoint: ENDPOINT.into(),
            }),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
