//! Typed failures reported by worker tasks.

use std::any::Any;

/// Pipeline stage a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    FetchResults,
    ResolveSchedule,
    DeckImage,
    Persist,
    Acknowledge,
    /// The task panicked; caught at the task boundary.
    Panic,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::FetchResults => "fetch_results",
            Stage::ResolveSchedule => "resolve_schedule",
            Stage::DeckImage => "deck_image",
            Stage::Persist => "persist",
            Stage::Acknowledge => "acknowledge",
            Stage::Panic => "panic",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the message a task was spawned for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLabel {
    pub message_id: String,
    pub event_id: u64,
}

/// One failed message, as delivered to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub message_id: String,
    pub event_id: u64,
    pub stage: Stage,
    /// The deck code or player id the stage was working on, if any.
    pub subject: Option<String>,
    pub error: String,
}

impl WorkerFailure {
    pub fn new(label: &TaskLabel, stage: Stage, error: impl std::fmt::Display) -> Self {
        Self {
            message_id: label.message_id.clone(),
            event_id: label.event_id,
            stage,
            subject: None,
            error: error.to_string(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub(crate) fn panicked(label: &TaskLabel, payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&'static str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::new(label, Stage::Panic, format!("panic recovered: {message}"))
    }
}

impl std::fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} failed for event {} (message {})",
            self.stage, self.event_id, self.message_id
        )?;
        if let Some(ref subject) = self.subject {
            write!(f, " [{subject}]")?;
        }
        write!(f, ": {}", self.error)
    }
}
