use std::fmt;

use uuid::Uuid;

use crate::path::KbPath;
use crate::storage::BlobKey;

/// The multi-step operation a [`Progress`] report belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Move { from: KbPath, to: KbPath },
    Delete { path: KbPath },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Move { from, to } => write!(f, "move '{}' -> '{}'", from, to),
            Operation::Delete { path } => write!(f, "delete '{}'", path),
        }
    }
}

/// One applied side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    BlobCopied { from: BlobKey, to: BlobKey },
    BlobDeleted { key: BlobKey },
    RecordMoved { id: Uuid, from: KbPath, to: KbPath },
    RecordDeleted { id: Uuid, path: KbPath },
}

/// What a stopped multi-step operation managed to apply.
///
/// Re-running the same call resumes the work; steps listed here are not repeated because the
/// records they touched no longer match the original request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub operation: Operation,
    pub completed: Vec<Step>,
    /// Path of the entry whose step failed or was about to run when the operation stopped.
    pub stopped_at: Option<KbPath>,
    pub cause: String,
    /// Blobs that may have been left without a referencing record.
    pub orphaned_blobs: Vec<BlobKey>,
}

impl Progress {
    pub(crate) fn new(operation: Operation) -> Self {
        Progress {
            operation,
            completed: Vec::new(),
            stopped_at: None,
            cause: String::new(),
            orphaned_blobs: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, step: Step) {
        self.completed.push(step);
    }

    pub(crate) fn stop(mut self, at: &KbPath, cause: impl fmt::Display) -> Box<Progress> {
        self.stopped_at = Some(at.clone());
        self.cause = cause.to_string();
        Box::new(self)
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Original paths of the records whose metadata step completed.
    pub fn processed_paths(&self) -> Vec<&KbPath> {
        self.completed
            .iter()
            .filter_map(|step| match step {
                Step::RecordMoved { from, .. } => Some(from),
                Step::RecordDeleted { path, .. } => Some(path),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stopped after {} step(s)", self.operation, self.completed.len())?;
        if let Some(at) = &self.stopped_at {
            write!(f, " at '{}'", at)?;
        }
        if !self.cause.is_empty() {
            write!(f, ": {}", self.cause)?;
        }
        Ok(())
    }
}
