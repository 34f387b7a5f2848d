//! Pending runtime errors awaiting a fix round-trip

use std::fmt::Write;
use tokio::sync::{watch, RwLock};
use tracing::info;
use workbench_types::CodeError;

/// Deduplicated list of detected runtime failures
///
/// Two errors are the same error when their `content` matches; the first one
/// pushed wins. Every push, duplicate or not, bumps a generation counter
/// observers can use to tell whether anything failed in a time window.
pub struct CodeErrorQueue {
    errors: RwLock<Vec<CodeError>>,
    generation: watch::Sender<u64>,
}

impl CodeErrorQueue {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            errors: RwLock::new(Vec::new()),
            generation,
        }
    }

    /// Append an error unless one with the same content is pending
    pub async fn push(&self, error: CodeError) -> bool {
        self.generation.send_modify(|g| *g += 1);

        let mut errors = self.errors.write().await;
        if errors.iter().any(|e| e.content == error.content) {
            return false;
        }
        info!("Code error from {}: {}", error.source, error.title);
        errors.push(error);
        true
    }

    pub async fn list(&self) -> Vec<CodeError> {
        self.errors.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.errors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.errors.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.errors.write().await.clear();
    }

    /// Remove and return everything pending, e.g. to forward as a fix request
    pub async fn take(&self) -> Vec<CodeError> {
        std::mem::take(&mut *self.errors.write().await)
    }

    /// Number of pushes so far
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}

impl Default for CodeErrorQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn pending errors into a fix request for the AI layer
///
/// Returns `None` for an empty list; callers must skip sending in that case.
pub fn fix_errors_message(errors: &[CodeError]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }

    let mut message = if errors.len() == 1 {
        String::from("The running application reported an error. Please fix it.\n")
    } else {
        format!(
            "The running application reported {} errors. Please fix them.\n",
            errors.len()
        )
    };

    for error in errors {
        let _ = write!(
            message,
            "\n### {} ({})\n{}\n```\n{}\n```\n",
            error.title,
            error.source,
            error.description,
            error.content.trim_end()
        );
    }

    Some(message)
}
