//! Runtime failures detected in the sandbox

use serde::{Deserialize, Serialize};

/// Where a code error was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSource {
    Preview,
    Terminal,
}

impl std::fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSource::Preview => write!(f, "preview"),
            ErrorSource::Terminal => write!(f, "terminal"),
        }
    }
}

/// A detected runtime failure, deduplicated by `content`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeError {
    pub title: String,
    pub description: String,
    pub content: String,
    pub source: ErrorSource,
}

impl CodeError {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        content: impl Into<String>,
        source: ErrorSource,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            content: content.into(),
            source,
        }
    }
}
