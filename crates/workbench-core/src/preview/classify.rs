//! Classification of runtime error reports from a preview

use regex::Regex;
use workbench_types::{PreviewMessage, PreviewMessageKind};

/// How a preview error report is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Server/client render mismatch; recovered by reloading the preview
    Hydration,
    /// Surfaced to the user as a code error
    Runtime,
    /// Noise that is not worth surfacing
    Ignore,
}

pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, message: &PreviewMessage) -> ErrorClass;
}

/// Message-text heuristics
///
/// Matching on text is locale and framework-version dependent; treat the
/// patterns as a placeholder and install a structured classifier where the
/// runtime reports error codes.
pub struct HeuristicClassifier {
    hydration: Option<Regex>,
    console: Option<Regex>,
}

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self {
            hydration: Regex::new(r"(?i)hydrat(ion|ing)|did not match.*server|server.rendered").ok(),
            console: Regex::new(
                r"(?i)(query|fetch|request|supabase|graphql).*(fail|error)|(fail|error).*(query|fetch|request)",
            )
            .ok(),
        }
    }

    fn matches(pattern: &Option<Regex>, text: &str) -> bool {
        pattern.as_ref().is_some_and(|re| re.is_match(text))
    }
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier for HeuristicClassifier {
    fn classify(&self, message: &PreviewMessage) -> ErrorClass {
        if Self::matches(&self.hydration, &message.message) {
            return ErrorClass::Hydration;
        }
        match message.kind {
            PreviewMessageKind::UncaughtException | PreviewMessageKind::UnhandledRejection => {
                ErrorClass::Runtime
            }
            PreviewMessageKind::ConsoleError if Self::matches(&self.console, &message.message) => {
                ErrorClass::Runtime
            }
            PreviewMessageKind::ConsoleError => ErrorClass::Ignore,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(kind: PreviewMessageKind, text: &str) -> PreviewMessage {
        PreviewMessage {
            kind,
            message: text.to_string(),
            stack: None,
            pathname: None,
            port: None,
        }
    }

    #[test]
    fn test_heuristics() {
        let classifier = HeuristicClassifier::new();
        assert_eq!(
            classifier.classify(&message(
                PreviewMessageKind::ConsoleError,
                "Warning: Text content did not match. Hydration failed"
            )),
            ErrorClass::Hydration
        );
        assert_eq!(
            classifier.classify(&message(
                PreviewMessageKind::UncaughtException,
                "TypeError: cannot read properties of undefined"
            )),
            ErrorClass::Runtime
        );
        assert_eq!(
            classifier.classify(&message(
                PreviewMessageKind::ConsoleError,
                "Query failed: relation \"todos\" does not exist"
            )),
            ErrorClass::Runtime
        );
        assert_eq!(
            classifier.classify(&message(
                PreviewMessageKind::ConsoleError,
                "Download the React DevTools"
            )),
            ErrorClass::Ignore
        );
    }
}
