//! `.gitignore` subset used to filter pushed files

use glob::{MatchOptions, Pattern};
use tracing::debug;

/// Always excluded, whatever the project's ignore file says
pub const DEFAULT_IGNORES: &[&str] = &[
    ".git/",
    "node_modules/",
    "dist/",
    "build/",
    ".cache/",
    "coverage/",
    "*.log",
    ".DS_Store",
    ".env.local",
];

const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    negated: bool,
    dir_only: bool,
    /// Matched against the whole relative path instead of any single component
    anchored: bool,
}

impl Rule {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (negated, line) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let (dir_only, line) = match line.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let anchored = line.contains('/');
        let line = line.trim_start_matches('/');
        if line.is_empty() {
            return None;
        }

        match Pattern::new(line) {
            Ok(pattern) => Some(Self {
                pattern,
                negated,
                dir_only,
                anchored,
            }),
            Err(e) => {
                debug!("Skipping invalid ignore pattern {:?}: {}", line, e);
                None
            }
        }
    }

    fn matches(&self, path: &str) -> bool {
        let components: Vec<&str> = path.split('/').collect();
        // Directory rules never match the file itself, only its ancestors
        let candidates = if self.dir_only {
            components.len().saturating_sub(1)
        } else {
            components.len()
        };

        if self.anchored {
            (1..=candidates).any(|n| {
                self.pattern
                    .matches_with(&components[..n].join("/"), MATCH)
            })
        } else {
            components[..candidates]
                .iter()
                .any(|c| self.pattern.matches_with(c, MATCH))
        }
    }
}

/// Ordered ignore rules; later rules override earlier ones
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
}

impl IgnoreRules {
    /// Default rules followed by those parsed from `gitignore`
    pub fn parse(gitignore: Option<&str>) -> Self {
        let rules = DEFAULT_IGNORES
            .iter()
            .copied()
            .chain(gitignore.into_iter().flat_map(str::lines))
            .filter_map(Rule::parse)
            .collect();
        Self { rules }
    }

    /// Whether a `/`-separated path relative to the project root is ignored
    pub fn is_ignored(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        let mut ignored = false;
        for rule in &self.rules {
            if rule.negated == ignored && rule.matches(path) {
                ignored = !rule.negated;
            }
        }
        ignored
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::parse(None)
    }
}
