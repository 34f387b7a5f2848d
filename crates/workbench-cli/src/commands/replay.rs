//! Replay command - Stream recorded AI actions into a project directory

use crate::sandbox::{load_directory, LocalBooter};
use crate::terminal::PtyBackend;
use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use workbench_core::{
    ActionOutcome, ActionRecord, ActionStatus, ArtifactKind, ArtifactPatch, Enqueued,
    SandboxEvent, WorkbenchOrchestrator,
};

pub struct ReplayOptions {
    pub stream: PathBuf,
    pub dir: PathBuf,
    pub archive: Option<PathBuf>,
    pub no_shell: bool,
}

/// One line of a recorded stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamRecord {
    Artifact {
        id: String,
        title: String,
        #[serde(default)]
        kind: ArtifactKind,
    },
    Action {
        #[serde(flatten)]
        record: ActionRecord,
        /// Partial delivery while the AI is still writing the action
        #[serde(default)]
        streaming: bool,
    },
    Close {
        id: String,
    },
    /// Runtime event injected into the sandbox (ports, page loads, errors)
    Sandbox {
        event: SandboxEvent,
    },
}

/// Parse a JSONL stream, skipping blank lines
pub fn parse_stream(content: &str) -> Result<Vec<StreamRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid stream record on line {}", i + 1))
        })
        .collect()
}

/// Every action must follow its artifact's registration
fn check_order(records: &[StreamRecord]) -> Result<()> {
    let mut registered = std::collections::HashSet::new();
    for record in records {
        match record {
            StreamRecord::Artifact { id, .. } => {
                registered.insert(id.as_str());
            }
            StreamRecord::Action { record, .. } if !registered.contains(record.artifact_id.as_str()) => {
                anyhow::bail!(
                    "Action {} references artifact {} before it is registered",
                    record.action_id,
                    record.artifact_id
                );
            }
            _ => {}
        }
    }
    Ok(())
}

pub async fn run(options: ReplayOptions) -> Result<()> {
    let content = tokio::fs::read_to_string(&options.stream)
        .await
        .with_context(|| format!("Failed to read stream {:?}", options.stream))?;
    let records = parse_stream(&content)?;
    check_order(&records)?;

    let dir = super::project_dir(&options.dir).await?;
    let config = super::engine_config(&dir)?;

    println!("{}", "▶ Replaying action stream...".cyan().bold());
    println!("  📁 Project: {}", dir.display().to_string().dimmed());

    let booter = Arc::new(LocalBooter::new(&dir));
    let sandbox = booter.sandbox();
    let orchestrator = WorkbenchOrchestrator::new(config, booter, Arc::new(PtyBackend::new()));

    orchestrator
        .files()
        .load(load_directory(&dir).await?)
        .await?;
    orchestrator
        .initialize()
        .await
        .context("Failed to boot sandbox")?;

    if options.no_shell {
        println!("  {}", "No runner shell: shell actions stay deferred".yellow());
    } else {
        orchestrator
            .attach_runner_shell()
            .await
            .context("Failed to attach runner shell")?;
    }

    let progress = ProgressBar::new(records.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("  {bar:30.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut tickets = Vec::new();
    for record in records {
        match record {
            StreamRecord::Artifact { id, title, kind } => {
                progress.set_message(title.clone());
                if !orchestrator.register_artifact(&id, &title, kind).await {
                    warn!("Artifact {} registered twice", id);
                }
            }
            StreamRecord::Action { record, streaming } => {
                let key = record.key();
                if let Enqueued::Queued(ticket) =
                    orchestrator.enqueue_action(record, streaming).await?
                {
                    tickets.push((key, ticket));
                }
            }
            StreamRecord::Close { id } => {
                orchestrator.update_artifact(&id, ArtifactPatch::closed()).await;
            }
            StreamRecord::Sandbox { event } => sandbox.emit(event),
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    let mut failures = 0;
    for (key, ticket) in tickets {
        match ticket.wait().await {
            Ok(Ok(ActionOutcome::Failed { exit_code, .. })) => {
                failures += 1;
                warn!("{} failed with exit code {:?}", key, exit_code);
            }
            Ok(Ok(outcome)) => info!("{} -> {:?}", key, outcome),
            Ok(Err(e)) if e.is_not_ready() => info!("{} deferred", key),
            Ok(Err(e)) | Err(e) => {
                failures += 1;
                warn!("{} failed: {}", key, e);
            }
        }
    }
    orchestrator.wait_idle().await;

    print_summary(&orchestrator).await;

    if let Some(path) = options.archive {
        let archive = orchestrator.download_archive().await?;
        tokio::fs::write(&path, &archive)
            .await
            .with_context(|| format!("Failed to write archive {:?}", path))?;
        println!(
            "  {} Archive written to {}",
            "📦".green(),
            path.display().to_string().cyan()
        );
    }

    orchestrator.dispose().await;

    if failures > 0 {
        anyhow::bail!("{} action(s) failed", failures);
    }
    println!("{}", "✅ Replay completed".green().bold());
    Ok(())
}

async fn print_summary(orchestrator: &WorkbenchOrchestrator) {
    println!();
    for artifact in orchestrator.artifacts().await {
        let state = if artifact.closed {
            "closed".dimmed()
        } else {
            "open".yellow()
        };
        println!("  {} {} ({})", "◆".cyan(), artifact.title.bold(), state);
        for action in &artifact.actions {
            let status = match &action.status {
                ActionStatus::Complete => "✓".green(),
                ActionStatus::Failed { .. } => "✗".red(),
                ActionStatus::Running => "…".yellow(),
                ActionStatus::Pending => "·".dimmed(),
            };
            println!("      {} {}", status, action.action.label());
        }
    }

    let deferred = orchestrator.deferred_actions().await;
    if !deferred.is_empty() {
        println!();
        println!(
            "  {} {} shell action(s) deferred",
            "⚠".yellow(),
            deferred.len()
        );
    }

    let errors = orchestrator.code_errors().await;
    if !errors.is_empty() {
        println!();
        println!("{}", "  Errors:".red().bold());
        for error in &errors {
            println!("    {} {}", "✗".red(), error.title);
            println!("      {}", error.description.dimmed());
        }
    }

    for preview in orchestrator.preview().previews().await {
        println!(
            "  {} Preview on port {}: {}",
            "🌐".cyan(),
            preview.port,
            preview.base_url
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use workbench_core::Action;

    #[test]
    fn test_parse_stream_records() {
        let content = r#"
{"type":"artifact","id":"a1","title":"Todo app"}
{"type":"action","artifactId":"a1","actionId":"0","action":{"type":"file","filePath":"src/main.ts","content":"x"},"streaming":true}
{"type":"action","artifactId":"a1","actionId":"1","action":{"type":"shell","command":"npm install"},"shouldExecute":false}

{"type":"sandbox","event":{"event":"page_loaded","port":5173}}
{"type":"close","id":"a1"}
"#;
        let records = parse_stream(content).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(
            records[0],
            StreamRecord::Artifact {
                id: "a1".to_string(),
                title: "Todo app".to_string(),
                kind: ArtifactKind::Response,
            }
        );
        match &records[1] {
            StreamRecord::Action { record, streaming } => {
                assert!(streaming);
                assert!(record.should_execute);
                assert_eq!(
                    record.action,
                    Action::File {
                        file_path: "src/main.ts".to_string(),
                        content: "x".to_string(),
                    }
                );
            }
            other => panic!("unexpected record {:?}", other),
        }
        match &records[2] {
            StreamRecord::Action { record, streaming } => {
                assert!(!streaming);
                assert!(!record.should_execute);
            }
            other => panic!("unexpected record {:?}", other),
        }
        assert_eq!(
            records[3],
            StreamRecord::Sandbox {
                event: SandboxEvent::PageLoaded { port: 5173 }
            }
        );
    }

    #[test]
    fn test_parse_stream_reports_line() {
        let err = parse_stream("{\"type\":\"close\",\"id\":\"a\"}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_action_before_artifact_is_rejected() {
        let records = parse_stream(
            r#"{"type":"action","artifactId":"a1","actionId":"0","action":{"type":"shell","command":"ls"}}"#,
        )
        .unwrap();
        assert!(check_order(&records).is_err());
    }
}
