//! Archive export and local directory sync

use crate::config::ExportConfig;
use crate::error::{Result, WorkbenchError};
use crate::files::FileStore;
use std::io::{Cursor, Write};
use std::path::{Component, Path};
use tracing::{debug, info};
use workbench_types::FileEntry;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Zip every non-binary file, with the `.env` shim applied
pub async fn build_archive(files: &FileStore, config: &ExportConfig) -> Result<Vec<u8>> {
    let snapshot = files.snapshot().await;
    let mut entries: Vec<(String, String)> = Vec::new();
    let mut has_env = false;

    for (path, entry) in &snapshot {
        let FileEntry::File {
            content,
            is_binary: false,
        } = entry
        else {
            continue;
        };
        let relative = files.relative(path)?;
        if relative == config.env_file {
            has_env = true;
            entries.push((relative, normalize_env(content, config)));
        } else {
            entries.push((relative, content.clone()));
        }
    }
    if !has_env {
        entries.push((config.env_file.clone(), normalize_env("", config)));
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for (path, content) in &entries {
        writer.start_file(path.as_str(), options)?;
        writer.write_all(content.as_bytes())?;
    }
    let archive = writer.finish()?.into_inner();

    info!(
        "Built archive with {} files ({} bytes)",
        entries.len(),
        archive.len()
    );
    Ok(archive)
}

/// Set the API base URL and query mode keys, keeping every other line
pub fn normalize_env(content: &str, config: &ExportConfig) -> String {
    let overrides = [
        (config.api_base_url_key.as_str(), config.api_base_url.as_str()),
        (config.query_mode_key.as_str(), config.query_mode.as_str()),
    ];
    let mut written = [false; 2];
    let mut lines: Vec<String> = Vec::new();

    for line in content.lines() {
        let key = line
            .trim_start()
            .trim_start_matches("export ")
            .split('=')
            .next()
            .unwrap_or_default()
            .trim();

        match overrides.iter().position(|(k, _)| *k == key) {
            Some(i) if written[i] => {}
            Some(i) => {
                lines.push(format!("{}={}", overrides[i].0, overrides[i].1));
                written[i] = true;
            }
            None => lines.push(line.to_string()),
        }
    }

    for (i, (key, value)) in overrides.iter().enumerate() {
        if !written[i] {
            lines.push(format!("{}={}", key, value));
        }
    }

    let mut normalized = lines.join("\n");
    normalized.push('\n');
    normalized
}

/// Mirror the tree into a local directory, preserving relative paths
///
/// Returns the number of files written. Binary entries are skipped.
pub async fn sync_to_directory(files: &FileStore, target: &Path) -> Result<usize> {
    tokio::fs::create_dir_all(target).await?;
    let snapshot = files.snapshot().await;
    let mut written = 0;

    for (path, entry) in &snapshot {
        let relative = files.relative(path)?;
        if relative.is_empty() {
            continue;
        }
        let destination = target.join(safe_relative(&relative)?);

        match entry {
            FileEntry::Folder => tokio::fs::create_dir_all(&destination).await?,
            FileEntry::File {
                content,
                is_binary: false,
            } => {
                if let Some(parent) = destination.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&destination, content).await?;
                written += 1;
            }
            FileEntry::File { .. } => debug!("Skipping binary file {}", relative),
        }
    }

    info!("Synced {} files to {}", written, target.display());
    Ok(written)
}

fn safe_relative(relative: &str) -> Result<&Path> {
    let path = Path::new(relative);
    if path
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        Ok(path)
    } else {
        Err(WorkbenchError::InvalidPath(relative.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    #[test]
    fn test_normalize_env_overwrites_and_appends() {
        let config = ExportConfig::default();
        let env = normalize_env(
            "# comment\nVITE_API_BASE_URL=https://sandbox.example\nSECRET=1\nVITE_API_BASE_URL=dup\n",
            &config,
        );
        assert_eq!(
            env,
            "# comment\nVITE_API_BASE_URL=http://localhost:3000\nSECRET=1\nVITE_QUERY_MODE=direct\n"
        );
    }

    #[tokio::test]
    async fn test_archive_contains_text_files_and_env() {
        let files = FileStore::new("/home/project");
        files.set_content("src/main.ts", "console.log(1)").await.unwrap();
        files
            .set("logo.png", FileEntry::File {
                content: "iVBOR".to_string(),
                is_binary: true,
            })
            .await
            .unwrap();

        let bytes = build_archive(&files, &ExportConfig::default()).await.unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec![".env", "src/main.ts"]);

        let mut env = String::new();
        archive.by_name(".env").unwrap().read_to_string(&mut env).unwrap();
        assert!(env.contains("VITE_QUERY_MODE=direct"));
    }

    #[tokio::test]
    async fn test_sync_to_directory() {
        let files = FileStore::new("/home/project");
        files.set_content("src/lib/a.ts", "a").await.unwrap();
        files.set("empty", FileEntry::Folder).await.unwrap();
        let dir = TempDir::new().unwrap();

        assert_eq!(sync_to_directory(&files, dir.path()).await.unwrap(), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("src/lib/a.ts")).unwrap(),
            "a"
        );
        assert!(dir.path().join("empty").is_dir());
    }
}
