//! GitHub REST client backing version-control sync

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::debug;
use workbench_core::ports::{GitHost, TreeEntry};
use workbench_core::{ChangeStatus, CommitFile, CommitInfo, Result, WorkbenchError};

const PER_PAGE: usize = 100;

/// Upper bound on history pages fetched per listing
const MAX_PAGES: usize = 50;

pub struct GitHubClient {
    http: ReqwestClient,
    base_url: String,
    /// `owner/name`
    repo: String,
    token: String,
}

impl GitHubClient {
    pub fn new(base_url: &str, repo: &str, token: &str) -> Result<Self> {
        let http = ReqwestClient::builder()
            .user_agent(concat!("workbench-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WorkbenchError::remote("client", e))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            token: token.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/repos/{}{}", self.base_url, self.repo, path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| WorkbenchError::remote(operation, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WorkbenchError::remote(operation, e))?;
        debug!("GitHub {} -> {}", operation, status);

        if status == StatusCode::NOT_FOUND && !self.repository_exists().await? {
            return Err(WorkbenchError::RepositoryGone(self.repo.clone()));
        }
        if !status.is_success() {
            let error: Value = serde_json::from_str(&body).unwrap_or_default();
            return Err(WorkbenchError::remote(
                operation,
                format!(
                    "{} {}",
                    status,
                    error["message"].as_str().unwrap_or("Unknown error")
                ),
            ));
        }
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| WorkbenchError::remote(operation, e))
    }

    async fn repository_exists(&self) -> Result<bool> {
        let response = self
            .request(Method::GET, "")
            .send()
            .await
            .map_err(|e| WorkbenchError::remote("get repository", e))?;
        Ok(response.status() != StatusCode::NOT_FOUND)
    }
}

#[async_trait]
impl GitHost for GitHubClient {
    async fn get_ref(&self, branch: &str) -> Result<String> {
        let body = self
            .send(
                "get ref",
                self.request(Method::GET, &format!("/git/ref/heads/{}", branch)),
            )
            .await?;
        string_field(&body["object"]["sha"], "get ref")
    }

    async fn create_blob(&self, content: &[u8]) -> Result<String> {
        let body = self
            .send(
                "create blob",
                self.request(Method::POST, "/git/blobs").json(&json!({
                    "content": STANDARD.encode(content),
                    "encoding": "base64",
                })),
            )
            .await?;
        string_field(&body["sha"], "create blob")
    }

    async fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> Result<String> {
        let tree: Vec<Value> = entries
            .iter()
            .map(|entry| {
                json!({
                    "path": entry.path,
                    "mode": entry.mode,
                    "type": "blob",
                    "sha": entry.sha,
                })
            })
            .collect();
        let body = self
            .send(
                "create tree",
                self.request(Method::POST, "/git/trees").json(&json!({
                    "base_tree": base_tree,
                    "tree": tree,
                })),
            )
            .await?;
        string_field(&body["sha"], "create tree")
    }

    async fn create_commit(&self, tree: &str, parents: &[String], message: &str) -> Result<String> {
        let body = self
            .send(
                "create commit",
                self.request(Method::POST, "/git/commits").json(&json!({
                    "message": message,
                    "tree": tree,
                    "parents": parents,
                })),
            )
            .await?;
        string_field(&body["sha"], "create commit")
    }

    async fn update_ref(&self, branch: &str, sha: &str) -> Result<()> {
        self.send(
            "update ref",
            self.request(Method::PATCH, &format!("/git/refs/heads/{}", branch))
                .json(&json!({ "sha": sha, "force": false })),
        )
        .await?;
        Ok(())
    }

    async fn list_commits(&self, branch: &str) -> Result<Vec<String>> {
        let mut shas = Vec::new();
        for page in 1..=MAX_PAGES {
            let body = self
                .send(
                    "list commits",
                    self.request(Method::GET, "/commits").query(&[
                        ("sha", branch.to_string()),
                        ("per_page", PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ]),
                )
                .await?;
            let batch = commit_shas(&body)?;
            let done = batch.len() < PER_PAGE;
            shas.extend(batch);
            if done {
                break;
            }
        }
        Ok(shas)
    }

    async fn get_commit(&self, sha: &str) -> Result<CommitInfo> {
        let body = self
            .send(
                "get commit",
                self.request(Method::GET, &format!("/commits/{}", sha)),
            )
            .await?;
        parse_commit(&body)
    }

    async fn get_content(&self, path: &str, git_ref: &str) -> Result<Option<String>> {
        let body = self
            .send(
                "get content",
                self.request(Method::GET, &format!("/contents/{}", path))
                    .query(&[("ref", git_ref)]),
            )
            .await?;

        let bytes = match content_payload(&body)? {
            ContentPayload::Inline(bytes) => bytes,
            ContentPayload::Blob(sha) => {
                debug!("{} is too large for the contents API, fetching blob {}", path, sha);
                let blob = self
                    .send(
                        "get blob",
                        self.request(Method::GET, &format!("/git/blobs/{}", sha)),
                    )
                    .await?;
                decode_base64(&blob, "get blob")?
            }
        };
        Ok(text_content(bytes))
    }
}

fn string_field(value: &Value, operation: &str) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| WorkbenchError::remote(operation, "missing sha in response"))
}

fn commit_shas(body: &Value) -> Result<Vec<String>> {
    body.as_array()
        .ok_or_else(|| WorkbenchError::remote("list commits", "expected an array"))?
        .iter()
        .map(|commit| string_field(&commit["sha"], "list commits"))
        .collect()
}

/// Map a `GET /commits/{sha}` payload
fn parse_commit(body: &Value) -> Result<CommitInfo> {
    let parents = body["parents"]
        .as_array()
        .map(|parents| {
            parents
                .iter()
                .filter_map(|p| p["sha"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let files = body["files"]
        .as_array()
        .map(|files| files.iter().filter_map(parse_commit_file).collect())
        .unwrap_or_default();

    Ok(CommitInfo {
        sha: string_field(&body["sha"], "get commit")?,
        message: body["commit"]["message"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        tree_sha: string_field(&body["commit"]["tree"]["sha"], "get commit")?,
        parents,
        files,
    })
}

fn parse_commit_file(file: &Value) -> Option<CommitFile> {
    let status = match file["status"].as_str()? {
        "added" | "copied" => ChangeStatus::Added,
        "modified" | "changed" => ChangeStatus::Modified,
        "removed" => ChangeStatus::Removed,
        "renamed" => ChangeStatus::Renamed,
        _ => return None,
    };
    Some(CommitFile {
        path: file["filename"].as_str()?.to_string(),
        status,
        previous_path: file["previous_filename"].as_str().map(str::to_string),
    })
}

enum ContentPayload {
    Inline(Vec<u8>),
    /// Content left out of the response (files over 1 MB); fetch the blob
    Blob(String),
}

fn content_payload(body: &Value) -> Result<ContentPayload> {
    match body["encoding"].as_str() {
        Some("base64") => Ok(ContentPayload::Inline(decode_base64(body, "get content")?)),
        Some("none") => Ok(ContentPayload::Blob(string_field(&body["sha"], "get content")?)),
        other => Err(WorkbenchError::remote(
            "get content",
            format!("unsupported content encoding {:?}", other),
        )),
    }
}

/// Decode a base64 `content` field (wrapped at 60 columns)
fn decode_base64(body: &Value, operation: &str) -> Result<Vec<u8>> {
    if body["encoding"].as_str() != Some("base64") {
        return Err(WorkbenchError::remote(
            operation,
            format!("unsupported content encoding {:?}", body["encoding"].as_str()),
        ));
    }
    let encoded: String = body["content"]
        .as_str()
        .ok_or_else(|| WorkbenchError::remote(operation, "missing content"))?
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    STANDARD
        .decode(encoded)
        .map_err(|e| WorkbenchError::remote(operation, e))
}

/// UTF-8 text, or `None` for binary content
fn text_content(bytes: Vec<u8>) -> Option<String> {
    String::from_utf8(bytes)
        .ok()
        .filter(|content| !content.contains('\0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commit_maps_statuses() {
        let body = json!({
            "sha": "c3",
            "commit": { "message": "Rename", "tree": { "sha": "t3" } },
            "parents": [{ "sha": "c2" }],
            "files": [
                { "filename": "src/app.ts", "status": "modified" },
                { "filename": "src/new.ts", "status": "renamed", "previous_filename": "src/old.ts" },
                { "filename": "gone.ts", "status": "removed" },
                { "filename": "same.ts", "status": "unchanged" }
            ]
        });

        let commit = parse_commit(&body).unwrap();
        assert_eq!(commit.sha, "c3");
        assert_eq!(commit.tree_sha, "t3");
        assert_eq!(commit.parents, vec!["c2"]);
        assert_eq!(commit.files.len(), 3);
        assert_eq!(commit.files[1].status, ChangeStatus::Renamed);
        assert_eq!(commit.files[1].previous_path.as_deref(), Some("src/old.ts"));
        assert_eq!(commit.files[2].status, ChangeStatus::Removed);
    }

    #[test]
    fn test_parse_commit_requires_tree() {
        let body = json!({ "sha": "c3", "commit": { "message": "x" } });
        assert!(parse_commit(&body).is_err());
    }

    #[test]
    fn test_decode_wrapped_content() {
        let body = json!({ "content": "ZXhwb3J0IGNv\nbnN0IHYgPSAy\nOw==\n", "encoding": "base64" });
        let bytes = match content_payload(&body).unwrap() {
            ContentPayload::Inline(bytes) => bytes,
            ContentPayload::Blob(_) => panic!("expected inline content"),
        };
        assert_eq!(text_content(bytes).as_deref(), Some("export const v = 2;"));
    }

    #[test]
    fn test_large_file_falls_back_to_blob() {
        let body = json!({ "sha": "b1ob", "content": "", "encoding": "none", "size": 2_000_000 });
        assert!(matches!(
            content_payload(&body).unwrap(),
            ContentPayload::Blob(sha) if sha == "b1ob"
        ));
        // Blobs must come back base64 encoded too
        assert!(decode_base64(&body, "get blob").is_err());
    }

    #[test]
    fn test_unknown_encoding_is_an_error() {
        assert!(content_payload(&json!({ "content": "x", "encoding": "utf-8" })).is_err());
        assert!(content_payload(&json!({ "content": "eA==" })).is_err());
    }

    #[test]
    fn test_binary_content_is_not_text() {
        assert_eq!(text_content(vec![0x89, 0x50, 0x4e, 0x47, 0xff]), None);
        assert_eq!(text_content(b"a\0b".to_vec()), None);
        assert_eq!(text_content(b"plain".to_vec()).as_deref(), Some("plain"));
    }

    #[test]
    fn test_commit_shas_in_order() {
        let body = json!([{ "sha": "c" }, { "sha": "b" }, { "sha": "a" }]);
        assert_eq!(commit_shas(&body).unwrap(), vec!["c", "b", "a"]);
    }
}
