//! GitHub REST client for repository reads, branch creation and file writes.

use crate::error::PipelineError;
use crate::github::host::{
    DirEntry, EntryKind, FileBlob, FileWrite, HostProvider, RepoMetadata, RepoTarget,
    RepositoryHost,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{header, Method, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Public GitHub API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("agentcycle/", env!("CARGO_PKG_VERSION"));

/// GitHub API client bound to one token.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

// -- Request / response types -----------------------------------------------

#[derive(Debug, Deserialize)]
struct RepoResponse {
    full_name: String,
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    path: String,
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaObject,
}

#[derive(Debug, Deserialize)]
struct ShaObject {
    sha: String,
}

#[derive(Debug, Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    reference: String,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct PutFileRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutFileResponse {
    content: ShaObject,
}

#[derive(Debug, Serialize)]
struct DeleteFileRequest<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    #[serde(default)]
    tree: Option<ShaObject>,
}

#[derive(Debug, Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: [&'a str; 1],
}

#[derive(Debug, Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, PipelineError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| PipelineError::Configuration(format!("HTTP client could not be built: {e}")))
}

impl GitHubClient {
    /// Create a client. Every request is bounded by `timeout`.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, PipelineError> {
        Ok(Self::with_http(base_url, token, http_client(timeout)?))
    }

    fn with_http(base_url: &str, token: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
        }
    }

    /// Build `<base>/repos/<owner>/<name>/<segments...>` with each segment
    /// percent-encoded. Segments may themselves contain `/`.
    fn repo_url(&self, repo: &RepoTarget, segments: &[&str]) -> Result<Url, PipelineError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            PipelineError::Configuration(format!("invalid API url '{}': {e}", self.base_url))
        })?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                PipelineError::Configuration(format!("API url '{}' cannot be a base", self.base_url))
            })?;
            path.pop_if_empty();
            path.extend(["repos", repo.owner.as_str(), repo.name.as_str()]);
            for segment in segments {
                path.extend(segment.split('/').filter(|s| !s.is_empty()));
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Send and turn non-success statuses into classified errors.
    async fn send(&self, req: RequestBuilder) -> Result<Response, PipelineError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let remaining = resp
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await.unwrap_or_default();
        Err(PipelineError::classify(status, remaining.as_deref(), &body))
    }
}

#[async_trait]
impl RepositoryHost for GitHubClient {
    async fn repository(&self, repo: &RepoTarget) -> Result<RepoMetadata, PipelineError> {
        let url = self.repo_url(repo, &[])?;
        let resp = self.send(self.request(Method::GET, url)).await?;
        let body: RepoResponse = resp.json().await?;
        debug!("Repository {} (default branch {})", body.full_name, body.default_branch);
        Ok(RepoMetadata {
            full_name: body.full_name,
            default_branch: body.default_branch,
        })
    }

    async fn list_directory(
        &self,
        repo: &RepoTarget,
        path: &str,
        reference: &str,
    ) -> Result<Vec<DirEntry>, PipelineError> {
        let url = self.repo_url(repo, &["contents", path])?;
        let req = self
            .request(Method::GET, url)
            .query(&[("ref", reference)]);
        let entries: Vec<ContentEntry> = self.send(req).await?.json().await?;

        Ok(entries
            .into_iter()
            .map(|e| DirEntry {
                kind: match e.kind.as_str() {
                    "file" => EntryKind::File,
                    "dir" => EntryKind::Dir,
                    _ => EntryKind::Other,
                },
                name: e.name,
                path: e.path,
            })
            .collect())
    }

    async fn read_file(
        &self,
        repo: &RepoTarget,
        path: &str,
        reference: &str,
    ) -> Result<FileBlob, PipelineError> {
        let url = self.repo_url(repo, &["contents", path])?;
        let req = self
            .request(Method::GET, url)
            .query(&[("ref", reference)]);
        let body: FileResponse = self.send(req).await?.json().await?;

        let content = decode_content(&body.content, &body.encoding)
            .map_err(|e| PipelineError::Network(format!("{}: {e}", body.path)))?;

        Ok(FileBlob {
            path: body.path,
            content,
            sha: body.sha,
        })
    }

    async fn branch_head(&self, repo: &RepoTarget, branch: &str) -> Result<String, PipelineError> {
        let url = self.repo_url(repo, &["git", "ref", "heads", branch])?;
        let body: RefResponse = self.send(self.request(Method::GET, url)).await?.json().await?;
        Ok(body.object.sha)
    }

    async fn create_branch(
        &self,
        repo: &RepoTarget,
        branch: &str,
        base_sha: &str,
    ) -> Result<(), PipelineError> {
        let url = self.repo_url(repo, &["git", "refs"])?;
        let req = self.request(Method::POST, url).json(&CreateRefRequest {
            reference: format!("refs/heads/{branch}"),
            sha: base_sha,
        });
        self.send(req).await?;
        debug!("Created branch {} at {}", branch, base_sha);
        Ok(())
    }

    async fn write_file(
        &self,
        repo: &RepoTarget,
        branch: &str,
        path: &str,
        write: FileWrite<'_>,
    ) -> Result<String, PipelineError> {
        let url = self.repo_url(repo, &["contents", path])?;
        let req = self.request(Method::PUT, url).json(&PutFileRequest {
            message: write.message,
            content: BASE64.encode(write.content.as_bytes()),
            branch,
            sha: write.previous_sha,
        });
        let body: PutFileResponse = self.send(req).await?.json().await?;
        debug!("Wrote {} on {}", path, branch);
        Ok(body.content.sha)
    }

    async fn delete_file(
        &self,
        repo: &RepoTarget,
        branch: &str,
        path: &str,
        message: &str,
        sha: &str,
    ) -> Result<(), PipelineError> {
        let url = self.repo_url(repo, &["contents", path])?;
        let req = self
            .request(Method::DELETE, url)
            .json(&DeleteFileRequest { message, sha, branch });
        self.send(req).await?;
        debug!("Deleted {} on {}", path, branch);
        Ok(())
    }

    async fn finalize_branch(
        &self,
        repo: &RepoTarget,
        branch: &str,
        message: &str,
    ) -> Result<String, PipelineError> {
        let head = self.branch_head(repo, branch).await?;

        let url = self.repo_url(repo, &["git", "commits", &head])?;
        let parent: CommitResponse = self.send(self.request(Method::GET, url)).await?.json().await?;
        let tree = parent
            .tree
            .ok_or_else(|| PipelineError::Network(format!("commit {head} has no tree")))?;

        let url = self.repo_url(repo, &["git", "commits"])?;
        let req = self.request(Method::POST, url).json(&CreateCommitRequest {
            message,
            tree: &tree.sha,
            parents: [head.as_str()],
        });
        let commit: CommitResponse = self.send(req).await?.json().await?;

        let url = self.repo_url(repo, &["git", "refs", "heads", branch])?;
        let req = self.request(Method::PATCH, url).json(&UpdateRefRequest {
            sha: &commit.sha,
            force: false,
        });
        self.send(req).await?;

        debug!("Finalized {} at {}", branch, commit.sha);
        Ok(commit.sha)
    }
}

/// Decode a contents-API body. The API wraps base64 at 60 columns.
fn decode_content(content: &str, encoding: &str) -> Result<String, String> {
    match encoding {
        "base64" => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = BASE64.decode(compact).map_err(|e| e.to_string())?;
            String::from_utf8(bytes).map_err(|_| "file is not valid UTF-8".to_string())
        }
        "" | "utf-8" => Ok(content.to_string()),
        other => Err(format!("unsupported content encoding '{other}'")),
    }
}

/// Builds [`GitHubClient`]s against one API root. The clients share one
/// connection pool and its request timeout.
#[derive(Debug, Clone)]
pub struct GitHubProvider {
    api_url: String,
    http: reqwest::Client,
}

impl GitHubProvider {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, PipelineError> {
        Ok(Self {
            api_url: api_url.to_string(),
            http: http_client(timeout)?,
        })
    }
}

impl HostProvider for GitHubProvider {
    fn connect(&self, token: &str) -> Arc<dyn RepositoryHost> {
        Arc::new(GitHubClient::with_http(&self.api_url, token, self.http.clone()))
    }
}
