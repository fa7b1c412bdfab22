//! In-memory repository host shared by the integration tests.
#![allow(dead_code)]

use agentcycle::error::PipelineError;
use agentcycle::github::{
    DirEntry, EntryKind, FileBlob, FileWrite, HostProvider, RepoMetadata, RepoTarget,
    RepositoryHost,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub content: String,
    pub sha: String,
}

#[derive(Default)]
struct State {
    branches: HashMap<String, BTreeMap<String, Blob>>,
    heads: HashMap<String, String>,
    finalized: Vec<(String, String)>,
    writes: Vec<(String, String, Option<String>)>,
    seq: u64,
    in_flight: usize,
    max_in_flight: usize,
    repository_calls: usize,
}

impl State {
    fn next_sha(&mut self, tag: &str) -> String {
        self.seq += 1;
        format!("{tag}{:039x}", self.seq)
    }
}

/// A repository with one default branch, held in memory.
pub struct FakeHost {
    full_name: String,
    default_branch: String,
    state: Mutex<State>,
    fail_writes: Mutex<HashSet<String>>,
    latency: Mutex<Duration>,
}

impl FakeHost {
    pub fn new(full_name: &str, default_branch: &str) -> Arc<Self> {
        let mut state = State::default();
        let head = state.next_sha("c");
        state.branches.insert(default_branch.to_string(), BTreeMap::new());
        state.heads.insert(default_branch.to_string(), head);
        Arc::new(Self {
            full_name: full_name.to_string(),
            default_branch: default_branch.to_string(),
            state: Mutex::new(state),
            fail_writes: Mutex::new(HashSet::new()),
            latency: Mutex::new(Duration::ZERO),
        })
    }

    /// Put a file on the default branch.
    pub fn seed_file(&self, path: &str, content: &str) {
        let mut state = self.state();
        let sha = state.next_sha("b");
        state
            .branches
            .entry(self.default_branch.clone())
            .or_default()
            .insert(
                path.to_string(),
                Blob {
                    content: content.to_string(),
                    sha,
                },
            );
    }

    /// Make every write to `path` fail with a server error.
    pub fn fail_writes_to(&self, path: &str) {
        lock(&self.fail_writes).insert(path.to_string());
    }

    /// Delay `repository()` calls, in tokio time.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    pub fn file(&self, branch: &str, path: &str) -> Option<Blob> {
        self.state()
            .branches
            .get(branch)
            .and_then(|files| files.get(path))
            .cloned()
    }

    pub fn branch_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state().branches.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn finalized(&self) -> Vec<(String, String)> {
        self.state().finalized.clone()
    }

    /// `(branch, path, previous sha)` for every successful write.
    pub fn writes(&self) -> Vec<(String, String, Option<String>)> {
        self.state().writes.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    pub fn repository_calls(&self) -> usize {
        self.state().repository_calls
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn missing(what: &str) -> PipelineError {
        PipelineError::NotFound(what.to_string())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[async_trait]
impl RepositoryHost for FakeHost {
    async fn repository(&self, _repo: &RepoTarget) -> Result<RepoMetadata, PipelineError> {
        {
            let mut state = self.state();
            state.repository_calls += 1;
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.state().in_flight -= 1;
        Ok(RepoMetadata {
            full_name: self.full_name.clone(),
            default_branch: self.default_branch.clone(),
        })
    }

    async fn list_directory(
        &self,
        _repo: &RepoTarget,
        path: &str,
        reference: &str,
    ) -> Result<Vec<DirEntry>, PipelineError> {
        let state = self.state();
        let files = state
            .branches
            .get(reference)
            .ok_or_else(|| Self::missing(reference))?;

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path.trim_end_matches('/'))
        };
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for file in files.keys() {
            let Some(rest) = file.strip_prefix(&prefix) else {
                continue;
            };
            let (name, kind) = match rest.split_once('/') {
                Some((dir, _)) => (dir, EntryKind::Dir),
                None => (rest, EntryKind::File),
            };
            if seen.insert(name.to_string()) {
                entries.push(DirEntry {
                    name: name.to_string(),
                    path: format!("{prefix}{name}"),
                    kind,
                });
            }
        }
        if entries.is_empty() && !path.is_empty() {
            return Err(Self::missing(path));
        }
        Ok(entries)
    }

    async fn read_file(
        &self,
        _repo: &RepoTarget,
        path: &str,
        reference: &str,
    ) -> Result<FileBlob, PipelineError> {
        let state = self.state();
        let blob = state
            .branches
            .get(reference)
            .and_then(|files| files.get(path))
            .ok_or_else(|| Self::missing(path))?;
        Ok(FileBlob {
            path: path.to_string(),
            content: blob.content.clone(),
            sha: blob.sha.clone(),
        })
    }

    async fn branch_head(&self, _repo: &RepoTarget, branch: &str) -> Result<String, PipelineError> {
        self.state()
            .heads
            .get(branch)
            .cloned()
            .ok_or_else(|| Self::missing(branch))
    }

    async fn create_branch(
        &self,
        _repo: &RepoTarget,
        branch: &str,
        base_sha: &str,
    ) -> Result<(), PipelineError> {
        let mut state = self.state();
        if state.branches.contains_key(branch) {
            return Err(PipelineError::Api {
                status: 422,
                message: "Reference already exists".into(),
            });
        }
        let source = state
            .heads
            .iter()
            .find(|(_, head)| head.as_str() == base_sha)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| Self::missing(base_sha))?;
        let files = state.branches.get(&source).cloned().unwrap_or_default();
        state.branches.insert(branch.to_string(), files);
        state.heads.insert(branch.to_string(), base_sha.to_string());
        Ok(())
    }

    async fn write_file(
        &self,
        _repo: &RepoTarget,
        branch: &str,
        path: &str,
        write: FileWrite<'_>,
    ) -> Result<String, PipelineError> {
        if lock(&self.fail_writes).contains(path) {
            return Err(PipelineError::Api {
                status: 500,
                message: format!("injected failure writing {path}"),
            });
        }

        let mut state = self.state();
        let sha = state.next_sha("b");
        let head = state.next_sha("c");
        let files = state
            .branches
            .get_mut(branch)
            .ok_or_else(|| Self::missing(branch))?;

        match (files.get(path), write.previous_sha) {
            (Some(existing), Some(prev)) if existing.sha != prev => {
                return Err(PipelineError::Api {
                    status: 409,
                    message: format!("{path} does not match {prev}"),
                });
            }
            (Some(_), None) => {
                return Err(PipelineError::Api {
                    status: 422,
                    message: "\"sha\" wasn't supplied".into(),
                });
            }
            (None, Some(_)) => return Err(Self::missing(path)),
            _ => {}
        }

        files.insert(
            path.to_string(),
            Blob {
                content: write.content.to_string(),
                sha: sha.clone(),
            },
        );
        state.heads.insert(branch.to_string(), head);
        state.writes.push((
            branch.to_string(),
            path.to_string(),
            write.previous_sha.map(str::to_string),
        ));
        Ok(sha)
    }

    async fn delete_file(
        &self,
        _repo: &RepoTarget,
        branch: &str,
        path: &str,
        _message: &str,
        sha: &str,
    ) -> Result<(), PipelineError> {
        let mut state = self.state();
        let head = state.next_sha("c");
        let files = state
            .branches
            .get_mut(branch)
            .ok_or_else(|| Self::missing(branch))?;
        match files.get(path) {
            Some(existing) if existing.sha == sha => {
                files.remove(path);
            }
            Some(_) => {
                return Err(PipelineError::Api {
                    status: 409,
                    message: format!("{path} does not match {sha}"),
                })
            }
            None => return Err(Self::missing(path)),
        }
        state.heads.insert(branch.to_string(), head);
        Ok(())
    }

    async fn finalize_branch(
        &self,
        _repo: &RepoTarget,
        branch: &str,
        message: &str,
    ) -> Result<String, PipelineError> {
        let mut state = self.state();
        if !state.heads.contains_key(branch) {
            return Err(Self::missing(branch));
        }
        let head = state.next_sha("c");
        state.heads.insert(branch.to_string(), head.clone());
        state
            .finalized
            .push((branch.to_string(), message.to_string()));
        Ok(head)
    }
}

/// Hands out the same [`FakeHost`] for every token it accepts.
pub struct FakeProvider {
    pub host: Arc<FakeHost>,
    tokens: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(host: Arc<FakeHost>) -> Arc<Self> {
        Arc::new(Self {
            host,
            tokens: Mutex::new(Vec::new()),
        })
    }

    /// Tokens passed to `connect`, in order.
    pub fn tokens(&self) -> Vec<String> {
        lock(&self.tokens).clone()
    }
}

impl HostProvider for FakeProvider {
    fn connect(&self, token: &str) -> Arc<dyn RepositoryHost> {
        lock(&self.tokens).push(token.to_string());
        self.host.clone()
    }
}

/// A host whose every call fails with the given status class.
pub struct FailingHost {
    pub error: fn() -> PipelineError,
}

#[async_trait]
impl RepositoryHost for FailingHost {
    async fn repository(&self, _repo: &RepoTarget) -> Result<RepoMetadata, PipelineError> {
        Err((self.error)())
    }

    async fn list_directory(
        &self,
        _repo: &RepoTarget,
        _path: &str,
        _reference: &str,
    ) -> Result<Vec<DirEntry>, PipelineError> {
        Err((self.error)())
    }

    async fn read_file(
        &self,
        _repo: &RepoTarget,
        _path: &str,
        _reference: &str,
    ) -> Result<FileBlob, PipelineError> {
        Err((self.error)())
    }

    async fn branch_head(&self, _repo: &RepoTarget, _branch: &str) -> Result<String, PipelineError> {
        Err((self.error)())
    }

    async fn create_branch(
        &self,
        _repo: &RepoTarget,
        _branch: &str,
        _base_sha: &str,
    ) -> Result<(), PipelineError> {
        Err((self.error)())
    }

    async fn write_file(
        &self,
        _repo: &RepoTarget,
        _branch: &str,
        _path: &str,
        _write: FileWrite<'_>,
    ) -> Result<String, PipelineError> {
        Err((self.error)())
    }

    async fn delete_file(
        &self,
        _repo: &RepoTarget,
        _branch: &str,
        _path: &str,
        _message: &str,
        _sha: &str,
    ) -> Result<(), PipelineError> {
        Err((self.error)())
    }

    async fn finalize_branch(
        &self,
        _repo: &RepoTarget,
        _branch: &str,
        _message: &str,
    ) -> Result<String, PipelineError> {
        Err((self.error)())
    }
}

pub struct FailingProvider(pub fn() -> PipelineError);

impl HostProvider for FailingProvider {
    fn connect(&self, _token: &str) -> Arc<dyn RepositoryHost> {
        Arc::new(FailingHost { error: self.0 })
    }
}

pub fn repo() -> RepoTarget {
    "octo/widgets".parse().unwrap()
}
