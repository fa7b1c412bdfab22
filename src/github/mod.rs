pub mod client;
pub mod host;

pub use client::{GitHubClient, GitHubProvider, DEFAULT_API_URL};
pub use host::{
    DirEntry, EntryKind, FileBlob, FileWrite, HostProvider, RepoMetadata, RepoTarget,
    RepositoryHost,
};
