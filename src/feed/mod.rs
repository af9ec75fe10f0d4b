//! Retrieval and caching of project updates from GitHub.
//!
//! The pieces, bottom to top: [`RepoPath`] turns loose profile URLs into
//! repository identifiers, [`RateBudget`] + [`FetchGate`] keep us inside the
//! upstream rate ceiling, [`GithubClient`] speaks the REST API,
//! [`ResourceCache`] and [`GlobalFeed`] remember what was fetched, and
//! [`UpdateService`] wires it all into the operations callers use.

mod budget;
mod gate;
mod github;
mod global_feed;
mod orchestrator;
mod repo_path;
mod resource;
mod resource_cache;
mod store;

pub use budget::{RateBudget, RateLimitSnapshot};
pub use gate::{FetchError, FetchGate, GateConfig};
pub use github::{Commit, CommitAuthor, GithubClient, Release, RepoInfo, UpdateBundle};
pub use global_feed::{FeedCommit, FeedRelease, FeedSnapshot, GlobalFeed};
pub use orchestrator::{PreloadSummary, RefreshOptions, ResourceUpdates, UpdateService};
pub use repo_path::RepoPath;
pub use resource::ResourceRef;
pub use resource_cache::{CacheStatus, ResourceCache};
pub use store::{FileStore, MemoryStore, Store};
