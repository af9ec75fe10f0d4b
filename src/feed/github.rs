//! Typed queries against the GitHub REST API.
//!
//! Each query function goes through the shared [`FetchGate`] and comes in two
//! flavors: a `try_` variant that reports [`FetchError`] to callers that need
//! to distinguish "nothing there" from "couldn't ask", and a fail-soft variant
//! that logs the failure and degrades to an empty result. Feed assembly is
//! best-effort, so most call sites use the fail-soft flavor.

use super::budget::RateLimitSnapshot;
use super::gate::{FetchError, FetchGate};
use super::repo_path::RepoPath;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const LOG_TARGET: &str = "    github";

/// A published release of a repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub id: u64,
    pub name: String,
    pub tag_name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub body: Option<String>,
    pub html_url: String,
    pub prerelease: bool,
    pub draft: bool,
}

/// Who authored a commit, per the commit metadata (not the GitHub account).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommitAuthor {
    pub name: String,
    pub date: Option<DateTime<Utc>>,
}

/// A commit on a repository's default branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub sha: String,

    /// Abbreviated hash for display; part of the wire format, not derived by
    /// consumers.
    pub short_sha: String,

    pub message: String,
    pub author: CommitAuthor,
    pub date: Option<DateTime<Utc>>,
    pub html_url: String,
}

/// First seven characters of a commit hash.
fn abbreviate_sha(sha: &str) -> String {
    sha.get(..7).unwrap_or(sha).to_string()
}

/// Repository metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepoInfo {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub stargazers_count: u64,
    pub forks_count: u64,
    pub language: Option<String>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub html_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Everything fetched for one resource in one pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBundle {
    pub releases: Vec<Release>,
    pub commits: Vec<Commit>,
    pub repo_info: Option<RepoInfo>,
    pub last_updated: DateTime<Utc>,
}

impl UpdateBundle {
    #[must_use]
    pub const fn empty(now: DateTime<Utc>) -> Self {
        Self {
            releases: Vec::new(),
            commits: Vec::new(),
            repo_info: None,
            last_updated: now,
        }
    }

    /// A bundle with neither releases nor commits carries no feed content,
    /// even when repository metadata was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.releases.is_empty() && self.commits.is_empty()
    }

    /// Timestamp of the newest release or commit, used to order batch output.
    #[must_use]
    pub fn latest_activity(&self) -> Option<DateTime<Utc>> {
        let newest_release = self.releases.iter().filter_map(|r| r.published_at).max();
        let newest_commit = self.commits.iter().filter_map(|c| c.date).max();
        newest_release.max(newest_commit)
    }
}

// Wire-format shapes, deserialized from GitHub's snake_case JSON and folded
// into the public models above.

#[derive(Deserialize)]
struct ApiRelease {
    id: u64,
    name: Option<String>,
    tag_name: String,
    published_at: Option<DateTime<Utc>>,
    body: Option<String>,
    html_url: String,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    draft: bool,
}

impl From<ApiRelease> for Release {
    fn from(api: ApiRelease) -> Self {
        Self {
            // Releases created from a bare tag have no title.
            name: api.name.filter(|n| !n.is_empty()).unwrap_or_else(|| api.tag_name.clone()),
            id: api.id,
            tag_name: api.tag_name,
            published_at: api.published_at,
            body: api.body,
            html_url: api.html_url,
            prerelease: api.prerelease,
            draft: api.draft,
        }
    }
}

#[derive(Deserialize)]
struct ApiCommitIdent {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ApiCommitDetail {
    message: String,
    author: Option<ApiCommitIdent>,
    committer: Option<ApiCommitIdent>,
}

#[derive(Deserialize)]
struct ApiCommit {
    sha: String,
    commit: ApiCommitDetail,
    html_url: String,
}

impl From<ApiCommit> for Commit {
    fn from(api: ApiCommit) -> Self {
        // Author metadata can be absent on imported commits; fall back to the
        // committer before giving up.
        let ident = api.commit.author.or(api.commit.committer);
        let (name, date) = match ident {
            Some(i) => (i.name.unwrap_or_else(|| "unknown".to_string()), i.date),
            None => ("unknown".to_string(), None),
        };

        Self {
            short_sha: abbreviate_sha(&api.sha),
            sha: api.sha,
            message: api.commit.message,
            author: CommitAuthor { name, date },
            date,
            html_url: api.html_url,
        }
    }
}

#[derive(Deserialize)]
struct ApiRepo {
    name: String,
    full_name: String,
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    language: Option<String>,
    pushed_at: Option<DateTime<Utc>>,
    html_url: String,
    updated_at: Option<DateTime<Utc>>,
}

impl From<ApiRepo> for RepoInfo {
    fn from(api: ApiRepo) -> Self {
        Self {
            name: api.name,
            full_name: api.full_name,
            description: api.description,
            stargazers_count: api.stargazers_count,
            forks_count: api.forks_count,
            language: api.language,
            pushed_at: api.pushed_at,
            html_url: api.html_url,
            updated_at: api.updated_at,
        }
    }
}

#[derive(Deserialize)]
struct ApiSearchResult {
    items: Vec<ApiRepo>,
}

#[derive(Deserialize)]
struct ApiRateLimitCore {
    limit: u32,
    remaining: u32,
    reset: i64,
}

#[derive(Deserialize)]
struct ApiRateLimitResources {
    core: ApiRateLimitCore,
}

#[derive(Deserialize)]
struct ApiRateLimit {
    resources: ApiRateLimitResources,
}

/// Gated client for the queries the feed needs.
#[derive(Debug, Clone)]
pub struct GithubClient {
    gate: Arc<FetchGate>,
    base_url: String,
}

impl GithubClient {
    #[must_use]
    pub fn new(gate: Arc<FetchGate>, base_url: impl Into<String>) -> Self {
        Self {
            gate,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let resp = self.gate.get(url).await?;
        resp.json::<T>().await.map_err(|e| FetchError::Transport(e.into()))
    }

    /// Most recent releases, newest first.
    pub async fn try_latest_releases(
        &self,
        path: &str,
        limit: usize,
    ) -> Result<Vec<Release>, FetchError> {
        let url = format!("{}/repos/{path}/releases?per_page={limit}", self.base_url);
        let releases: Vec<ApiRelease> = self.get_json(&url).await?;
        Ok(releases.into_iter().map(Release::from).collect())
    }

    /// Most recent commits on the default branch, newest first.
    pub async fn try_recent_commits(
        &self,
        path: &str,
        limit: usize,
    ) -> Result<Vec<Commit>, FetchError> {
        let url = format!("{}/repos/{path}/commits?per_page={limit}", self.base_url);
        let commits: Vec<ApiCommit> = self.get_json(&url).await?;
        Ok(commits.into_iter().map(Commit::from).collect())
    }

    /// Metadata for a single repository.
    pub async fn try_repository_info(&self, path: &str) -> Result<RepoInfo, FetchError> {
        let url = format!("{}/repos/{path}", self.base_url);
        let repo: ApiRepo = self.get_json(&url).await?;
        Ok(repo.into())
    }

    /// An organization's repositories, most recently updated first.
    ///
    /// The orgs endpoint rejects some account types (user accounts behind an
    /// org-shaped URL), so a failed primary query falls back to repository
    /// search. Rate-limit failures are never retried via the fallback; that
    /// would spend quota we already know is gone.
    pub async fn try_organization_repos(
        &self,
        org: &str,
        limit: usize,
    ) -> Result<Vec<RepoInfo>, FetchError> {
        let url = format!("{}/orgs/{org}/repos?sort=updated&per_page={limit}", self.base_url);
        let primary: Result<Vec<ApiRepo>, FetchError> = self.get_json(&url).await;

        let repos = match primary {
            Ok(repos) => repos,
            Err(e @ FetchError::RateLimited { .. }) => return Err(e),
            Err(e) => {
                log::debug!(target: LOG_TARGET, "org listing for {org} failed ({e}), trying search");
                let url = format!(
                    "{}/search/repositories?q=org:{org}&sort=updated&per_page={limit}",
                    self.base_url
                );
                let result: ApiSearchResult = self.get_json(&url).await?;
                result.items
            }
        };

        Ok(repos.into_iter().map(RepoInfo::from).collect())
    }

    /// Fail-soft wrapper around [`Self::try_latest_releases`].
    pub async fn latest_releases(&self, path: &RepoPath, limit: usize) -> Vec<Release> {
        match self.try_latest_releases(&path.to_string(), limit).await {
            Ok(releases) => releases,
            Err(e) => {
                log_soft_failure("releases", path, &e);
                Vec::new()
            }
        }
    }

    /// Fail-soft wrapper around [`Self::try_recent_commits`].
    pub async fn recent_commits(&self, path: &RepoPath, limit: usize) -> Vec<Commit> {
        match self.try_recent_commits(&path.to_string(), limit).await {
            Ok(commits) => commits,
            Err(e) => {
                log_soft_failure("commits", path, &e);
                Vec::new()
            }
        }
    }

    /// Fail-soft wrapper around [`Self::try_repository_info`].
    pub async fn repository_info(&self, path: &RepoPath) -> Option<RepoInfo> {
        match self.try_repository_info(&path.to_string()).await {
            Ok(info) => Some(info),
            Err(e) => {
                log_soft_failure("repository info", path, &e);
                None
            }
        }
    }

    /// Fail-soft wrapper around [`Self::try_organization_repos`].
    pub async fn organization_repos(&self, org: &str, limit: usize) -> Vec<RepoInfo> {
        match self.try_organization_repos(org, limit).await {
            Ok(repos) => repos,
            Err(e) => {
                log::warn!(target: LOG_TARGET, "couldn't list repos for org {org}: {e}");
                Vec::new()
            }
        }
    }

    /// Current quota as reported by the dedicated endpoint. Unlike the other
    /// queries this one costs no quota upstream.
    pub async fn rate_limit_status(&self) -> Option<RateLimitSnapshot> {
        let url = format!("{}/rate_limit", self.base_url);
        match self.get_json::<ApiRateLimit>(&url).await {
            Ok(status) => {
                let core = status.resources.core;
                Some(RateLimitSnapshot {
                    limit: core.limit,
                    remaining: core.remaining,
                    reset_at: DateTime::from_timestamp(core.reset, 0)?,
                })
            }
            Err(e) => {
                log::debug!(target: LOG_TARGET, "couldn't read rate limit status: {e}");
                None
            }
        }
    }
}

fn log_soft_failure(what: &str, path: &RepoPath, e: &FetchError) {
    match e {
        FetchError::Upstream { status: 404 } => {
            log::info!(target: LOG_TARGET, "no {what} found for {path} (repository missing or private)");
        }
        _ => {
            log::warn!(target: LOG_TARGET, "couldn't fetch {what} for {path}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::budget::RateBudget;
    use super::super::gate::GateConfig;
    use super::*;
    use core::time::Duration;
    use serde_json::json;
    use tokio::sync::Mutex;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> GithubClient {
        let config = GateConfig {
            user_agent: "devpulse-tests".to_string(),
            token: None,
            min_interval: Duration::ZERO,
            retry_backoff: Duration::from_millis(5),
            rate_backoff: Duration::from_millis(5),
        };
        let budget = Arc::new(Mutex::new(RateBudget::conservative(Utc::now())));
        let gate = Arc::new(FetchGate::new(&config, budget).unwrap());
        GithubClient::new(gate, server.uri())
    }

    #[tokio::test]
    async fn test_latest_releases_parses_and_falls_back_to_tag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/core/releases"))
            .and(query_param("per_page", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": 1,
                    "name": "Core 2.0",
                    "tag_name": "v2.0.0",
                    "published_at": "2025-06-01T12:00:00Z",
                    "body": "notes",
                    "html_url": "https://example.com/r/1",
                    "prerelease": false,
                    "draft": false
                },
                {
                    "id": 2,
                    "name": null,
                    "tag_name": "v1.9.9",
                    "published_at": null,
                    "body": null,
                    "html_url": "https://example.com/r/2"
                }
            ])))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let releases = client.try_latest_releases("acme/core", 3).await.unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].name, "Core 2.0");
        assert_eq!(releases[1].name, "v1.9.9"); // tag fallback
        assert!(releases[1].published_at.is_none());
    }

    #[tokio::test]
    async fn test_recent_commits_author_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/core/commits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "sha": "0123456789abcdef",
                    "html_url": "https://example.com/c/1",
                    "commit": {
                        "message": "fix the thing",
                        "author": { "name": "Ada", "date": "2025-06-02T08:00:00Z" },
                        "committer": { "name": "bot", "date": "2025-06-02T09:00:00Z" }
                    }
                },
                {
                    "sha": "fedcba9876543210",
                    "html_url": "https://example.com/c/2",
                    "commit": {
                        "message": "imported",
                        "author": null,
                        "committer": { "name": "importer", "date": "2025-06-01T00:00:00Z" }
                    }
                }
            ])))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let commits = client.try_recent_commits("acme/core", 5).await.unwrap();
        assert_eq!(commits[0].author.name, "Ada");
        assert_eq!(commits[0].short_sha, "0123456");
        assert_eq!(commits[1].author.name, "importer");
    }

    #[tokio::test]
    async fn test_commit_serializes_short_sha() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/core/commits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "sha": "0123456789abcdef",
                "html_url": "https://example.com/c/1",
                "commit": {
                    "message": "fix the thing",
                    "author": { "name": "Ada", "date": "2025-06-02T08:00:00Z" },
                    "committer": null
                }
            }])))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let commits = client.try_recent_commits("acme/core", 5).await.unwrap();
        let value = serde_json::to_value(&commits[0]).unwrap();
        assert_eq!(value["shortSha"], "0123456");
        assert_eq!(value["sha"], "0123456789abcdef");
    }

    #[tokio::test]
    async fn test_fail_soft_returns_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let repo = RepoPath::resolve("https://github.com/acme/core").unwrap();
        assert!(client.latest_releases(&repo, 3).await.is_empty());
        assert!(client.recent_commits(&repo, 5).await.is_empty());
        assert!(client.repository_info(&repo).await.is_none());
    }

    #[tokio::test]
    async fn test_organization_repos_falls_back_to_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/repos"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("q", "org:acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "name": "core",
                    "full_name": "acme/core",
                    "description": "the core",
                    "stargazers_count": 12,
                    "forks_count": 3,
                    "language": "Rust",
                    "pushed_at": "2025-06-01T12:00:00Z",
                    "html_url": "https://example.com/acme/core",
                    "updated_at": "2025-06-01T12:00:00Z"
                }]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let repos = client.try_organization_repos("acme", 1).await.unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].full_name, "acme/core");
    }

    #[tokio::test]
    async fn test_rate_limit_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rate_limit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resources": { "core": { "limit": 60, "remaining": 58, "reset": 1904067200 } }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let snapshot = client.rate_limit_status().await.unwrap();
        assert_eq!(snapshot.limit, 60);
        assert_eq!(snapshot.remaining, 58);
        assert_eq!(snapshot.reset_at.timestamp(), 1_904_067_200);
    }

    #[test]
    fn test_bundle_latest_activity() {
        let now = Utc::now();
        let mut bundle = UpdateBundle::empty(now);
        assert!(bundle.is_empty());
        assert!(bundle.latest_activity().is_none());

        bundle.commits.push(Commit {
            sha: "abc".to_string(),
            short_sha: "abc".to_string(),
            message: "m".to_string(),
            author: CommitAuthor { name: "a".to_string(), date: Some(now) },
            date: Some(now),
            html_url: String::new(),
        });
        assert!(!bundle.is_empty());
        assert_eq!(bundle.latest_activity(), Some(now));
    }

    #[test]
    fn test_bundle_serializes_camel_case() {
        let bundle = UpdateBundle::empty(Utc::now());
        let value = serde_json::to_value(&bundle).unwrap();
        assert!(value.get("lastUpdated").is_some());
        assert!(value.get("repoInfo").is_some());
    }
}
