//! Ties the resolver, the gated client, and both caches together into the
//! operations the directory actually calls.

use super::gate::{FetchError, FetchGate};
use super::github::{GithubClient, RepoInfo, UpdateBundle};
use super::global_feed::{FeedSnapshot, GlobalFeed};
use super::repo_path::RepoPath;
use super::resource::ResourceRef;
use super::resource_cache::{CacheStatus, ResourceCache};
use super::store::Store;
use crate::Result;
use crate::config::Config;
use chrono::Utc;
use core::time::Duration;
use ohno::bail;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const LOG_TARGET: &str = "   updates";

/// Upstream requests one full fetch group costs: releases + commits + either
/// repository metadata or the org listing that stood in for it.
const REQUESTS_PER_RESOURCE: u32 = 3;

/// Knobs for a batch refresh pass.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Most resources fetched over the network in one pass.
    pub max_to_query: usize,

    /// Stop fetching once this many resources yielded updates.
    pub max_successes: usize,

    /// Pause between consecutive network fetches.
    pub item_delay: Duration,
}

impl RefreshOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_to_query: config.max_to_query,
            max_successes: config.max_successes,
            item_delay: Duration::ZERO,
        }
    }
}

/// One resource's updates in a batch result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUpdates {
    pub resource: String,
    #[serde(flatten)]
    pub bundle: UpdateBundle,
}

/// Counts from a preload pass.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadSummary {
    pub succeeded: usize,
    pub empty: usize,
    pub failed: usize,
    pub skipped: usize,
    pub already_cached: usize,
    pub cancelled: bool,
}

/// How one fetch group ended. "Nothing published" and "couldn't ask" are kept
/// apart so that only the former is cached.
enum FetchOutcome {
    Success(UpdateBundle),
    Empty(UpdateBundle),
    Failed,
}

/// The update subsystem's front door.
#[derive(Debug)]
pub struct UpdateService {
    github: GithubClient,
    gate: Arc<FetchGate>,
    resource_cache: ResourceCache,
    global_feed: GlobalFeed,
    release_limit: usize,
    commit_limit: usize,
}

impl UpdateService {
    #[must_use]
    pub fn new(
        gate: Arc<FetchGate>,
        config: &Config,
        resource_store: Arc<dyn Store>,
        feed_store: Arc<dyn Store>,
    ) -> Self {
        let github = GithubClient::new(gate.clone(), config.api_base.clone());
        Self {
            github,
            gate,
            resource_cache: ResourceCache::new(resource_store, config.resource_cache_ttl()),
            global_feed: GlobalFeed::new(feed_store, config.max_feed_items, config.global_feed_ttl()),
            release_limit: config.release_limit,
            commit_limit: config.commit_limit,
        }
    }

    /// Ask the upstream for the real quota and adopt it, replacing the
    /// conservative assumption the budget starts with.
    pub async fn seed_budget(&self) {
        if let Some(snapshot) = self.github.rate_limit_status().await {
            log::debug!(target: LOG_TARGET,
                "seeded rate budget: {}/{} remaining, resets at {}",
                snapshot.remaining, snapshot.limit, snapshot.reset_at);
            self.gate.absorb(snapshot).await;
        }
    }

    /// Updates for a single resource: cached when fresh, fetched otherwise.
    ///
    /// A resource whose URL doesn't resolve to a repository or organization
    /// is an error; upstream trouble degrades to an empty bundle instead.
    pub async fn updates_for(&self, resource: &ResourceRef) -> Result<UpdateBundle> {
        let Some(path) = resource.repo_path() else {
            bail!("resource '{}' has no resolvable repository URL", resource.name);
        };

        if let Some(bundle) = self.resource_cache.get(resource) {
            return Ok(bundle);
        }

        match self.fetch_bundle(resource, &path).await {
            Ok(FetchOutcome::Success(bundle) | FetchOutcome::Empty(bundle)) => Ok(bundle),
            Ok(FetchOutcome::Failed) => Ok(UpdateBundle::empty(Utc::now())),
            Err(e) => {
                log::warn!(target: LOG_TARGET, "fetch for '{}' hit the rate limit: {e}", resource.name);
                Ok(UpdateBundle::empty(Utc::now()))
            }
        }
    }

    /// One batch refresh pass over the curated list.
    ///
    /// Fresh cache hits are served without network. The rest are fetched in
    /// input order, bounded by `max_to_query` and by what the rate budget can
    /// afford, stopping early once `max_successes` resources yielded updates.
    /// Individual failures are logged and skipped; hitting the rate limit
    /// stops all further fetching this pass. Resources with nothing to show
    /// are omitted, and the result is ordered by most recent activity.
    pub async fn refresh_updates(
        &self,
        resources: &[ResourceRef],
        opts: &RefreshOptions,
        cancel: &CancellationToken,
    ) -> Vec<ResourceUpdates> {
        let budget = self.gate.budget_snapshot().await;
        let affordable = (budget.remaining / REQUESTS_PER_RESOURCE) as usize;
        let fetch_cap = opts.max_to_query.min(affordable);
        if fetch_cap < opts.max_to_query {
            log::info!(target: LOG_TARGET,
                "rate budget allows only {fetch_cap} fetches this pass ({} requests remaining)",
                budget.remaining);
        }

        let mut results = Vec::new();
        let mut fetched = 0;
        let mut successes = 0;
        let mut limited = false;

        for resource in resources {
            if cancel.is_cancelled() {
                log::info!(target: LOG_TARGET, "refresh cancelled, returning partial results");
                break;
            }

            let Some(path) = resource.repo_path() else {
                log::debug!(target: LOG_TARGET, "skipping '{}': no resolvable repository URL", resource.name);
                continue;
            };

            if let Some(bundle) = self.resource_cache.get(resource) {
                if !bundle.is_empty() {
                    results.push(ResourceUpdates { resource: resource.name.clone(), bundle });
                }
                continue;
            }

            if limited || fetched >= fetch_cap || successes >= opts.max_successes {
                continue;
            }

            if fetched > 0 && !opts.item_delay.is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(opts.item_delay) => {}
                }
            }

            fetched += 1;
            match self.fetch_bundle(resource, &path).await {
                Ok(FetchOutcome::Success(bundle)) => {
                    successes += 1;
                    results.push(ResourceUpdates { resource: resource.name.clone(), bundle });
                }
                Ok(FetchOutcome::Empty(_)) => {
                    log::debug!(target: LOG_TARGET, "no recent activity for '{}'", resource.name);
                }
                Ok(FetchOutcome::Failed) => {
                    log::warn!(target: LOG_TARGET, "couldn't fetch updates for '{}'", resource.name);
                }
                Err(e) => {
                    log::warn!(target: LOG_TARGET, "rate limited, stopping fetches this pass: {e}");
                    limited = true;
                }
            }
        }

        sort_by_recency(&mut results);
        results
    }

    /// Bulk cache population with a fixed pause between fetches. Used to warm
    /// the caches outside interactive traffic.
    pub async fn preload(
        &self,
        resources: &[ResourceRef],
        limit: Option<usize>,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> PreloadSummary {
        let mut summary = PreloadSummary::default();
        let take = limit.unwrap_or(resources.len());

        for resource in resources.iter().take(take) {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let Some(path) = resource.repo_path() else {
                summary.skipped += 1;
                continue;
            };

            if self.resource_cache.get(resource).is_some() {
                summary.already_cached += 1;
                continue;
            }

            match self.fetch_bundle(resource, &path).await {
                Ok(FetchOutcome::Success(_)) => summary.succeeded += 1,
                Ok(FetchOutcome::Empty(_)) => summary.empty += 1,
                Ok(FetchOutcome::Failed) => summary.failed += 1,
                Err(e) => {
                    log::warn!(target: LOG_TARGET, "preload stopped by rate limit: {e}");
                    summary.failed += 1;
                    break;
                }
            }

            if !delay.is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => {
                        summary.cancelled = true;
                        break;
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }

        summary
    }

    #[must_use]
    pub fn cache_status(&self) -> CacheStatus {
        self.resource_cache.status()
    }

    /// Current view of the rate budget.
    pub async fn budget(&self) -> super::budget::RateBudget {
        self.gate.budget_snapshot().await
    }

    /// Evict expired per-resource entries.
    pub fn cleanup_caches(&self) -> usize {
        self.resource_cache.cleanup_expired()
    }

    pub fn clear_caches(&self) {
        self.resource_cache.clear();
        self.global_feed.clear();
        log::info!(target: LOG_TARGET, "caches cleared");
    }

    #[must_use]
    pub fn global_feed(&self) -> FeedSnapshot {
        self.global_feed.read()
    }

    /// Run one fetch group for a resource and fold the result into the
    /// caches. Organization paths are first narrowed to the organization's
    /// most recently updated repository, since an org page has no releases or
    /// commits of its own.
    ///
    /// `Err` is reserved for rate-limit exhaustion; every other failure comes
    /// back as [`FetchOutcome::Failed`].
    async fn fetch_bundle(
        &self,
        resource: &ResourceRef,
        path: &RepoPath,
    ) -> core::result::Result<FetchOutcome, FetchError> {
        let (repo, org_info) = match path {
            RepoPath::Org(org) => match self.github.try_organization_repos(org, 1).await {
                Ok(repos) => match repos.into_iter().next() {
                    Some(info) => match repo_path_of(&info) {
                        Some(repo) => (repo, Some(info)),
                        None => return Ok(FetchOutcome::Failed),
                    },
                    None => {
                        // An org with no repositories has nothing to show;
                        // cache that so we don't keep asking.
                        let bundle = UpdateBundle::empty(Utc::now());
                        self.resource_cache.set(resource, bundle.clone());
                        return Ok(FetchOutcome::Empty(bundle));
                    }
                },
                Err(e @ FetchError::RateLimited { .. }) => return Err(e),
                Err(e) => {
                    log::warn!(target: LOG_TARGET, "couldn't resolve org '{path}': {e}");
                    return Ok(FetchOutcome::Failed);
                }
            },
            RepoPath::Repo { .. } => (path.clone(), None),
        };

        log::debug!(target: LOG_TARGET, "fetching updates for '{}' from {repo}", resource.name);
        let repo_str = repo.to_string();

        let (releases, commits, repo_info) = if let Some(info) = org_info {
            let (releases, commits) = tokio::join!(
                self.github.try_latest_releases(&repo_str, self.release_limit),
                self.github.try_recent_commits(&repo_str, self.commit_limit),
            );
            (releases, commits, Some(info))
        } else {
            let (releases, commits, info) = tokio::join!(
                self.github.try_latest_releases(&repo_str, self.release_limit),
                self.github.try_recent_commits(&repo_str, self.commit_limit),
                self.github.repository_info(&repo),
            );
            (releases, commits, info)
        };

        if matches!(releases, Err(FetchError::RateLimited { .. }))
            || matches!(commits, Err(FetchError::RateLimited { .. }))
        {
            return Err(FetchError::RateLimited { reset_at: None });
        }

        // Both lists failing means we learned nothing; don't cache that.
        if releases.is_err() && commits.is_err() {
            return Ok(FetchOutcome::Failed);
        }

        let bundle = UpdateBundle {
            releases: releases.unwrap_or_default(),
            commits: commits.unwrap_or_default(),
            repo_info,
            last_updated: Utc::now(),
        };

        self.resource_cache.set(resource, bundle.clone());

        if bundle.is_empty() {
            Ok(FetchOutcome::Empty(bundle))
        } else {
            self.global_feed.merge_tagged(&resource.name, &bundle.releases, &bundle.commits);
            Ok(FetchOutcome::Success(bundle))
        }
    }
}

/// Most recent activity first; resources with no datable activity sink to
/// the end.
fn sort_by_recency(results: &mut [ResourceUpdates]) {
    results.sort_by(|a, b| b.bundle.latest_activity().cmp(&a.bundle.latest_activity()));
}

fn repo_path_of(info: &RepoInfo) -> Option<RepoPath> {
    let (owner, repo) = info.full_name.split_once('/')?;
    Some(RepoPath::Repo {
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}
