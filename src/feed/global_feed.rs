//! The global rolling feed: the newest releases and commits across every
//! curated project, bounded and deduplicated.
//!
//! Items keep the order they were merged in (newest merges first); the
//! orchestrator merges in pass order, which approximates recency well enough
//! for display. Each item is tagged with the project it came from.

use super::github::{Commit, Release};
use super::store::Store;
use chrono::{DateTime, Utc};
use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

const LOG_TARGET: &str = "      feed";

const BLOB_NAME: &str = "global-feed";

/// A release tagged with its source project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeedRelease {
    pub project: String,
    #[serde(flatten)]
    pub release: Release,
}

/// A commit tagged with its source project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeedCommit {
    pub project: String,
    #[serde(flatten)]
    pub commit: Commit,
}

/// The feed contents at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub releases: Vec<FeedRelease>,
    pub commits: Vec<FeedCommit>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct GlobalFeed {
    state: Mutex<FeedSnapshot>,
    max_items: usize,
    ttl: Duration,
    store: Arc<dyn Store>,
}

impl GlobalFeed {
    /// Build the feed over `store`, restoring the previous snapshot unless it
    /// has aged past the TTL.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, max_items: usize, ttl: Duration) -> Self {
        let state = store
            .load(BLOB_NAME)
            .and_then(|payload| serde_json::from_str::<FeedSnapshot>(&payload).ok())
            .filter(|snapshot| {
                snapshot.timestamp.is_some_and(|t| {
                    (Utc::now() - t).to_std().map(|age| age < ttl).unwrap_or(true)
                })
            })
            .unwrap_or_default();

        if !state.releases.is_empty() || !state.commits.is_empty() {
            log::debug!(target: LOG_TARGET,
                "restored global feed ({} releases, {} commits)",
                state.releases.len(), state.commits.len());
        }

        Self {
            state: Mutex::new(state),
            max_items,
            ttl,
            store,
        }
    }

    /// Merge one project's updates into the feed.
    ///
    /// New items already present (same release id / commit sha) are dropped;
    /// the survivors are prepended and each list is truncated to the bound.
    pub fn merge_tagged(&self, project: &str, releases: &[Release], commits: &[Commit]) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        // Seeding the set with the current list and inserting as we filter
        // also drops duplicates within the incoming batch itself.
        let mut seen_ids: HashSet<u64> = state.releases.iter().map(|r| r.release.id).collect();
        let mut merged: Vec<FeedRelease> = releases
            .iter()
            .filter(|r| seen_ids.insert(r.id))
            .map(|r| FeedRelease { project: project.to_string(), release: r.clone() })
            .collect();
        merged.append(&mut state.releases);
        merged.truncate(self.max_items);
        state.releases = merged;

        let mut seen_shas: HashSet<&str> = state.commits.iter().map(|c| c.commit.sha.as_str()).collect();
        let mut merged: Vec<FeedCommit> = commits
            .iter()
            .filter(|c| seen_shas.insert(c.sha.as_str()))
            .map(|c| FeedCommit { project: project.to_string(), commit: c.clone() })
            .collect();
        merged.append(&mut state.commits);
        merged.truncate(self.max_items);
        state.commits = merged;

        state.timestamp = Some(Utc::now());
        self.persist(&state);
    }

    /// Current feed contents.
    #[must_use]
    pub fn read(&self) -> FeedSnapshot {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Configured retention window, for status reporting.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Reset the feed, in memory and in the durable blob.
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = FeedSnapshot::default();
        }

        if let Err(e) = self.store.remove(BLOB_NAME) {
            log::warn!(target: LOG_TARGET, "couldn't remove feed blob: {e}");
        }
    }

    fn persist(&self, state: &FeedSnapshot) {
        match serde_json::to_string(state) {
            Ok(payload) => {
                if let Err(e) = self.store.save(BLOB_NAME, &payload) {
                    log::warn!(target: LOG_TARGET, "couldn't persist global feed: {e}");
                }
            }
            Err(e) => log::warn!(target: LOG_TARGET, "couldn't serialize global feed: {e}"),
        }
    }
}
