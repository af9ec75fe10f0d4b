use super::common::{Common, CommonArgs, print_json};
use clap::Parser;
use devpulse::Result;
use devpulse::feed::{CacheStatus, RateBudget};
use serde::Serialize;

#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    resource_cache: CacheStatus,
    global_feed_releases: usize,
    global_feed_commits: usize,
    budget: RateBudget,
}

/// Report cache contents and the current rate budget.
pub async fn show_status(args: &StatusArgs) -> Result<()> {
    let common = Common::new(&args.common).await?;
    let feed = common.service.global_feed();

    let report = StatusReport {
        resource_cache: common.service.cache_status(),
        global_feed_releases: feed.releases.len(),
        global_feed_commits: feed.commits.len(),
        budget: common.service.budget().await,
    };

    print_json(&report)
}
