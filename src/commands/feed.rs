use super::common::{Common, CommonArgs, cancel_on_ctrl_c, load_resources, print_json};
use clap::Parser;
use devpulse::Result;
use devpulse::feed::RefreshOptions;
use std::path::PathBuf;

#[derive(Parser, Debug)]
pub struct RefreshArgs {
    /// JSON file with the curated resource list
    #[arg(value_name = "PATH")]
    pub resources: PathBuf,

    /// Most resources to fetch over the network this pass
    #[arg(long, value_name = "N")]
    pub max_to_query: Option<usize>,

    /// Stop fetching once this many resources yielded updates
    #[arg(long, value_name = "N")]
    pub max_successes: Option<usize>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Run one batch refresh pass and print the per-resource results.
pub async fn refresh_feed(args: &RefreshArgs) -> Result<()> {
    let common = Common::new(&args.common).await?;
    let resources = load_resources(&args.resources)?;

    let mut opts = RefreshOptions::from_config(&common.config);
    if let Some(n) = args.max_to_query {
        opts.max_to_query = n;
    }
    if let Some(n) = args.max_successes {
        opts.max_successes = n;
    }

    let cancel = cancel_on_ctrl_c();
    let results = common.service.refresh_updates(&resources, &opts, &cancel).await;

    if results.is_empty() {
        println!("no updates available");
        return Ok(());
    }

    print_json(&results)
}

#[derive(Parser, Debug)]
pub struct GlobalArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Print the global rolling feed as it currently stands.
pub async fn show_global_feed(args: &GlobalArgs) -> Result<()> {
    let common = Common::new(&args.common).await?;
    let snapshot = common.service.global_feed();

    if snapshot.releases.is_empty() && snapshot.commits.is_empty() {
        println!("no updates available");
        return Ok(());
    }

    print_json(&snapshot)
}
