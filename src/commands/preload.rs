use super::common::{Common, CommonArgs, cancel_on_ctrl_c, load_resources, print_json};
use clap::Parser;
use core::time::Duration;
use devpulse::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
pub struct PreloadArgs {
    /// JSON file with the curated resource list
    #[arg(value_name = "PATH")]
    pub resources: PathBuf,

    /// Only preload the first N resources
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Pause between resources, in seconds [default: from configuration]
    #[arg(long, value_name = "SECS")]
    pub delay: Option<u64>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Warm the per-resource cache for a whole list, gently.
pub async fn preload_caches(args: &PreloadArgs) -> Result<()> {
    let common = Common::new(&args.common).await?;
    let resources = load_resources(&args.resources)?;

    let delay = args.delay.map_or_else(|| common.config.preload_delay(), Duration::from_secs);
    let cancel = cancel_on_ctrl_c();

    let summary = common.service.preload(&resources, args.limit, delay, &cancel).await;
    print_json(&summary)
}
