use super::common::{Common, CommonArgs, print_json};
use clap::Parser;
use devpulse::Result;
use devpulse::feed::ResourceRef;

#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Resource name, shown in output and used in the cache key
    #[arg(value_name = "NAME")]
    pub name: String,

    /// GitHub organization or repository URL
    #[arg(value_name = "URL")]
    pub url: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Fetch (or serve from cache) the updates for a single resource.
pub async fn fetch_updates(args: &FetchArgs) -> Result<()> {
    let common = Common::new(&args.common).await?;
    let resource = ResourceRef::new(&args.name, &args.url);
    let bundle = common.service.updates_for(&resource).await?;
    print_json(&bundle)
}
