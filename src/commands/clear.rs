use super::common::{Common, CommonArgs};
use clap::Parser;
use devpulse::Result;

#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Only evict expired entries instead of clearing everything
    #[arg(long)]
    pub expired_only: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Drop cached updates, in memory and on disk.
pub async fn clear_caches(args: &ClearArgs) -> Result<()> {
    let common = Common::new(&args.common).await?;

    if args.expired_only {
        let removed = common.service.cleanup_caches();
        println!("evicted {removed} expired entries");
    } else {
        common.service.clear_caches();
        println!("caches cleared");
    }

    Ok(())
}
