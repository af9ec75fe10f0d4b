//! A tool to retrieve and cache project updates from GitHub.
//!
//! # Overview
//!
//! `devpulse` takes a curated list of project URLs (organization or repository
//! pages) and turns it into deduplicated "releases" and "commits" feeds. It
//! stays inside GitHub's unauthenticated rate ceiling of 60 requests per hour
//! by routing every request through a throttled gate, and serves repeat
//! requests from its caches instead of asking again.
//!
//! # Quick Start
//!
//! Fetch the updates for a single project:
//!
//! ```bash
//! devpulse fetch Tokio https://github.com/tokio-rs/tokio
//! ```
//!
//! Refresh a whole curated list (a JSON array of `{"name", "profileUrl"}`
//! objects):
//!
//! ```bash
//! devpulse refresh resources.json
//! ```
//!
//! Organization URLs work too; they resolve to the organization's most
//! recently updated repository:
//!
//! ```bash
//! devpulse fetch Acme https://github.com/acme
//! ```
//!
//! # Caching
//!
//! Fetched updates are cached per resource (one hour by default) and merged
//! into a global rolling feed of the 25 newest releases and commits across
//! all projects. Both caches persist across runs in the platform cache
//! directory; `--memory-cache` keeps them in memory instead.
//!
//! ```bash
//! devpulse global            # show the rolling feed
//! devpulse status            # cache contents and remaining rate budget
//! devpulse clear             # start over
//! devpulse preload resources.json --limit 20
//! ```
//!
//! # Rate Limits
//!
//! Unauthenticated use is limited to 60 requests per hour, which the tool
//! budgets automatically. Supplying a token via `--github-token` or the
//! `GITHUB_TOKEN` environment variable raises the ceiling substantially.
//!
//! # Configuration
//!
//! A `devpulse.toml` in the working directory (or a file named with
//! `--config`) can override any setting, for example:
//!
//! ```toml
//! release-limit = 5
//! max-to-query = 10
//! min-request-interval-ms = 500
//! ```

use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};
use devpulse::Result;

mod commands;

use crate::commands::{
    ClearArgs, FetchArgs, GlobalArgs, PreloadArgs, RefreshArgs, StatusArgs, clear_caches, fetch_updates, preload_caches,
    refresh_feed, show_global_feed, show_status,
};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "devpulse", version, about)]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: DevpulseSubcommand,
}

#[derive(Subcommand, Debug)]
enum DevpulseSubcommand {
    /// Fetch updates for a single resource
    Fetch(Box<FetchArgs>),
    /// Refresh updates across a curated resource list
    Refresh(Box<RefreshArgs>),
    /// Show the global rolling feed
    Global(GlobalArgs),
    /// Report cache contents and the current rate budget
    Status(StatusArgs),
    /// Clear cached updates
    Clear(ClearArgs),
    /// Warm the caches for a resource list
    Preload(Box<PreloadArgs>),
}

#[tokio::main]
async fn main() -> Result<()> {
    match &Cli::parse().command {
        DevpulseSubcommand::Fetch(fetch_args) => fetch_updates(fetch_args).await,
        DevpulseSubcommand::Refresh(refresh_args) => refresh_feed(refresh_args).await,
        DevpulseSubcommand::Global(global_args) => show_global_feed(global_args).await,
        DevpulseSubcommand::Status(status_args) => show_status(status_args).await,
        DevpulseSubcommand::Clear(clear_args) => clear_caches(clear_args).await,
        DevpulseSubcommand::Preload(preload_args) => preload_caches(preload_args).await,
    }
}
