//! Shared wiring used by every subcommand.

use chrono::Utc;
use clap::{Args, ValueEnum};
use devpulse::Result;
use devpulse::config::Config;
use devpulse::feed::{
    FetchGate, FileStore, GateConfig, MemoryStore, RateBudget, ResourceRef, Store, UpdateService,
};
use directories::BaseDirs;
use ohno::IntoAppError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Info, warning, and error messages
    Info,
    /// Debug and above messages
    Debug,
    /// All messages including trace
    Trace,
}

/// Common arguments shared between subcommands
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN")]
    pub github_token: Option<String>,

    /// Path to configuration file [default: devpulse.toml if present]
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory where fetched updates are cached [default: platform cache dir]
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Keep caches in memory only, writing nothing to disk
    #[arg(long)]
    pub memory_cache: bool,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "none", global = true)]
    pub log_level: LogLevel,
}

#[derive(Debug)]
pub struct Common {
    pub service: UpdateService,
    pub config: Config,
}

impl Common {
    /// Build the update service from the command line and configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or the cache
    /// directory cannot be prepared.
    pub async fn new(args: &CommonArgs) -> Result<Self> {
        Self::init_logging(args.log_level);

        let config = Config::load(args.config.as_deref())?;

        let gate_config = GateConfig {
            user_agent: config.user_agent.clone(),
            token: args.github_token.clone(),
            min_interval: config.min_request_interval(),
            ..GateConfig::default()
        };
        let budget = Arc::new(Mutex::new(RateBudget::conservative(Utc::now())));
        let gate = Arc::new(FetchGate::new(&gate_config, budget)?);

        let (resource_store, feed_store): (Arc<dyn Store>, Arc<dyn Store>) = if args.memory_cache {
            (Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
        } else {
            let cache_dir = if let Some(dir) = &args.cache_dir {
                dir.clone()
            } else {
                BaseDirs::new()
                    .into_app_err("couldn't determine cache directory")?
                    .cache_dir()
                    .join("devpulse")
            };
            let store = Arc::new(FileStore::new(cache_dir)?);
            (store.clone(), store)
        };

        let service = UpdateService::new(gate, &config, resource_store, feed_store);

        // Replace the assumed quota with whatever the upstream reports; the
        // endpoint itself costs nothing.
        service.seed_budget().await;

        Ok(Self { service, config })
    }

    /// Initialize logger based on log level
    fn init_logging(log_level: LogLevel) {
        if log_level == LogLevel::None {
            return;
        }

        let level = match log_level {
            LogLevel::None => return,
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };

        let env = env_logger::Env::default().filter_or("RUST_LOG", level);

        env_logger::Builder::from_env(env)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(matches!(log_level, LogLevel::Debug) || matches!(log_level, LogLevel::Trace))
            .init();
    }
}

/// Read a curated resource list from a JSON file.
pub fn load_resources(path: &Path) -> Result<Vec<ResourceRef>> {
    let text = fs::read_to_string(path)
        .into_app_err_with(|| format!("reading resource list from {}", path.display()))?;
    serde_json::from_str(&text)
        .into_app_err_with(|| format!("parsing resource list from {}", path.display()))
}

/// A token that trips when the user hits Ctrl-C, letting long passes return
/// what they have instead of being killed mid-write.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    drop(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    }));
    token
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).into_app_err("serializing output")?;
    println!("{rendered}");
    Ok(())
}
