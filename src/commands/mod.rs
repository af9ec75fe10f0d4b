mod clear;
mod common;
mod feed;
mod fetch;
mod preload;
mod status;

pub use clear::{ClearArgs, clear_caches};
pub use feed::{GlobalArgs, RefreshArgs, refresh_feed, show_global_feed};
pub use fetch::{FetchArgs, fetch_updates};
pub use preload::{PreloadArgs, preload_caches};
pub use status::{StatusArgs, show_status};
