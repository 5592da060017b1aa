pub mod auth;
pub mod config_watch;
pub mod leader;
pub mod path_map;
pub mod query_log;
pub mod runtime;
pub mod search;

pub use auth::{UserContext, resolve_api_key};
pub use config_watch::{ConfigWatcher, watch_config_file};
pub use leader::{LeaderError, LeaderLock, lock_path_for};
pub use path_map::{apply_forward, apply_forward_uri, apply_reverse};
pub use runtime::{Runtime, RuntimeError};
pub use search::{RRF_K, SearchEngine, SearchError, SearchRequest, SearchResponse, SearchResult, rrf_fuse};
