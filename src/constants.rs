/// Wire endpoints and bus topic names shared across the pipeline stages.

// Upstream endpoints
pub const DEFAULT_STREAM_URL: &str = "https://stream.wikimedia.org/v2/stream/recentchange";
pub const DEFAULT_IRC_ADDR: &str = "irc.wikimedia.org:6667";
pub const DEFAULT_COMPARE_URL: &str = "https://en.wikipedia.org/w/api.php";

// Bus topics: one per source before normalization, then normalized and deduplicated
pub const SSE_FORWARD_TOPIC: &str = "recentchange.sse";
pub const IRC_FORWARD_TOPIC: &str = "recentchange.irc";
pub const NORMALIZED_TOPIC: &str = "recentchanges.normalized";
pub const DEDUPLICATED_TOPIC: &str = "recentchanges.dedup";

// Pipeline defaults
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 10 * 60;
/// Longest accepted dedup window (one year)
pub const MAX_DEDUP_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_ARCHIVE_FOLDER: &str = "archive";

/// Log action reported by the stream when a page is deleted
pub const LOG_ACTION_DELETE: &str = "delete";

/// Source names accepted on the command line
pub const SSE_SOURCE: &str = "sse";
pub const IRC_SOURCE: &str = "irc";

/// Get all supported source names
pub fn get_supported_sources() -> Vec<&'static str> {
    vec![SSE_SOURCE, IRC_SOURCE]
}
