//! Crate-wide constants.

/// Application name, used for directory names and environment variable prefixes.
pub const APP_NAME: &str = "portwright";

/// File name of the local manifest cache inside the etc directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Path suffix appended to a remote repository URL to reach its manifest.
pub const REMOTE_MANIFEST_SUFFIX: &str = "manifest.json";

/// File name of the tool cache inside the etc directory.
pub const TOOL_CACHE_FILENAME: &str = "cache.json";

/// File name of the host substitution table inside the etc directory.
pub const HOSTS_FILENAME: &str = "hosts.json";

/// Read buffer size used when streaming files through a digest.
pub const HASH_CHUNK_SIZE: usize = 8192;

/// Number of trailing log lines carried by a build failure summary.
pub const LOG_TAIL_LINES: usize = 20;

/// Default timeout for remote manifest and nightly-version requests, in seconds.
pub const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 10;

/// Lifetime of the persisted tool cache, in seconds.
pub const TOOL_CACHE_TTL_SECS: u64 = 60 * 60 * 24;

/// Delimiter separating repository, branch and tag in a compound source URL.
pub const COMPOUND_URL_DELIMITER: char = '|';

/// Placeholder account name that does not enable the legacy host rule.
pub const PLACEHOLDER_SVN_USERNAME: &str = "username";
