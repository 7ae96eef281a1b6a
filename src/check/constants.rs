//! Constants for the check pipeline (size cap, retention, timeouts).

/// Maximum accepted body size (10 MiB), checked before the body is fully read.
pub const MAX_CONTENT_BYTES: u64 = 10 * 1024 * 1024;

/// Number of snapshots kept per resource after a changed check is persisted.
pub const RETAINED_SNAPSHOTS: usize = 10;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default total request timeout (60 seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// How many leading body bytes are scanned for a `<meta charset>` declaration.
pub const CHARSET_SNIFF_BYTES: usize = 1024;
