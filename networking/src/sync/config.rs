/// Sync coordinator limits.

/// Maximum headers a peer may send in one batch.
pub const MAX_HEADERS_PER_BATCH: usize = 2000;

/// Tip events buffered per subscriber before slow subscribers start lagging.
pub const TIP_EVENT_CAPACITY: usize = 256;
