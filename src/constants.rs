use std::time::Duration;

// process timeouts
pub const SHORT_TIMEOUT: Duration = Duration::from_secs(30);
pub const MEDIUM_TIMEOUT: Duration = Duration::from_secs(120);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(300);

// batching (stay well under OS command line limits)
pub const MAX_PATHS_PER_BATCH: usize = 200;
pub const MAX_BATCH_ARG_CHARS: usize = 30_000;

// scheduler
pub const FOLLOW_UP_SCAN_DELAY: Duration = Duration::from_millis(300);
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

// persisted state
pub const MAX_COMMIT_HISTORY: usize = 20;
pub const OWNERSHIP_FILE: &str = "staged-ownership.json";
pub const HISTORY_FILE: &str = "commit-history.json";

// sidecar metadata
pub const META_EXTENSION: &str = ".meta";
pub const GUID_KEY: &str = "guid:";

// ui
pub const MAX_FILES_TO_SHOW: usize = 50;
pub const MAX_HISTORY_TO_SHOW: usize = 10;
