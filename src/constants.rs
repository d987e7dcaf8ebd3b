//! # Delivery Constants
//!
//! Sentinel values, defaults and status vocabulary shared by the state machine,
//! the orchestrator and the monitor.

use std::time::Duration;

/// Delivery token sentinels meaning "not under delivery"
pub mod tokens {
    /// Written when a finished delivery releases its token
    pub const NO_TOKEN: &str = "NO-TOKEN";
    /// Legacy sentinel still present on older records
    pub const NOT_UNDER_DELIVERY: &str = "not_under_delivery";
    /// Returned in hard-stage-only mode, where the operator starts the transfer by hand
    pub const MANUALLY_SET_UP: &str = "manually-set-up";

    pub const SENTINELS: [&str; 2] = [NO_TOKEN, NOT_UNDER_DELIVERY];
}

/// Transfer tool defaults
pub mod transfer {
    pub const OUTBOX_COMMAND: &str = "to_outbox";
    pub const INFO_COMMAND: &str = "moverinfo";
    pub const REQUIRED_VERSION: &str = "1.0.0";
    /// Group that must own every hard-staged entry before the transfer starts
    pub const DELIVERY_GROUP_ID: u32 = 47537;
}

/// Monitor defaults and the two historical ceilings that disagree
pub mod monitor {
    use super::Duration;

    pub const POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);
    /// Ceiling historically enforced by the monitor
    pub const HISTORICAL_ENFORCED_CEILING_HOURS: u64 = 7 * 24;
    /// Ceiling historically quoted to operators
    pub const HISTORICAL_MESSAGE_CEILING_HOURS: u64 = 48;
}

/// Remote ticket defaults
pub mod ticket {
    pub const VALIDITY_DAYS: i64 = 45;
    pub const DATE_FORMAT: &str = "%Y-%m-%d";
    pub const TITLE_PREFIX: &str = "DELIVERY";
}

/// Sample processing status that excludes a sample from project completion
pub const SAMPLE_STATUS_ABORTED: &str = "ABORTED";

/// Sidecar suffix of the run-folder archive checksum
pub const RUN_FOLDER_CHECKSUM_SUFFIX: &str = ".md5";

/// Check whether a raw token value denotes "no token"
pub fn is_sentinel_token(token: &str) -> bool {
    token.trim().is_empty() || tokens::SENTINELS.contains(&token)
}
