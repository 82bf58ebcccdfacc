use serde::{Deserialize, Serialize};

/// Default bound on how far ahead of the receive chain an envelope may point.
pub const DEFAULT_MAX_SKIP: u64 = 1000;

/// Default number of entries kept in the message log.
pub const DEFAULT_MAX_LOG_ENTRIES: usize = 50;

/// Default geofence radius applied when a sender does not choose one.
pub const DEFAULT_GEOFENCE_RADIUS_M: u32 = 100;

/// Tunables for the messaging core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoreConfig {
    /// Largest index gap a single decrypt may skip over.
    pub max_skip: u64,
    /// Largest number of skipped message keys a session may hold.
    pub max_skipped_keys: usize,
    /// Number of entries retained by the message log.
    pub max_log_entries: usize,
    /// Radius attached to geofenced envelopes.
    pub default_geofence_radius_m: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_skip: DEFAULT_MAX_SKIP,
            max_skipped_keys: DEFAULT_MAX_SKIP as usize,
            max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
            default_geofence_radius_m: DEFAULT_GEOFENCE_RADIUS_M,
        }
    }
}

impl CoreConfig {
    /// Override the per-decrypt skip bound.
    pub fn with_max_skip(mut self, max_skip: u64) -> Self {
        self.max_skip = max_skip;
        self
    }

    /// Override the skipped-key cache capacity.
    pub fn with_max_skipped_keys(mut self, max_skipped_keys: usize) -> Self {
        self.max_skipped_keys = max_skipped_keys;
        self
    }

    /// Override the message log capacity.
    pub fn with_max_log_entries(mut self, max_log_entries: usize) -> Self {
        self.max_log_entries = max_log_entries;
        self
    }

    /// Override the radius used for new geofences.
    pub fn with_default_geofence_radius(mut self, radius_m: u32) -> Self {
        self.default_geofence_radius_m = radius_m;
        self
    }
}
