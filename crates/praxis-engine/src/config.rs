use serde::{Deserialize, Serialize};

/// Engine tuning knobs. All fields have sensible defaults; load a
/// partial override from JSON with serde when embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wall-clock window for collecting delegation bids.
    pub auction_window_ms: u64,
    /// Minimum engine-time gap between shared-beliefset pushes.
    pub share_interval_ms: u64,
    /// A* iterations granted to each schedule (and each sandbox
    /// delegation analysis) per agent tick.
    pub max_schedule_iterations: usize,
    /// Cadence of the background loop started by `Engine::start`.
    pub tick_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auction_window_ms: 500,
            share_interval_ms: 500,
            max_schedule_iterations: 64,
            tick_interval_ms: 20,
        }
    }
}
