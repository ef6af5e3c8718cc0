//! Pane tuning knobs with serde-friendly defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaneConfig {
    /// Page size requested from the history backend.
    #[serde(default = "default_slice_limit")]
    pub slice_limit: u32,

    /// Ceiling on consecutive backfill rounds after a short initial page.
    #[serde(default = "default_backfill_limit")]
    pub backfill_limit: u32,

    /// Settle window for viewport recomputation after scroll or resize.
    #[serde(default = "default_viewport_debounce_ms")]
    pub viewport_debounce_ms: u64,

    /// Slack, in content-height units, for the "already at bottom" check.
    #[serde(default = "default_bottom_tolerance")]
    pub bottom_tolerance: usize,

    /// Preferred leading dimension when choosing among photo renditions.
    #[serde(default = "default_photo_target_size")]
    pub photo_target_size: u32,

    /// Priority passed to the asset fetcher for pane-initiated downloads.
    #[serde(default = "default_fetch_priority")]
    pub fetch_priority: u8,
}

fn default_slice_limit() -> u32 {
    20
}

fn default_backfill_limit() -> u32 {
    5
}

fn default_viewport_debounce_ms() -> u64 {
    250
}

fn default_bottom_tolerance() -> usize {
    1
}

fn default_photo_target_size() -> u32 {
    260
}

fn default_fetch_priority() -> u8 {
    1
}

impl Default for PaneConfig {
    fn default() -> Self {
        Self {
            slice_limit: default_slice_limit(),
            backfill_limit: default_backfill_limit(),
            viewport_debounce_ms: default_viewport_debounce_ms(),
            bottom_tolerance: default_bottom_tolerance(),
            photo_target_size: default_photo_target_size(),
            fetch_priority: default_fetch_priority(),
        }
    }
}

impl PaneConfig {
    pub fn viewport_debounce(&self) -> Duration {
        Duration::from_millis(self.viewport_debounce_ms)
    }
}
