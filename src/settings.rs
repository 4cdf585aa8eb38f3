//! Process-wide playback cache tunables.
//!
//! A plain serde struct with JSON load/save, shared through one global
//! `RwLock`. The worker snapshots the values once per pass, so edits made
//! from a preferences UI take effect on the next pass without restarts.

use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{LazyLock, RwLock};

/// Cache engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Master switch for the pre-roll worker. When false the worker only
    /// tracks the playhead and sleeps.
    pub enable_playback_caching: bool,

    /// Frames that must be visited before `is_ready()` reports true.
    pub video_cache_min_preroll_frames: i64,

    /// Window size (frames past the playhead) during playback.
    pub video_cache_max_preroll_frames: i64,

    /// Fraction of the cache byte budget spent ahead of the playhead while
    /// paused. Valid domain (0, 1].
    pub video_cache_percent_ahead: f64,

    /// Absolute ceiling on the paused-mode window size.
    pub video_cache_max_frames: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_playback_caching: true,
            video_cache_min_preroll_frames: 4,
            video_cache_max_preroll_frames: 8,
            video_cache_percent_ahead: 0.7,
            video_cache_max_frames: 300,
        }
    }
}

static GLOBAL: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

impl Settings {
    /// Process-wide settings instance.
    pub fn global() -> &'static RwLock<Settings> {
        &GLOBAL
    }

    /// Clone of the current global values (one coherent read).
    pub fn snapshot() -> Settings {
        GLOBAL.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the global values.
    pub fn replace(new: Settings) {
        *GLOBAL.write().unwrap_or_else(|e| e.into_inner()) = new;
    }

    /// Load settings from a JSON file.
    pub fn from_json(path: &Path) -> Result<Self, String> {
        let json = std::fs::read_to_string(path).map_err(|e| format!("Read error: {}", e))?;
        let settings: Settings =
            serde_json::from_str(&json).map_err(|e| format!("Parse error: {}", e))?;
        Ok(settings)
    }

    /// Save settings to a JSON file.
    pub fn to_json(&self, path: &Path) -> Result<(), String> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| format!("Serialize error: {}", e))?;
        std::fs::write(path, json).map_err(|e| format!("Write error: {}", e))?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert!(s.enable_playback_caching);
        assert_eq!(s.video_cache_min_preroll_frames, 4);
        assert_eq!(s.video_cache_max_preroll_frames, 8);
        assert!(s.video_cache_percent_ahead > 0.0 && s.video_cache_percent_ahead <= 1.0);
        assert_eq!(s.video_cache_max_frames, 300);
    }

    #[test]
    fn test_json_round_trip() {
        let mut s = Settings::default();
        s.video_cache_max_preroll_frames = 32;
        s.video_cache_percent_ahead = 0.9;

        let json = serde_json::to_string(&s).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_global_snapshot_reflects_replace() {
        let mut s = Settings::default();
        s.video_cache_max_frames = 123;
        Settings::replace(s);
        assert_eq!(Settings::snapshot().video_cache_max_frames, 123);
        Settings::replace(Settings::default());
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let back: Settings = serde_json::from_str(r#"{"video_cache_max_frames": 50}"#).unwrap();
        assert_eq!(back.video_cache_max_frames, 50);
        assert_eq!(
            back.video_cache_min_preroll_frames,
            Settings::default().video_cache_min_preroll_frames
        );
    }
}
