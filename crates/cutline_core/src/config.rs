use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::error::Result;
use crate::placement::RowLayout;

/// Engine tunables. Missing fields in a config file take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Length of an animated zoom transition, milliseconds.
    pub zoom_animation_ms: u64,
    /// Multiplier applied per wheel notch when zooming.
    pub wheel_zoom_step: f64,
    /// Pixels of slack around clip edges when hit testing.
    pub hit_tolerance_px: f64,
    /// Pointer travel before a press on a clip becomes a drag.
    pub drag_threshold_px: f64,
    pub ruler_height_px: f64,
    pub track_height_px: f64,
    /// Shorter selections are discarded instead of becoming cuts.
    pub min_cut_secs: f64,
    pub fine_step_secs: f64,
    pub coarse_step_secs: f64,
    /// Extra room past the last clip.
    pub duration_buffer_secs: f64,
    /// Timeline length shown when there is no content.
    pub default_duration_secs: f64,
    /// Length given to stills, which have no intrinsic duration.
    pub default_image_secs: f64,
    /// Where `ensure_visible` parks the playhead, as a fraction from the near edge.
    pub visible_margin_fraction: f64,
    pub history_max_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.1,
            max_zoom: 10.0,
            zoom_animation_ms: 150,
            wheel_zoom_step: 1.1,
            hit_tolerance_px: 8.0,
            drag_threshold_px: 4.0,
            ruler_height_px: 24.0,
            track_height_px: 60.0,
            min_cut_secs: 0.1,
            fine_step_secs: 0.1,
            coarse_step_secs: 1.0,
            duration_buffer_secs: 10.0,
            default_duration_secs: 60.0,
            default_image_secs: 5.0,
            visible_margin_fraction: 0.2,
            history_max_len: 200,
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file. Out-of-domain values fall back to
    /// their defaults, see [`EngineConfig::validated`].
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_json::from_str(&data)?;
        Ok(config.validated())
    }

    /// Repair values the engine cannot work with. Each repaired field is
    /// logged and reset to its default; an inverted zoom range is swapped.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        fn check(name: &str, value: &mut f64, fallback: f64, ok: impl Fn(f64) -> bool) {
            if !value.is_finite() || !ok(*value) {
                warn!(field = name, value = *value, fallback, "config value out of range");
                *value = fallback;
            }
        }

        check("min_zoom", &mut self.min_zoom, defaults.min_zoom, |v| v > 0.0);
        check("max_zoom", &mut self.max_zoom, defaults.max_zoom, |v| v > 0.0);
        if self.min_zoom > self.max_zoom {
            warn!(
                min_zoom = self.min_zoom,
                max_zoom = self.max_zoom,
                "zoom bounds inverted, swapping"
            );
            std::mem::swap(&mut self.min_zoom, &mut self.max_zoom);
        }
        check("wheel_zoom_step", &mut self.wheel_zoom_step, defaults.wheel_zoom_step, |v| v > 1.0);
        check("hit_tolerance_px", &mut self.hit_tolerance_px, defaults.hit_tolerance_px, |v| v >= 0.0);
        check("drag_threshold_px", &mut self.drag_threshold_px, defaults.drag_threshold_px, |v| v >= 0.0);
        check("ruler_height_px", &mut self.ruler_height_px, defaults.ruler_height_px, |v| v >= 0.0);
        check("track_height_px", &mut self.track_height_px, defaults.track_height_px, |v| v > 0.0);
        check("min_cut_secs", &mut self.min_cut_secs, defaults.min_cut_secs, |v| v >= 0.0);
        check("fine_step_secs", &mut self.fine_step_secs, defaults.fine_step_secs, |v| v > 0.0);
        check("coarse_step_secs", &mut self.coarse_step_secs, defaults.coarse_step_secs, |v| v > 0.0);
        check("duration_buffer_secs", &mut self.duration_buffer_secs, defaults.duration_buffer_secs, |v| v >= 0.0);
        check("default_duration_secs", &mut self.default_duration_secs, defaults.default_duration_secs, |v| v > 0.0);
        check("default_image_secs", &mut self.default_image_secs, defaults.default_image_secs, |v| v > 0.0);
        check(
            "visible_margin_fraction",
            &mut self.visible_margin_fraction,
            defaults.visible_margin_fraction,
            |v| (0.0..=1.0).contains(&v),
        );
        if self.history_max_len == 0 {
            warn!(fallback = defaults.history_max_len, "history_max_len of zero replaced");
            self.history_max_len = defaults.history_max_len;
        }
        self
    }

    /// Save as pretty-printed JSON.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn row_layout(&self) -> RowLayout {
        RowLayout {
            ruler_height: self.ruler_height_px,
            track_height: self.track_height_px,
        }
    }
}
