//! Time <-> pixel mapping under zoom and pan.
//!
//! `zoom` scales the whole effective duration to `viewport_width * zoom`
//! pixels, `pan` scrolls that strip left. Setters reject non-finite or
//! out-of-domain input and keep the previous state, so the mapping never
//! produces NaN for finite arguments.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
struct ZoomAnimation {
    from_zoom: f64,
    to_zoom: f64,
    from_pan: f64,
    to_pan: f64,
    /// Stamped by the first `tick` after the request.
    started: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    zoom: f64,
    pan: f64,
    viewport_width: f64,
    effective_duration: f64,
    min_zoom: f64,
    max_zoom: f64,
    animation_duration: Duration,
    animation: Option<ZoomAnimation>,
}

/// Plain copy of the view parameters for consumers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ViewSnapshot {
    pub zoom: f64,
    pub pan: f64,
    pub viewport_width: f64,
    pub effective_duration: f64,
}

impl ViewState {
    pub fn new(viewport_width: f64, effective_duration: f64, config: &EngineConfig) -> Self {
        let config = config.clone().validated();
        let viewport_width = if viewport_width.is_finite() && viewport_width > 0.0 {
            viewport_width
        } else {
            1.0
        };
        let effective_duration = if effective_duration.is_finite() && effective_duration > 0.0 {
            effective_duration
        } else {
            config.default_duration_secs
        };
        Self {
            zoom: 1.0_f64.clamp(config.min_zoom, config.max_zoom),
            pan: 0.0,
            viewport_width,
            effective_duration,
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            animation_duration: Duration::from_millis(config.zoom_animation_ms),
            animation: None,
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn pan(&self) -> f64 {
        self.pan
    }

    pub fn viewport_width(&self) -> f64 {
        self.viewport_width
    }

    pub fn effective_duration(&self) -> f64 {
        self.effective_duration
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Zoom and pan an in-flight animation is heading to, or the current values.
    pub fn target(&self) -> (f64, f64) {
        match &self.animation {
            Some(anim) => (anim.to_zoom, anim.to_pan),
            None => (self.zoom, self.pan),
        }
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            zoom: self.zoom,
            pan: self.pan,
            viewport_width: self.viewport_width,
            effective_duration: self.effective_duration,
        }
    }

    /// Pixels of content width at the current zoom.
    fn content_width(&self) -> f64 {
        self.viewport_width * self.zoom
    }

    pub fn time_to_pixel(&self, t: f64) -> f64 {
        if !t.is_finite() {
            warn!(t, "non-finite time, mapping to timeline start");
            return -self.pan;
        }
        t / self.effective_duration * self.content_width() - self.pan
    }

    pub fn pixel_to_time(&self, x: f64) -> f64 {
        if !x.is_finite() {
            warn!(x, "non-finite pixel, mapping to left edge");
            return self.pan / self.content_width() * self.effective_duration;
        }
        (x + self.pan) / self.content_width() * self.effective_duration
    }

    /// Pixel width of a time span.
    pub fn duration_to_pixels(&self, secs: f64) -> f64 {
        secs / self.effective_duration * self.content_width()
    }

    /// Times at the left and right viewport edges.
    pub fn visible_time_range(&self) -> (f64, f64) {
        (self.pixel_to_time(0.0), self.pixel_to_time(self.viewport_width))
    }

    /// Request a zoom level. With `focal_pixel` the time under that pixel stays
    /// put; otherwise the left-edge time is preserved. Returns false when the
    /// request was rejected.
    pub fn set_zoom(&mut self, target: f64, focal_pixel: Option<f64>, animated: bool) -> bool {
        if !target.is_finite() || target <= 0.0 {
            warn!(target, "zoom request rejected");
            return false;
        }
        let to_zoom = target.clamp(self.min_zoom, self.max_zoom);

        let to_pan = match focal_pixel.filter(|f| f.is_finite()) {
            Some(focal) => {
                let t = self.pixel_to_time(focal);
                t / self.effective_duration * self.viewport_width * to_zoom - focal
            }
            None => self.pan * to_zoom / self.zoom,
        };
        let to_pan = if to_pan.is_finite() { to_pan.max(0.0) } else { self.pan };

        if animated && !self.animation_duration.is_zero() {
            self.animation = Some(ZoomAnimation {
                from_zoom: self.zoom,
                to_zoom,
                from_pan: self.pan,
                to_pan,
                started: None,
            });
        } else {
            self.animation = None;
            self.zoom = to_zoom;
            self.pan = to_pan;
        }
        debug!(zoom = to_zoom, pan = to_pan, animated, "zoom set");
        true
    }

    /// Multiply the zoom (or the in-flight target) by `factor`.
    pub fn zoom_by(&mut self, factor: f64, focal_pixel: Option<f64>, animated: bool) -> bool {
        let (base, _) = self.target();
        self.set_zoom(base * factor, focal_pixel, animated)
    }

    /// Advance a running zoom animation. Returns true while still animating.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(anim) = self.animation.as_mut() else {
            return false;
        };
        let started = *anim.started.get_or_insert(now);
        let elapsed = now.saturating_duration_since(started);
        let progress = (elapsed.as_secs_f64() / self.animation_duration.as_secs_f64()).min(1.0);
        let eased = ease_out_cubic(progress);
        let anim = *anim;

        self.zoom = lerp(anim.from_zoom, anim.to_zoom, eased);
        self.pan = lerp(anim.from_pan, anim.to_pan, eased).max(0.0);
        if progress >= 1.0 {
            self.zoom = anim.to_zoom;
            self.pan = anim.to_pan;
            self.animation = None;
            return false;
        }
        true
    }

    /// Jump straight to the end of any running animation.
    pub fn finish_animation(&mut self) {
        if let Some(anim) = self.animation.take() {
            self.zoom = anim.to_zoom;
            self.pan = anim.to_pan;
        }
    }

    /// Set the scroll offset. Clamped at zero, unbounded to the right.
    pub fn set_pan(&mut self, pan: f64) -> bool {
        if !pan.is_finite() {
            warn!(pan, "pan request rejected");
            return false;
        }
        self.finish_animation();
        self.pan = pan.max(0.0);
        true
    }

    pub fn pan_by(&mut self, dx: f64) -> bool {
        let (_, target_pan) = self.target();
        self.set_pan(target_pan + dx)
    }

    pub fn set_viewport_width(&mut self, width: f64) -> bool {
        if !width.is_finite() || width <= 0.0 {
            warn!(width, "viewport width rejected, keeping {}", self.viewport_width);
            return false;
        }
        self.viewport_width = width;
        true
    }

    pub fn set_effective_duration(&mut self, secs: f64) -> bool {
        if !secs.is_finite() || secs <= 0.0 {
            warn!(secs, "effective duration rejected, keeping {}", self.effective_duration);
            return false;
        }
        self.effective_duration = secs;
        true
    }

    /// Scroll so `t` is on screen, parked `margin_fraction` of the width in
    /// from the edge it left by. Returns true when the pan changed.
    pub fn ensure_visible(&mut self, t: f64, margin_fraction: f64) -> bool {
        if !t.is_finite() {
            return false;
        }
        let x = self.time_to_pixel(t);
        if (0.0..=self.viewport_width).contains(&x) {
            return false;
        }
        let absolute = x + self.pan;
        let margin = self.viewport_width * margin_fraction.clamp(0.0, 1.0);
        let new_pan = if x < 0.0 {
            absolute - margin
        } else {
            absolute - (self.viewport_width - margin)
        };
        self.set_pan(new_pan)
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn ease_out_cubic(t: f64) -> f64 {
    1.0 - (1.0 - t).powi(3)
}
