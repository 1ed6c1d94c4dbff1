//! Viewport activity debounce.
//!
//! While the viewport is being dragged or zoomed, the streamer keeps
//! existing tiles but does not create new ones. The [`ViewportActivity`]
//! trait is the only thing the streamer asks: "is the viewport still
//! moving?" Implementors decide what counts as moving.

use std::time::{Duration, Instant};

/// Reports whether the viewport is actively changing.
///
/// # Implementors
///
/// - `ViewportDebounce` - changing until a quiet window has elapsed
/// - `NeverChanging` - testing: creation always allowed
/// - `AlwaysChanging` - testing: creation always suppressed
pub trait ViewportActivity: Send + Sync {
    fn is_changing(&self, now: Instant) -> bool;
}

/// Trailing-edge debounce: changing until `window` passes with no change.
#[derive(Debug, Clone)]
pub struct ViewportDebounce {
    window: Duration,
    last_change: Option<Instant>,
}

impl ViewportDebounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_change: None,
        }
    }

    /// Record a pan or zoom at `now`.
    pub fn note_change(&mut self, now: Instant) {
        self.last_change = Some(now);
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl ViewportActivity for ViewportDebounce {
    fn is_changing(&self, now: Instant) -> bool {
        self.last_change
            .map(|at| now.saturating_duration_since(at) < self.window)
            .unwrap_or(false)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NeverChanging;

impl ViewportActivity for NeverChanging {
    fn is_changing(&self, _now: Instant) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysChanging;

impl ViewportActivity for AlwaysChanging {
    fn is_changing(&self, _now: Instant) -> bool {
        true
    }
}
