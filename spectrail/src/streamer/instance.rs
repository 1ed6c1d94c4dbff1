//! Tile instance lifecycle.
//!
//! # State Machine
//!
//! ```text
//! Pending --FetchStarted--> Loading --FetchSucceeded--> Loaded --FadedIn--> Visible
//!                           Loading --FetchFailed(Suppress)--> Failed
//!                           Loading --FetchFailed(Evict)--> Removed
//! live --Hide--> Hiding { evict: false, resume }
//! live --Evict--> Hiding { evict: true, resume }
//! Hiding { resume } --Keep--> resume
//! Hiding { evict: true } --FadedOut--> Removed
//! ```
//!
//! `live` is any of Pending, Loading, Loaded, Visible or Failed. Removal
//! only happens on `FadedOut`, which [`TileInstance::advance`] raises once
//! alpha is zero, so an instance evicted and kept again within one frame
//! survives. Instances that never drew anything fade out instantly.
//!
//! [`transition`] is pure; [`TileInstance`] applies it and owns the alpha
//! and the loaded asset.

use super::source::{AssetHandle, FetchError, FetchFailurePolicy};
use crate::pyramid::TileDescriptor;

/// Live phase an instance returns to when a pending hide is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Loading,
    Loaded,
    Visible,
    Failed,
}

impl Phase {
    /// True once the fetch has finished, successfully or not.
    pub fn is_settled(self) -> bool {
        matches!(self, Phase::Loaded | Phase::Visible | Phase::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Pending,
    Loading,
    Loaded,
    Visible,
    /// Fading out. Evicting instances are removed once alpha reaches zero;
    /// others stay resident, invisible, for reuse.
    Hiding { evict: bool, resume: Phase },
    /// Fetch failed; settled, never rendered.
    Failed,
    Removed,
}

impl TileState {
    /// The live phase, if the state is not hiding or removed.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            TileState::Pending => Some(Phase::Pending),
            TileState::Loading => Some(Phase::Loading),
            TileState::Loaded => Some(Phase::Loaded),
            TileState::Visible => Some(Phase::Visible),
            TileState::Failed => Some(Phase::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TileState::Pending => "pending",
            TileState::Loading => "loading",
            TileState::Loaded => "loaded",
            TileState::Visible => "visible",
            TileState::Hiding { .. } => "hiding",
            TileState::Failed => "failed",
            TileState::Removed => "removed",
        }
    }
}

impl From<Phase> for TileState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Pending => TileState::Pending,
            Phase::Loading => TileState::Loading,
            Phase::Loaded => TileState::Loaded,
            Phase::Visible => TileState::Visible,
            Phase::Failed => TileState::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileEvent {
    FetchStarted,
    FetchSucceeded,
    FetchFailed(FetchFailurePolicy),
    FadedIn,
    FadedOut,
    Keep,
    Hide,
    Evict,
}

/// Apply `event` to `state`. Events that do not apply leave it unchanged.
pub fn transition(state: TileState, event: TileEvent) -> TileState {
    use TileEvent as E;
    use TileState as S;

    match (state, event) {
        (S::Removed, _) => S::Removed,

        (S::Pending, E::FetchStarted) => S::Loading,
        (S::Loading, E::FetchSucceeded) => S::Loaded,
        (S::Loaded, E::FadedIn) => S::Visible,

        (S::Loading, E::FetchFailed(FetchFailurePolicy::Suppress)) => S::Failed,
        (S::Loading, E::FetchFailed(FetchFailurePolicy::Evict)) => S::Removed,

        // Completions can land while a hide is pending.
        (
            S::Hiding {
                evict,
                resume: Phase::Loading,
            },
            E::FetchSucceeded | E::FetchFailed(_),
        ) => match transition(S::Loading, event).phase() {
            Some(resume) => S::Hiding { evict, resume },
            None => S::Removed,
        },

        (state, E::Hide) => match state.phase() {
            Some(resume) => S::Hiding {
                evict: false,
                resume,
            },
            None => state,
        },

        (S::Hiding { resume, .. }, E::Evict) => S::Hiding {
            evict: true,
            resume,
        },
        (state, E::Evict) => match state.phase() {
            Some(resume) => S::Hiding {
                evict: true,
                resume,
            },
            None => state,
        },

        (S::Hiding { resume, .. }, E::Keep) => resume.into(),
        (S::Hiding { evict: true, .. }, E::FadedOut) => S::Removed,

        (state, _) => state,
    }
}

/// A resident tile: one per resource key.
#[derive(Debug, Clone)]
pub struct TileInstance {
    id: u64,
    descriptor: TileDescriptor,
    state: TileState,
    alpha: f64,
    asset: Option<AssetHandle>,
}

impl TileInstance {
    pub fn new(id: u64, descriptor: TileDescriptor) -> Self {
        Self {
            id,
            descriptor,
            state: TileState::Pending,
            alpha: 0.0,
            asset: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn descriptor(&self) -> &TileDescriptor {
        &self.descriptor
    }

    pub fn key(&self) -> &str {
        &self.descriptor.resource_key
    }

    pub fn zoom_level(&self) -> i32 {
        self.descriptor.zoom_level()
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn asset(&self) -> Option<&AssetHandle> {
        self.asset.as_ref()
    }

    fn apply(&mut self, event: TileEvent) {
        let next = transition(self.state, event);
        if next != self.state {
            tracing::trace!(
                key = %self.descriptor.resource_key,
                from = self.state.as_str(),
                to = next.as_str(),
                ?event,
                "Tile state change"
            );
        }
        if next == TileState::Removed {
            self.asset = None;
        }
        self.state = next;
    }

    pub fn start_fetch(&mut self) {
        self.apply(TileEvent::FetchStarted);
    }

    /// Cancel a pending hide.
    pub fn keep(&mut self) {
        self.apply(TileEvent::Keep);
    }

    pub fn hide(&mut self) {
        self.apply(TileEvent::Hide);
    }

    pub fn evict(&mut self) {
        self.apply(TileEvent::Evict);
    }

    /// Record a fetch completion.
    pub fn apply_load(&mut self, result: Result<AssetHandle, FetchError>, policy: FetchFailurePolicy) {
        match result {
            Ok(asset) => {
                let was_loading = self.phase_or_resume() == Some(Phase::Loading);
                self.apply(TileEvent::FetchSucceeded);
                if was_loading && !self.is_removed() {
                    self.asset = Some(asset);
                }
            }
            Err(e) => {
                tracing::debug!(key = %self.descriptor.resource_key, error = %e, "Tile fetch failed");
                self.apply(TileEvent::FetchFailed(policy));
            }
        }
    }

    /// Advance the fade by `dt` seconds at the given per-second rates.
    pub fn advance(&mut self, dt: f64, fade_in_per_sec: f64, fade_out_per_sec: f64) {
        match self.state {
            TileState::Loaded | TileState::Visible => {
                self.alpha = (self.alpha + fade_in_per_sec * dt).min(1.0);
                if self.alpha >= 1.0 {
                    self.apply(TileEvent::FadedIn);
                }
            }
            TileState::Hiding { .. } => {
                self.alpha = (self.alpha - fade_out_per_sec * dt).max(0.0);
                if self.alpha <= 0.0 {
                    self.apply(TileEvent::FadedOut);
                }
            }
            _ => {}
        }
    }

    fn phase_or_resume(&self) -> Option<Phase> {
        match self.state {
            TileState::Hiding { resume, .. } => Some(resume),
            other => other.phase(),
        }
    }

    /// True once the fetch has settled, successfully or not.
    pub fn is_loaded(&self) -> bool {
        self.phase_or_resume().is_some_and(Phase::is_settled)
    }

    pub fn is_failed(&self) -> bool {
        self.phase_or_resume() == Some(Phase::Failed)
    }

    pub fn is_hiding(&self) -> bool {
        matches!(self.state, TileState::Hiding { .. })
    }

    pub fn is_removed(&self) -> bool {
        self.state == TileState::Removed
    }

    /// True if the tile could paint something this frame.
    pub fn is_drawable(&self) -> bool {
        self.asset.is_some() && self.alpha > 0.0 && !self.is_removed()
    }

    pub fn is_in_range(&self, start: f64, end: f64) -> bool {
        self.descriptor.span.overlaps(start, end)
    }
}
