//! Classification data tiles and score bars.

use crate::pyramid::TileSpan;

/// One classification score over a bar-sized slice of time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBar {
    pub time_start: f64,
    pub time_end: f64,
    pub score: f64,
    /// Bar zoom level the score was computed at.
    pub zoom_level: i32,
}

impl ScoreBar {
    pub fn duration(&self) -> f64 {
        self.time_end - self.time_start
    }

    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.time_start < end && self.time_end > start
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DataTileState {
    Loading,
    /// Settled. Failed fetches settle with no bars.
    Loaded(Vec<ScoreBar>),
}

/// A data tile: the bars for one span at one bar zoom level.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTile {
    pub(crate) span: TileSpan,
    pub(crate) bar_zoom: i32,
    pub(crate) state: DataTileState,
}

impl DataTile {
    pub(crate) fn loading(span: TileSpan, bar_zoom: i32) -> Self {
        Self {
            span,
            bar_zoom,
            state: DataTileState::Loading,
        }
    }

    pub fn span(&self) -> &TileSpan {
        &self.span
    }

    pub fn bar_zoom(&self) -> i32 {
        self.bar_zoom
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, DataTileState::Loaded(_))
    }

    /// Bars of a loaded tile; empty while loading.
    pub fn bars(&self) -> &[ScoreBar] {
        match &self.state {
            DataTileState::Loaded(bars) => bars,
            DataTileState::Loading => &[],
        }
    }
}

/// Turn `[time_start, score]` pairs into bars of `bar_duration`.
pub fn bars_from_pairs(pairs: &[(f64, f64)], bar_duration: f64, zoom_level: i32) -> Vec<ScoreBar> {
    pairs
        .iter()
        .map(|&(time_start, score)| ScoreBar {
            time_start,
            time_end: time_start + bar_duration,
            score,
            zoom_level,
        })
        .collect()
}

/// Average runs of `factor` consecutive finer bars into one bar tagged
/// `zoom_level`. A trailing partial run is dropped.
pub fn downsample(bars: &[ScoreBar], factor: usize, zoom_level: i32) -> Vec<ScoreBar> {
    if factor == 0 {
        return Vec::new();
    }
    bars.chunks_exact(factor)
        .map(|run| ScoreBar {
            time_start: run[0].time_start,
            time_end: run[run.len() - 1].time_end,
            score: run.iter().map(|b| b.score).sum::<f64>() / factor as f64,
            zoom_level,
        })
        .collect()
}
