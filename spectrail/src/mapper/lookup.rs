//! Gap-compressing time ↔ pixel lookup.
//!
//! # Layout
//!
//! ```text
//!   time   ──audio──┬──────gap──────┬──audio──┬─gap─┬──audio──
//!   pixel  ──audio──┬─gap─┬──audio──┬─gap─┬──audio──
//!                   (compressed)          (true width)
//! ```
//!
//! The lookup is a run of [`LookupSegment`]s tiling a time range with no
//! holes or overlaps in either domain. Audio segments are drawn at the true
//! resolution; gap segments wider than the configured maximum are squeezed
//! to that width. The segment list is built by [`build_lookup`], a pure
//! function of the anchor time, the resolution, the gap list and the
//! viewport width.

use crate::gaps::GapInterval;

/// Default maximum on-screen width of a compressed gap, in pixels.
pub const DEFAULT_GAP_MAX_PX: f64 = 300.0;

/// Default width under which an audio sliver between two gaps is absorbed.
pub const DEFAULT_MERGE_SLIVER_PX: f64 = 10.0;

/// Default width at or under which a gap is ignored.
pub const DEFAULT_MIN_GAP_PX: f64 = 5.0;

/// Default extent of the forward walk, in viewport widths.
pub const DEFAULT_FORWARD_VIEWPORTS: f64 = 5.0;

/// Default extent of the backward walk, in viewport widths.
pub const DEFAULT_BACKWARD_VIEWPORTS: f64 = 4.0;

/// Default cap on segments produced per walk direction.
pub const DEFAULT_MAX_WALK_STEPS: usize = 100;

/// Length given to an audio period with no gap after (or before) it.
pub const DEFAULT_OPEN_PERIOD_MS: f64 = 1e11;

/// Tuning for lookup construction.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupConfig {
    /// Maximum pixel width a gap may occupy.
    pub gap_max_px: f64,
    /// Audio between two gaps narrower than this (pixels) is merged away.
    pub merge_sliver_px: f64,
    /// Gaps no wider than this (pixels) are dropped.
    pub min_gap_px: f64,
    /// Forward walk stops past this many viewport widths.
    pub forward_viewports: f64,
    /// Backward walk stops past this many viewport widths left of zero.
    pub backward_viewports: f64,
    /// Safety cap on segments per walk direction.
    pub max_walk_steps: usize,
    /// Duration of an unbounded audio period.
    pub open_period_ms: f64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            gap_max_px: DEFAULT_GAP_MAX_PX,
            merge_sliver_px: DEFAULT_MERGE_SLIVER_PX,
            min_gap_px: DEFAULT_MIN_GAP_PX,
            forward_viewports: DEFAULT_FORWARD_VIEWPORTS,
            backward_viewports: DEFAULT_BACKWARD_VIEWPORTS,
            max_walk_steps: DEFAULT_MAX_WALK_STEPS,
            open_period_ms: DEFAULT_OPEN_PERIOD_MS,
        }
    }
}

impl LookupConfig {
    pub fn with_gap_max_px(mut self, px: f64) -> Self {
        self.gap_max_px = px;
        self
    }
}

/// One contiguous piece of the mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookupSegment {
    pub time_start: f64,
    pub time_end: f64,
    pub pixel_start: f64,
    pub pixel_end: f64,
    /// Pixel compression factor; 1.0 unless this is a squeezed gap.
    pub time_scale: f64,
    pub is_gap: bool,
}

impl LookupSegment {
    pub fn duration(&self) -> f64 {
        self.time_end - self.time_start
    }

    pub fn pixel_width(&self) -> f64 {
        self.pixel_end - self.pixel_start
    }

    pub fn contains_time(&self, time: f64) -> bool {
        self.time_start <= time && time < self.time_end
    }

    /// True if the segment overlaps `[start, end)`.
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.time_end > start && self.time_start < end
    }
}

/// A built lookup: segments ascending in both time and pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    segments: Vec<LookupSegment>,
    resolution: f64,
}

impl Lookup {
    pub fn segments(&self) -> &[LookupSegment] {
        &self.segments
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    fn first(&self) -> &LookupSegment {
        &self.segments[0]
    }

    fn last(&self) -> &LookupSegment {
        &self.segments[self.segments.len() - 1]
    }

    /// The segment containing `time`; the edge segment if outside the range.
    pub fn segment_at_time(&self, time: f64) -> &LookupSegment {
        if time >= self.last().time_end {
            return self.last();
        }
        let idx = self.segments.partition_point(|s| s.time_start <= time);
        &self.segments[idx.saturating_sub(1)]
    }

    /// Pixel position of `time`, clamped to the covered range.
    pub fn time_to_px(&self, time: f64) -> f64 {
        if time > self.last().time_end {
            return self.last().pixel_end;
        }
        if time < self.first().time_start {
            return self.first().pixel_start;
        }
        let segment = self.segment_at_time(time);
        segment.pixel_start + (time - segment.time_start) * segment.time_scale / self.resolution
    }

    /// Time at pixel `px`, clamped to the covered range.
    pub fn px_to_time(&self, px: f64) -> f64 {
        if px >= self.last().pixel_end {
            return self.last().time_end;
        }
        if px <= self.first().pixel_start {
            return self.first().time_start;
        }
        let idx = self.segments.partition_point(|s| s.pixel_start <= px);
        let segment = &self.segments[idx.saturating_sub(1)];
        segment.time_start + (px - segment.pixel_start) / segment.time_scale * self.resolution
    }

    /// Segments overlapping `[start, end)` with the given gap tag.
    pub fn overlapping(&self, start: f64, end: f64, gaps: bool) -> Vec<LookupSegment> {
        self.segments
            .iter()
            .filter(|s| s.is_gap == gaps && s.overlaps(start, end))
            .copied()
            .collect()
    }

    /// Covered time range.
    pub fn time_bounds(&self) -> (f64, f64) {
        (self.first().time_start, self.last().time_end)
    }

    /// Covered pixel range.
    pub fn pixel_bounds(&self) -> (f64, f64) {
        (self.first().pixel_start, self.last().pixel_end)
    }
}

/// Merge gaps separated by sub-threshold audio, then drop tiny gaps.
///
/// Thresholds are in pixels and converted with `resolution` (ms per px).
pub fn preprocess_gaps(
    gaps: &[GapInterval],
    resolution: f64,
    config: &LookupConfig,
) -> Vec<GapInterval> {
    let sliver = config.merge_sliver_px * resolution;
    let mut merged: Vec<GapInterval> = Vec::with_capacity(gaps.len());
    for gap in gaps {
        match merged.last_mut() {
            Some(last) if gap.start - last.end < sliver => last.end = last.end.max(gap.end),
            _ => merged.push(*gap),
        }
    }

    let min_gap = config.min_gap_px * resolution;
    merged.retain(|g| g.duration() > min_gap);
    merged
}

/// A classified period before pixel positions are assigned.
#[derive(Debug, Clone, Copy)]
struct Period {
    time_start: f64,
    time_end: f64,
    time_scale: f64,
    is_gap: bool,
}

/// Classify `time` as gap or audio and find the period's extent.
///
/// Walking forward a gap contains `time` when `start <= time < end`;
/// walking backward when `start < time <= end`, so the period found always
/// ends at `time`.
fn find_period(
    time: f64,
    gaps: &[GapInterval],
    backwards: bool,
    resolution: f64,
    config: &LookupConfig,
) -> Period {
    let containing = if backwards {
        let idx = gaps.partition_point(|g| g.start < time);
        idx.checked_sub(1).map(|i| gaps[i]).filter(|g| g.end >= time)
    } else {
        let idx = gaps.partition_point(|g| g.start <= time);
        idx.checked_sub(1).map(|i| gaps[i]).filter(|g| g.end > time)
    };

    if let Some(gap) = containing {
        let max_duration = config.gap_max_px * resolution;
        let time_scale = if gap.duration() > max_duration {
            max_duration / gap.duration()
        } else {
            1.0
        };
        return Period {
            time_start: gap.start,
            time_end: gap.end,
            time_scale,
            is_gap: true,
        };
    }

    if backwards {
        let idx = gaps.partition_point(|g| g.end < time);
        let start = idx
            .checked_sub(1)
            .map(|i| gaps[i].end)
            .unwrap_or(time - config.open_period_ms);
        Period {
            time_start: start,
            time_end: time,
            time_scale: 1.0,
            is_gap: false,
        }
    } else {
        let idx = gaps.partition_point(|g| g.start <= time);
        let end = gaps
            .get(idx)
            .map(|g| g.start)
            .unwrap_or(time + config.open_period_ms);
        Period {
            time_start: time,
            time_end: end,
            time_scale: 1.0,
            is_gap: false,
        }
    }
}

/// Build the lookup around `anchor`, which lands at the viewport centre.
///
/// Returns `None` if the resolution or viewport width cannot produce a
/// mapping (non-positive or non-finite).
pub fn build_lookup(
    anchor: f64,
    resolution: f64,
    gaps: &[GapInterval],
    viewport_width: f64,
    config: &LookupConfig,
) -> Option<Lookup> {
    if !(resolution > 0.0 && resolution.is_finite())
        || !(viewport_width > 0.0 && viewport_width.is_finite())
        || !anchor.is_finite()
    {
        return None;
    }

    let gaps = preprocess_gaps(gaps, resolution, config);
    let px_span = |period: &Period| period.duration() * period.time_scale / resolution;

    // Forward from the anchor. At least one segment, so the backward walk
    // always has a starting point.
    let mut forward: Vec<LookupSegment> = Vec::new();
    let mut time_cursor = anchor;
    let mut pixel_cursor = viewport_width / 2.0;
    let forward_limit = viewport_width * config.forward_viewports;
    loop {
        let period = find_period(time_cursor, &gaps, false, resolution, config);
        // The first period may start before the anchor.
        let pixel_start =
            pixel_cursor + (period.time_start - time_cursor) * period.time_scale / resolution;
        let pixel_end = pixel_start + px_span(&period);
        forward.push(period.into_segment(pixel_start, pixel_end));

        time_cursor = period.time_end;
        pixel_cursor = pixel_end;

        if pixel_cursor >= forward_limit {
            break;
        }
        if forward.len() >= config.max_walk_steps {
            tracing::error!(
                steps = forward.len(),
                anchor,
                resolution,
                "Forward lookup walk hit step cap"
            );
            break;
        }
    }

    // Backward from the start of the first forward segment.
    let mut backward: Vec<LookupSegment> = Vec::new();
    time_cursor = forward[0].time_start;
    pixel_cursor = forward[0].pixel_start;
    let backward_limit = -viewport_width * config.backward_viewports;
    while pixel_cursor > backward_limit {
        let period = find_period(time_cursor, &gaps, true, resolution, config);
        let pixel_end = pixel_cursor;
        let pixel_start = pixel_end - px_span(&period);
        backward.push(period.into_segment(pixel_start, pixel_end));

        time_cursor = period.time_start;
        pixel_cursor = pixel_start;

        if backward.len() >= config.max_walk_steps {
            tracing::error!(
                steps = backward.len(),
                anchor,
                resolution,
                "Backward lookup walk hit step cap"
            );
            break;
        }
    }

    backward.reverse();
    backward.extend(forward);
    Some(Lookup {
        segments: backward,
        resolution,
    })
}

impl Period {
    fn duration(&self) -> f64 {
        self.time_end - self.time_start
    }

    fn into_segment(self, pixel_start: f64, pixel_end: f64) -> LookupSegment {
        LookupSegment {
            time_start: self.time_start,
            time_end: self.time_end,
            pixel_start,
            pixel_end,
            time_scale: self.time_scale,
            is_gap: self.is_gap,
        }
    }
}
