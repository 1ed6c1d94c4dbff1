//! Gap bands drawn over the timeline where there is no audio.

use chrono::{DateTime, Utc};

use crate::mapper::CoordinateMapper;

/// Default minimum band width, in pixels, for a band to carry a label.
pub const DEFAULT_LABEL_MIN_WIDTH_PX: f64 = 120.0;

const MINUTE_MS: f64 = 60_000.0;
const DAY_MS: f64 = 86_400_000.0;

/// A gap positioned on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct GapBand {
    pub time_start: f64,
    pub time_end: f64,
    /// Left edge, in viewport pixels.
    pub x: f64,
    pub width: f64,
    pub label: Option<String>,
}

/// Bands for every gap in the mapper's window at least one pixel wide.
///
/// Bands wider than `label_min_width_px` carry a "No audio from .. to .."
/// label.
pub fn gap_bands(mapper: &CoordinateMapper, label_min_width_px: f64) -> Vec<GapBand> {
    mapper
        .get_gaps(mapper.window_start(), mapper.window_end())
        .into_iter()
        .filter_map(|gap| {
            let x = mapper.time_to_px(gap.time_start);
            let width = mapper.time_to_px(gap.time_end) - x;
            if width < 1.0 {
                return None;
            }
            let label = (width > label_min_width_px).then(|| gap_label(gap.time_start, gap.time_end));
            Some(GapBand {
                time_start: gap.time_start,
                time_end: gap.time_end,
                x,
                width,
                label,
            })
        })
        .collect()
}

/// Human label for a gap, with precision chosen from its length.
pub fn gap_label(time_start: f64, time_end: f64) -> String {
    let format = match time_end - time_start {
        d if d < MINUTE_MS => "%H:%M:%S",
        d if d < DAY_MS => "%H:%M",
        _ => "%b %-d",
    };
    format!(
        "No audio from {} to {}",
        format_time(time_start, format),
        format_time(time_end, format)
    )
}

fn format_time(ms: f64, format: &str) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms.round() as i64) {
        Some(dt) => dt.format(format).to_string(),
        None => format!("{:.0}", ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaps::{GapInterval, GapModel, GapModelOptions, TimeRange};
    use crate::mapper::LookupConfig;
    use std::sync::Arc;

    const HOUR: f64 = 3_600_000.0;
    // 2021-01-01T00:00:00Z
    const T0: f64 = 1_609_459_200_000.0;

    #[test]
    fn test_label_seconds_for_short_gaps() {
        let label = gap_label(T0 + 5_000.0, T0 + 35_000.0);
        assert_eq!(label, "No audio from 00:00:05 to 00:00:35");
    }

    #[test]
    fn test_label_minutes_for_sub_day_gaps() {
        let label = gap_label(T0 + HOUR, T0 + 3.5 * HOUR);
        assert_eq!(label, "No audio from 01:00 to 03:30");
    }

    #[test]
    fn test_label_dates_for_long_gaps() {
        let label = gap_label(T0, T0 + 40.0 * 24.0 * HOUR);
        assert_eq!(label, "No audio from Jan 1 to Feb 10");
    }

    fn mapper_with_gaps(gaps: Vec<GapInterval>) -> CoordinateMapper {
        let mut mapper = CoordinateMapper::new(1000.0, LookupConfig::default());
        let model = GapModel::new(
            "Hawaii",
            TimeRange::new(0.0, T0 * 2.0),
            gaps,
            &GapModelOptions::default(),
        )
        .unwrap();
        mapper.set_gaps(Arc::new(model));
        mapper.set_current_time(T0);
        mapper.set_window_duration(10.0 * HOUR);
        mapper
    }

    #[test]
    fn test_bands_for_gaps_in_window() {
        // 36 s/px: a one-hour gap is 100 px, a three-hour gap 300 px.
        let mapper = mapper_with_gaps(vec![
            GapInterval::new(T0 + HOUR, T0 + 2.0 * HOUR),
            GapInterval::new(T0 - 4.0 * HOUR, T0 - HOUR),
        ]);
        let bands = gap_bands(&mapper, DEFAULT_LABEL_MIN_WIDTH_PX);
        assert_eq!(bands.len(), 2);

        let short = bands.iter().find(|b| b.time_start == T0 + HOUR).unwrap();
        assert!((short.x - 600.0).abs() < 1e-6);
        assert!((short.width - 100.0).abs() < 1e-6);
        assert!(short.label.is_none());

        let long = bands.iter().find(|b| b.time_start == T0 - 4.0 * HOUR).unwrap();
        assert!((long.width - 300.0).abs() < 1e-6);
        assert_eq!(long.label.as_deref(), Some("No audio from 20:00 to 23:00"));
    }

    #[test]
    fn test_no_bands_without_gaps() {
        let mapper = mapper_with_gaps(Vec::new());
        assert!(gap_bands(&mapper, 0.0).is_empty());
    }
}
