//! Simulate command - run the timeline headlessly for a number of frames.
//!
//! Location data comes from a JSON fixture, the recording service
//! (`--online`), or a synthetic location built from `--gap` arguments.
//! Tiles, classification scores and similarity matrices are synthetic
//! unless `--online`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use serde_json::json;

use spectrail::config::ConfigFile;
use spectrail::gaps::{
    GapInterval, GapModelOptions, HttpLocationSource, LocationRecord, LocationRepository,
    LocationSource, StaticLocationSource, TimeRange,
};
use spectrail::heatmap::{
    ClassificationFeed, ClassificationSource, HttpClassificationSource, SyntheticClassificationSource,
};
use spectrail::mapper::CoordinateMapper;
use spectrail::pyramid::SimilarityNaming;
use spectrail::similarity::{
    ImageSimilaritySource, SimilarityFeed, SimilaritySource, SyntheticSimilaritySource,
};
use spectrail::streamer::{
    AssetSource, FetchFailurePolicy, HttpAssetSource, RecordingTarget, SyntheticAssetSource,
    TileStreamer,
};
use spectrail::{Timeline, TimelineFrame};

use super::parse_time;
use crate::error::CliError;

/// Extent of a synthetic location on each side of the start time.
const SYNTHETIC_SPAN_MS: f64 = 30.0 * 24.0 * 3_600_000.0;

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Location name (defaults to timeline.location)
    #[arg(long)]
    pub location: Option<String>,

    /// Start time: epoch milliseconds or RFC 3339 (defaults to timeline.position_ms)
    #[arg(long)]
    pub time: Option<String>,

    /// Displayed tile duration in milliseconds (defaults to timeline.duration_ms)
    #[arg(long)]
    pub duration: Option<f64>,

    /// Viewport width in pixels (defaults to timeline.viewport_width)
    #[arg(long)]
    pub width: Option<f64>,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    pub frames: u32,

    /// Frame interval in milliseconds
    #[arg(long, default_value_t = 16)]
    pub frame_ms: u64,

    /// Pan by this many milliseconds every frame
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub pan_ms: f64,

    /// Gap as START..END (epoch ms or RFC 3339); repeatable
    #[arg(long = "gap", value_name = "START..END")]
    pub gaps: Vec<String>,

    /// Location fixture (JSON record or list of records)
    #[arg(long, conflicts_with = "online")]
    pub fixture: Option<PathBuf>,

    /// Fetch location data, tiles and scores from the network
    #[arg(long)]
    pub online: bool,

    /// Make fetches of this tile key fail; repeatable
    #[arg(long = "fail-key")]
    pub fail_keys: Vec<String>,

    /// Failure policy override: suppress or evict
    #[arg(long)]
    pub policy: Option<FetchFailurePolicy>,

    /// Print the final summary as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(format!("failed to start runtime: {}", e)))?;
    runtime.block_on(simulate(args))
}

fn parse_gap(s: &str) -> Result<GapInterval, CliError> {
    let (start, end) = s
        .split_once("..")
        .ok_or_else(|| CliError::InvalidArgument(format!("gap '{}' is not START..END", s)))?;
    Ok(GapInterval::new(parse_time(start)?, parse_time(end)?))
}

fn location_source(
    args: &SimulateArgs,
    config: &ConfigFile,
    location: &str,
    time: f64,
) -> Result<Arc<dyn LocationSource>, CliError> {
    if args.online {
        return Ok(Arc::new(HttpLocationSource::new(
            config.network.api_base.as_str(),
            config.timeout(),
        )?));
    }
    if let Some(path) = &args.fixture {
        return Ok(Arc::new(StaticLocationSource::from_file(path)?));
    }
    let gaps = args
        .gaps
        .iter()
        .map(|g| parse_gap(g))
        .collect::<Result<Vec<_>, _>>()?;
    let record = LocationRecord {
        location: location.to_string(),
        range: TimeRange::new(time - SYNTHETIC_SPAN_MS, time + SYNTHETIC_SPAN_MS),
        gaps,
    };
    Ok(Arc::new(StaticLocationSource::new().with_record(record)))
}

async fn simulate(args: SimulateArgs) -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    let location = args
        .location
        .clone()
        .unwrap_or_else(|| config.timeline.location.clone());
    let time = match &args.time {
        Some(t) => parse_time(t)?,
        None => config.timeline.position_ms,
    };
    let duration = args.duration.unwrap_or(config.timeline.duration_ms);
    let width = args.width.unwrap_or(config.timeline.viewport_width);
    if !(duration > 0.0 && width > 0.0) {
        return Err(CliError::InvalidArgument(
            "duration and width must be positive".to_string(),
        ));
    }

    let repository = LocationRepository::new(
        location_source(&args, &config, &location, time)?,
        GapModelOptions::default(),
    );
    let model = repository.get(&location).await?;

    let mut streamer_config = config.to_streamer_config();
    if let Some(policy) = args.policy {
        streamer_config.failure_policy = policy;
    }
    let naming = Arc::new(config.spectrogram_naming());
    let similarity: Arc<dyn SimilaritySource> = if args.online {
        Arc::new(ImageSimilaritySource::http(
            SimilarityNaming::default(),
            config.timeout(),
        )?)
    } else {
        Arc::new(SyntheticSimilaritySource::default())
    };
    let (assets, scores): (Arc<dyn AssetSource>, Arc<dyn ClassificationSource>) = if args.online {
        (
            Arc::new(HttpAssetSource::new(naming.clone(), config.timeout())?),
            Arc::new(HttpClassificationSource::new(
                config.network.api_base.as_str(),
                config.timeout(),
            )?),
        )
    } else {
        let synthetic = args
            .fail_keys
            .iter()
            .fold(SyntheticAssetSource::new(), |s, k| s.with_failing_key(k.as_str()));
        (
            Arc::new(synthetic),
            Arc::new(SyntheticClassificationSource::default()),
        )
    };

    let mapper = CoordinateMapper::new(width, config.to_lookup_config());
    let streamer = TileStreamer::new(streamer_config, naming, assets);
    let mut timeline = Timeline::new(mapper, streamer)
        .with_feed(ClassificationFeed::new(scores))
        .with_similarity(SimilarityFeed::new(similarity));

    tracing::info!(
        location = %location,
        gaps = model.gaps().len(),
        time,
        duration,
        width,
        frames = args.frames,
        "Starting simulation"
    );

    let interval = Duration::from_millis(args.frame_ms);
    let start = Instant::now();
    timeline.set_location(model);
    timeline.set_duration(duration, start);
    timeline.set_time(time, start);

    let mut target = RecordingTarget::new();
    let mut last = TimelineFrame::default();
    let mut prev = start;
    for i in 0..args.frames {
        if i > 0 {
            tokio::time::sleep(interval).await;
        }
        let now = Instant::now();
        if args.pan_ms != 0.0 {
            let t = timeline.mapper().current_time() + args.pan_ms;
            timeline.set_time(t, now);
        }

        last = timeline.frame(now, now.saturating_duration_since(prev), &mut target);
        prev = now;

        let r = &last.tiles;
        tracing::debug!(
            frame = i,
            zoom = r.zoom_level,
            wanted = r.wanted,
            created = r.created,
            completed = r.completed,
            resident = r.resident,
            drawn = last.drawn,
            "Frame"
        );
        if r.became_ready {
            println!(
                "frame {:>4}: ready at zoom {} after {:.0} ms",
                i,
                r.zoom_level,
                start.elapsed().as_secs_f64() * 1000.0
            );
        }
    }

    print_summary(&timeline, &last, &target, args.json);
    Ok(())
}

fn print_summary(timeline: &Timeline, last: &TimelineFrame, target: &RecordingTarget, json: bool) {
    let mapper = timeline.mapper();
    let streamer = timeline.streamer();
    let (bars, average) = timeline
        .feed()
        .map(|f| (f.bars().len(), f.average_score()))
        .unwrap_or((0, 0.0));

    if json {
        let summary = json!({
            "window_start": mapper.window_start(),
            "window_end": mapper.window_end(),
            "resolution": mapper.resolution(),
            "zoom_level": last.tiles.zoom_level,
            "wanted": last.tiles.wanted,
            "resident": last.tiles.resident,
            "all_loaded": last.tiles.all_loaded,
            "ready": streamer.is_ready(),
            "fallback_zoom": last.tiles.fallback_zoom,
            "drawn": last.drawn,
            "sprites": target.sprites().iter().map(|s| json!({
                "key": s.resource_key,
                "x": s.x,
                "width": s.width,
                "opacity": s.opacity,
            })).collect::<Vec<_>>(),
            "gap_bands": last.gap_bands.iter().map(|b| json!({
                "x": b.x,
                "width": b.width,
                "label": b.label,
            })).collect::<Vec<_>>(),
            "score_bars": bars,
            "average_score": average,
            "classification_opacity": last.classification_opacity,
            "similarity_bands": last.similarity_bands.len(),
        });
        println!("{}", summary);
        return;
    }

    println!();
    println!("Window:    {:.0} .. {:.0} ({:.1} ms/px)", mapper.window_start(), mapper.window_end(), mapper.resolution());
    println!("Zoom:      {}", last.tiles.zoom_level);
    println!("Tiles:     {} wanted, {} resident, {} drawn", last.tiles.wanted, last.tiles.resident, last.drawn);
    println!("Loaded:    {}", if last.tiles.all_loaded { "all" } else { "partial" });
    if let Some(z) = last.tiles.fallback_zoom {
        println!("Fallback:  zoom {}", z);
    }
    for band in &last.gap_bands {
        match &band.label {
            Some(label) => println!("Gap:       x={:.0} w={:.0}  {}", band.x, band.width, label),
            None => println!("Gap:       x={:.0} w={:.0}", band.x, band.width),
        }
    }
    println!("Scores:    {} bars, average {:.3}", bars, average);
    if timeline.shows_similarity() {
        println!("Similarity: {} bands", last.similarity_bands.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gap() {
        let gap = parse_gap("1000..2500").unwrap();
        assert_eq!(gap.start, 1000.0);
        assert_eq!(gap.end, 2500.0);
        assert!(parse_gap("1000-2500").is_err());
    }
}
