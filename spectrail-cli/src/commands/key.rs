//! Key command - print the resource key of the tile covering a time.

use clap::Args;
use spectrail::config::ConfigFile;
use spectrail::pyramid::{SimilarityNaming, TileNaming, ZoomPyramid, ZoomRange, SIMILARITY_BASE_URL};

use super::parse_time;
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct KeyArgs {
    /// Location name (defaults to timeline.location)
    #[arg(long)]
    pub location: Option<String>,

    /// Epoch milliseconds or an RFC 3339 timestamp
    #[arg(long)]
    pub time: String,

    /// Zoom level
    #[arg(long, allow_hyphen_values = true)]
    pub zoom: i32,

    /// Name similarity tiles instead of spectrogram tiles
    #[arg(long)]
    pub similarity: bool,

    /// Also print the fetch URL
    #[arg(long)]
    pub url: bool,
}

pub fn run(args: KeyArgs) -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    let location = args.location.unwrap_or_else(|| config.timeline.location.clone());
    let time = parse_time(&args.time)?;

    let (naming, range): (Box<dyn TileNaming>, ZoomRange) = if args.similarity {
        (Box::new(SimilarityNaming::new(SIMILARITY_BASE_URL)), ZoomRange::SIMILARITY)
    } else {
        (Box::new(config.spectrogram_naming()), ZoomRange::SPECTROGRAM)
    };
    if !range.contains(args.zoom) {
        return Err(CliError::InvalidArgument(format!(
            "zoom {} outside {}..={}",
            args.zoom, range.min, range.max
        )));
    }

    let pyramid = ZoomPyramid::hourly(range);
    let span = pyramid
        .get_range(time, time + 1.0, args.zoom)
        .into_iter()
        .next()
        .ok_or_else(|| CliError::InvalidArgument(format!("no tile covers {}", args.time)))?;
    let key = naming.resource_key(&location, &span);

    println!("{}", key);
    if args.url {
        println!("{}", naming.url(&key));
    }
    Ok(())
}
