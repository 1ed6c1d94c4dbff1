//! Similarity matrices and the values read out of them.

use crate::pyramid::TileSpan;
use crate::streamer::FetchError;

/// Exponent applied to raw similarity values.
pub const DEFAULT_VALUE_EXPONENT: f64 = 2.0;

/// Self-similarity of one tile's audio.
///
/// Row `i` is the similarity profile at `i / row_count()` of the way through
/// the tile; its values span a window of `duration * row_len / row_count`
/// centred on that instant.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    rows: Vec<Vec<f64>>,
}

impl SimilarityMatrix {
    /// Build from rows of equal length; `None` if empty or ragged.
    pub fn new(rows: Vec<Vec<f64>>) -> Option<Self> {
        let len = rows.first()?.len();
        if len == 0 || rows.iter().any(|r| r.len() != len) {
            return None;
        }
        Some(Self { rows })
    }

    /// Decode a similarity image. Image column `x` becomes row `x`, read
    /// top to bottom from the red channel.
    pub fn decode(data: &[u8]) -> Result<Self, FetchError> {
        let image = image::load_from_memory(data)?.to_rgba8();
        let rows = (0..image.width())
            .map(|x| {
                (0..image.height())
                    .map(|y| f64::from(image.get_pixel(x, y).0[0]) / 255.0)
                    .collect()
            })
            .collect();
        Self::new(rows).ok_or_else(|| FetchError::Decode("empty similarity image".to_string()))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row_len(&self) -> usize {
        self.rows[0].len()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }
}

/// One similarity value over a slice of time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityCell {
    pub time_start: f64,
    pub duration: f64,
    pub value: f64,
}

impl SimilarityCell {
    pub fn time_end(&self) -> f64 {
        self.time_start + self.duration
    }

    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.time_start < end && self.time_end() > start
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SimilarityTileState {
    Loading,
    Loaded(SimilarityMatrix),
    Failed,
}

/// A similarity tile resident in the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityTile {
    pub(crate) span: TileSpan,
    pub(crate) state: SimilarityTileState,
}

impl SimilarityTile {
    pub(crate) fn loading(span: TileSpan) -> Self {
        Self {
            span,
            state: SimilarityTileState::Loading,
        }
    }

    #[cfg(test)]
    pub(crate) fn loaded(span: TileSpan, matrix: SimilarityMatrix) -> Self {
        Self {
            span,
            state: SimilarityTileState::Loaded(matrix),
        }
    }

    pub fn span(&self) -> &TileSpan {
        &self.span
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, SimilarityTileState::Loaded(_))
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self.state, SimilarityTileState::Loading)
    }

    fn matrix(&self) -> Option<&SimilarityMatrix> {
        match &self.state {
            SimilarityTileState::Loaded(m) => Some(m),
            _ => None,
        }
    }

    /// Similarity profile at `time`, interpolated between the two nearest
    /// rows. Empty unless loaded with `time` inside the tile.
    pub fn profile_at(&self, time: f64, exponent: f64) -> Vec<SimilarityCell> {
        let Some(matrix) = self.matrix() else {
            return Vec::new();
        };
        let offset = (time - self.span.time) / self.span.duration;
        if !(0.0..=1.0).contains(&offset) {
            return Vec::new();
        }

        let position = matrix.row_count() as f64 * offset;
        let row = position.floor() as usize;
        let frac = position - row as f64;
        let (Some(current), Some(next)) = (matrix.rows.get(row), matrix.rows.get(row + 1)) else {
            return Vec::new();
        };

        let width = matrix.row_len() as f64;
        let span_duration = self.span.duration * width / matrix.row_count() as f64;
        let centre = self.span.time + offset * self.span.duration;
        let cell = span_duration / width;
        current
            .iter()
            .zip(next)
            .enumerate()
            .map(|(i, (a, b))| SimilarityCell {
                time_start: centre + (i as f64 / width - 0.5) * span_duration,
                duration: cell,
                value: (frac * b + (1.0 - frac) * a).powf(exponent),
            })
            .collect()
    }

    /// Mean of each row, scaled to percent, laid out across the tile.
    pub fn averages(&self) -> Vec<SimilarityCell> {
        let Some(matrix) = self.matrix() else {
            return Vec::new();
        };
        let count = matrix.row_count() as f64;
        let cell = self.span.duration / count;
        matrix
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| SimilarityCell {
                time_start: self.span.time + i as f64 * cell,
                duration: cell,
                value: row.iter().sum::<f64>() / row.len() as f64 * 100.0,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn span() -> TileSpan {
        TileSpan {
            time: 1000.0,
            duration: 400.0,
            zoom_level: 4,
        }
    }

    /// 4 rows of 2 values: row i holds [i/4, 1 - i/4].
    fn matrix() -> SimilarityMatrix {
        SimilarityMatrix::new(
            (0..4)
                .map(|i| vec![i as f64 / 4.0, 1.0 - i as f64 / 4.0])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_matrix_rejects_ragged_rows() {
        assert!(SimilarityMatrix::new(vec![]).is_none());
        assert!(SimilarityMatrix::new(vec![vec![1.0], vec![1.0, 2.0]]).is_none());
    }

    #[test]
    fn test_profile_interpolates_rows() {
        let tile = SimilarityTile::loaded(span(), matrix());
        // Halfway between rows 1 and 2.
        let cells = tile.profile_at(1150.0, 1.0);
        assert_eq!(cells.len(), 2);
        assert!((cells[0].value - 0.375).abs() < 1e-12);
        assert!((cells[1].value - 0.625).abs() < 1e-12);

        // Window of 400 * 2 / 4 = 200 ms centred on the query time.
        assert!((cells[0].time_start - 1050.0).abs() < 1e-9);
        assert!((cells[0].duration - 100.0).abs() < 1e-9);
        assert!((cells[1].time_end() - 1250.0).abs() < 1e-9);
    }

    #[test]
    fn test_profile_outside_tile_or_last_row_is_empty() {
        let tile = SimilarityTile::loaded(span(), matrix());
        assert!(tile.profile_at(900.0, 1.0).is_empty());
        assert!(tile.profile_at(1390.0, 1.0).is_empty());
        assert!(SimilarityTile::loading(span()).profile_at(1100.0, 1.0).is_empty());
    }

    #[test]
    fn test_exponent_applied() {
        let tile = SimilarityTile::loaded(span(), matrix());
        let cells = tile.profile_at(1100.0, DEFAULT_VALUE_EXPONENT);
        assert!((cells[0].value - 0.0625).abs() < 1e-12);
    }

    #[test]
    fn test_averages_cover_tile() {
        let tile = SimilarityTile::loaded(span(), matrix());
        let averages = tile.averages();
        assert_eq!(averages.len(), 4);
        assert!(averages.iter().all(|c| (c.value - 50.0).abs() < 1e-9));
        assert_eq!(averages[3].time_end(), 1400.0);
    }

    #[test]
    fn test_decode_reads_columns_as_rows() {
        let image = image::RgbaImage::from_fn(3, 2, |x, y| {
            image::Rgba([if y == 0 { 255 } else { (x * 51) as u8 }, 0, 0, 255])
        });
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let matrix = SimilarityMatrix::decode(&png).unwrap();
        assert_eq!(matrix.row_count(), 3);
        assert_eq!(matrix.row_len(), 2);
        assert_eq!(matrix.rows()[2], vec![1.0, 0.4]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            SimilarityMatrix::decode(b"not an image"),
            Err(FetchError::Decode(_))
        ));
    }
}
