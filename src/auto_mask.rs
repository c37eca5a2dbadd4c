//! Automatic grid masks.
//!
//! Splits a frame into `rows x cols` rectangular ROIs. Cells are pixel-inclusive:
//! column `c` covers pixels `c*W/cols ..= (c+1)*W/cols - 1` (integer division),
//! and rows work the same way. When the dimensions divide evenly every cell has
//! the same size. In all cases the cells are disjoint and together cover every
//! pixel of the frame.
//!
//! Each cell is a four-point outline, clockwise from its top-left corner (image
//! coordinates, y pointing down). Cells come out in row-major order from a lazy
//! iterator that can be restarted by calling [`GridPartition::cells`] again.

use crate::error::PartitionError;
use crate::geometry::{FrameBounds, Point};

/// Default row count when the caller supplies none (ten tubes per column).
pub const DEFAULT_ROWS: u32 = 10;

/// Default column count when the caller supplies none.
pub const DEFAULT_COLS: u32 = 2;

/// Smallest cell edge, in pixels, that still yields a non-degenerate outline.
const MIN_CELL_PIXELS: u32 = 2;

/// A validated `rows x cols` partition of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPartition {
    bounds: FrameBounds,
    rows: u32,
    cols: u32,
}

impl GridPartition {
    /// Check that `bounds` can be split into `rows x cols` cells.
    pub fn new(bounds: FrameBounds, rows: u32, cols: u32) -> Result<Self, PartitionError> {
        let fits = rows >= 1
            && cols >= 1
            && bounds.width / cols >= MIN_CELL_PIXELS
            && bounds.height / rows >= MIN_CELL_PIXELS;
        if !fits {
            return Err(PartitionError::InvalidPartition { rows, cols, bounds });
        }
        Ok(Self { bounds, rows, cols })
    }

    /// Partition using [`DEFAULT_ROWS`] x [`DEFAULT_COLS`].
    pub fn with_defaults(bounds: FrameBounds) -> Result<Self, PartitionError> {
        Self::new(bounds, DEFAULT_ROWS, DEFAULT_COLS)
    }

    /// Number of cells the partition yields.
    pub fn len(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// A partition always has at least one cell.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Row count.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Column count.
    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Fresh iterator over the cell outlines in row-major order.
    pub fn cells(&self) -> GridCells {
        GridCells {
            partition: *self,
            next: 0,
        }
    }

    fn cell(&self, index: u32) -> Vec<Point> {
        let row = index / self.cols;
        let col = index % self.cols;
        let (left, right) = span(self.bounds.width, self.cols, col);
        let (top, bottom) = span(self.bounds.height, self.rows, row);
        vec![
            Point::new(left, top),
            Point::new(right, top),
            Point::new(right, bottom),
            Point::new(left, bottom),
        ]
    }
}

impl IntoIterator for GridPartition {
    type Item = Vec<Point>;
    type IntoIter = GridCells;

    fn into_iter(self) -> GridCells {
        self.cells()
    }
}

/// First and last pixel index of cell `index` when `extent` is cut into `parts`.
fn span(extent: u32, parts: u32, index: u32) -> (f64, f64) {
    let start = u64::from(index) * u64::from(extent) / u64::from(parts);
    let end = (u64::from(index) + 1) * u64::from(extent) / u64::from(parts) - 1;
    (start as f64, end as f64)
}

/// Lazy row-major iterator over grid cell outlines.
#[derive(Debug, Clone)]
pub struct GridCells {
    partition: GridPartition,
    next: u32,
}

impl Iterator for GridCells {
    type Item = Vec<Point>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next as usize >= self.partition.len() {
            return None;
        }
        let cell = self.partition.cell(self.next);
        self.next += 1;
        Some(cell)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.partition.len() - self.next as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GridCells {}

/// Generate the outlines for a `rows x cols` grid over `bounds`.
pub fn generate(bounds: FrameBounds, rows: u32, cols: u32) -> Result<GridCells, PartitionError> {
    Ok(GridPartition::new(bounds, rows, cols)?.cells())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{validate_polygon, PixelRect};

    #[test]
    fn two_by_two_on_hundred_square() {
        let bounds = FrameBounds::new(100, 100);
        let extents: Vec<PixelRect> = generate(bounds, 2, 2)
            .unwrap()
            .map(|cell| validate_polygon(&cell, bounds).unwrap().pixel_extent())
            .collect();

        assert_eq!(
            extents,
            vec![
                PixelRect { x: 0, y: 0, width: 50, height: 50 },
                PixelRect { x: 50, y: 0, width: 50, height: 50 },
                PixelRect { x: 0, y: 50, width: 50, height: 50 },
                PixelRect { x: 50, y: 50, width: 50, height: 50 },
            ]
        );
    }

    #[test]
    fn cells_wind_clockwise_from_top_left() {
        let cell = generate(FrameBounds::new(100, 100), 1, 1).unwrap().next().unwrap();
        assert_eq!(
            cell,
            vec![
                Point::new(0.0, 0.0),
                Point::new(99.0, 0.0),
                Point::new(99.0, 99.0),
                Point::new(0.0, 99.0),
            ]
        );
    }

    #[test]
    fn uneven_split_still_covers_frame() {
        let bounds = FrameBounds::new(100, 61);
        let partition = GridPartition::new(bounds, 4, 3).unwrap();
        let covered: u64 = partition
            .cells()
            .map(|cell| {
                let extent = validate_polygon(&cell, bounds).unwrap().pixel_extent();
                u64::from(extent.width) * u64::from(extent.height)
            })
            .sum();
        assert_eq!(covered, bounds.pixel_count());
    }

    #[test]
    fn iterator_is_exact_and_restartable() {
        let partition = GridPartition::new(FrameBounds::new(640, 480), 3, 4).unwrap();
        let mut cells = partition.cells();
        assert_eq!(cells.len(), 12);
        cells.next();
        assert_eq!(cells.len(), 11);

        let first: Vec<_> = partition.cells().collect();
        let second: Vec<_> = partition.into_iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_rows_or_cols_is_invalid() {
        let bounds = FrameBounds::new(100, 100);
        assert!(GridPartition::new(bounds, 0, 2).is_err());
        assert!(GridPartition::new(bounds, 2, 0).is_err());
    }

    #[test]
    fn cells_thinner_than_two_pixels_are_invalid() {
        let bounds = FrameBounds::new(10, 10);
        assert!(GridPartition::new(bounds, 5, 5).is_ok());
        assert_eq!(
            GridPartition::new(bounds, 1, 6),
            Err(PartitionError::InvalidPartition {
                rows: 1,
                cols: 6,
                bounds
            })
        );
    }

    #[test]
    fn default_grid_is_ten_rows_by_two_columns() {
        let bounds = FrameBounds::new(1280, 960);
        let partition = GridPartition::with_defaults(bounds).unwrap();
        assert_eq!((partition.rows(), partition.cols()), (10, 2));

        let cells: Vec<_> = partition.cells().collect();
        assert_eq!(cells.len(), 20);
        // Row-major: the second cell sits to the right of the first.
        assert_eq!(cells[1][0], Point::new(640.0, 0.0));
        assert_eq!(cells[2][0], Point::new(0.0, 96.0));
    }
}
