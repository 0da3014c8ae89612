//! All-touched zone rasterization
//!
//! A pixel belongs to a zone when its cell overlaps the zone's interior,
//! not only when its centre falls inside. Cells that meet the polygon only
//! along an edge or at a corner are excluded: the cell rectangle is shrunk
//! by `EDGE_TOLERANCE` pixel widths before the intersection test.

use crate::types::{GeoTransform, ZonalError, ZonalResult};
use geo::{BoundingRect, Intersects};
use geo_types::{coord, MultiPolygon, Rect};

const EDGE_TOLERANCE: f64 = 1e-9;

/// Block of pixels starting at grid (row, col)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

/// Pixel grid a zone is rasterized onto
#[derive(Debug, Clone, Copy)]
pub struct RasterGrid {
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
}

impl RasterGrid {
    /// Check that the grid can index an array of `shape` (rows, cols)
    pub fn validate(&self, shape: (usize, usize)) -> ZonalResult<()> {
        if shape != (self.height, self.width) {
            return Err(ZonalError::ShapeMismatch(format!(
                "array is {}x{} but grid is {}x{}",
                shape.0, shape.1, self.height, self.width
            )));
        }
        self.validate_transform()
    }

    /// North-up grid with non-degenerate pixels
    pub fn validate_transform(&self) -> ZonalResult<()> {
        let t = &self.transform;
        if t.rotation_x != 0.0 || t.rotation_y != 0.0 {
            return Err(ZonalError::ShapeMismatch(
                "rotated geotransforms are not supported".to_string(),
            ));
        }
        if !(t.pixel_width.is_finite() && t.pixel_height.is_finite())
            || t.pixel_width == 0.0
            || t.pixel_height == 0.0
        {
            return Err(ZonalError::ShapeMismatch(format!(
                "degenerate pixel size {} x {}",
                t.pixel_width, t.pixel_height
            )));
        }
        Ok(())
    }

    /// Pixel window covering the zone's bounding box, clamped to the grid
    pub fn window(&self, zone: &MultiPolygon<f64>) -> Option<PixelWindow> {
        let bbox = zone.bounding_rect()?;
        let (c0, r0) = self.transform.map_to_pixel(bbox.min().x, bbox.min().y);
        let (c1, r1) = self.transform.map_to_pixel(bbox.max().x, bbox.max().y);

        let clamp = |lo: f64, hi: f64, n: usize| -> Option<(usize, usize)> {
            let start = lo.min(hi).floor().max(0.0);
            let end = lo.max(hi).ceil().min(n as f64);
            if end <= start {
                None
            } else {
                Some((start as usize, end as usize))
            }
        };

        let (row_start, row_end) = clamp(r0, r1, self.height)?;
        let (col_start, col_end) = clamp(c0, c1, self.width)?;
        Some(PixelWindow {
            row: row_start,
            col: col_start,
            rows: row_end - row_start,
            cols: col_end - col_start,
        })
    }

    fn cell(&self, row: usize, col: usize) -> Rect<f64> {
        let t = &self.transform;
        let dx = t.pixel_width.abs() * EDGE_TOLERANCE;
        let dy = t.pixel_height.abs() * EDGE_TOLERANCE;
        let (x0, y0) = t.pixel_to_map(col as f64, row as f64);
        let (x1, y1) = t.pixel_to_map(col as f64 + 1.0, row as f64 + 1.0);
        Rect::new(
            coord! { x: x0.min(x1) + dx, y: y0.min(y1) + dy },
            coord! { x: x0.max(x1) - dx, y: y0.max(y1) - dy },
        )
    }

    /// (row, col) of every pixel touched by `zone`, in row-major order
    pub fn touched_pixels(&self, zone: &MultiPolygon<f64>) -> Vec<(usize, usize)> {
        match self.window(zone) {
            Some(window) => self.touched_pixels_in(zone, &window),
            None => Vec::new(),
        }
    }

    /// Grid (row, col) of the pixels of `window` touched by `zone`
    pub fn touched_pixels_in(
        &self,
        zone: &MultiPolygon<f64>,
        window: &PixelWindow,
    ) -> Vec<(usize, usize)> {
        let mut pixels = Vec::new();
        for row in window.row..window.row + window.rows {
            for col in window.col..window.col + window.cols {
                let cell = self.cell(row, col);
                if zone.0.iter().any(|polygon| cell.intersects(polygon)) {
                    pixels.push((row, col));
                }
            }
        }
        pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{polygon, MultiPolygon};

    fn grid(width: usize, height: usize) -> RasterGrid {
        RasterGrid {
            transform: GeoTransform::from_gdal([0.0, 10.0, 0.0, 100.0, 0.0, -10.0]),
            width,
            height,
        }
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ]])
    }

    #[test]
    fn test_partial_pixels_are_touched() {
        // x 5..25 and y 75..95 straddle a 3x3 block of 10m pixels
        let pixels = grid(10, 10).touched_pixels(&square(5.0, 75.0, 25.0, 95.0));
        assert_eq!(pixels.len(), 9);
        assert_eq!(pixels[0], (0, 0));
        assert_eq!(pixels[8], (2, 2));
    }

    #[test]
    fn test_grid_aligned_zone_excludes_edge_neighbours() {
        let pixels = grid(10, 10).touched_pixels(&square(10.0, 70.0, 30.0, 90.0));
        assert_eq!(pixels, vec![(1, 1), (1, 2), (2, 1), (2, 2)]);
    }

    #[test]
    fn test_triangle_touches_more_than_centres() {
        let triangle = MultiPolygon(vec![polygon![
            (x: 0.5, y: 99.5),
            (x: 29.5, y: 99.5),
            (x: 0.5, y: 70.5),
            (x: 0.5, y: 99.5),
        ]]);
        let pixels = grid(10, 10).touched_pixels(&triangle);
        // Cells cut by the hypotenuse count even where most of the cell lies outside
        assert!(pixels.contains(&(0, 2)));
        assert!(pixels.contains(&(1, 1)));
        assert!(pixels.contains(&(2, 0)));
        assert!(!pixels.contains(&(2, 2)));
    }

    #[test]
    fn test_zone_outside_grid() {
        assert!(grid(10, 10)
            .touched_pixels(&square(500.0, 500.0, 520.0, 520.0))
            .is_empty());
    }

    #[test]
    fn test_zone_clipped_at_grid_edge() {
        let pixels = grid(2, 2).touched_pixels(&square(-15.0, 85.0, 5.0, 105.0));
        assert_eq!(pixels, vec![(0, 0), (1, 0)]);
    }

    #[test]
    fn test_window_is_clamped_bbox() {
        let g = grid(10, 10);
        assert_eq!(
            g.window(&square(85.0, 5.0, 115.0, 15.0)),
            Some(PixelWindow { row: 8, col: 8, rows: 2, cols: 2 })
        );
        assert_eq!(g.window(&square(500.0, 500.0, 520.0, 520.0)), None);
    }

    #[test]
    fn test_validate_rejects_inconsistent_grid() {
        let g = grid(4, 3);
        assert!(g.validate((3, 4)).is_ok());
        assert!(matches!(g.validate((4, 3)), Err(ZonalError::ShapeMismatch(_))));

        let mut rotated = g;
        rotated.transform.rotation_x = 0.5;
        assert!(rotated.validate((3, 4)).is_err());

        let mut flat = g;
        flat.transform.pixel_width = 0.0;
        assert!(flat.validate((3, 4)).is_err());
    }
}
