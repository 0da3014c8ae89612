use crate::core::rasterize::{PixelWindow, RasterGrid};
use crate::types::{StatField, StatisticTuple, Zone, ZonalError, ZonalResult};
use ndarray::{s, Array2};
use num_traits::ToPrimitive;

/// Per-zone statistics over one raster band
pub struct ZonalStatsExtractor {
    nodata: f64,
}

impl ZonalStatsExtractor {
    pub fn new(nodata: f64) -> Self {
        Self { nodata }
    }

    /// One statistic tuple per zone of an in-memory band, in zone order
    pub fn extract<T>(
        &self,
        band: &Array2<T>,
        grid: &RasterGrid,
        zones: &[Zone],
    ) -> ZonalResult<Vec<StatisticTuple>>
    where
        T: Copy + ToPrimitive,
    {
        grid.validate(band.dim())?;
        self.extract_windows(grid, zones, |w| {
            Ok(band
                .slice(s![w.row..w.row + w.rows, w.col..w.col + w.cols])
                .to_owned())
        })
    }

    /// One statistic tuple per zone, in zone order.
    ///
    /// Zones are rasterized all-touched; pixels equal to the nodata
    /// sentinel (or NaN) are left out of every aggregate. Only the pixel
    /// window under each zone is requested from `read`.
    pub fn extract_windows<T, F>(
        &self,
        grid: &RasterGrid,
        zones: &[Zone],
        mut read: F,
    ) -> ZonalResult<Vec<StatisticTuple>>
    where
        T: Copy + ToPrimitive,
        F: FnMut(&PixelWindow) -> ZonalResult<Array2<T>>,
    {
        grid.validate_transform()?;
        log::debug!(
            "Extracting {} zones from {}x{} band (nodata {})",
            zones.len(),
            grid.width,
            grid.height,
            self.nodata
        );

        let mut results = Vec::with_capacity(zones.len());
        for zone in zones {
            let Some(window) = grid.window(&zone.geometry) else {
                results.push(StatisticTuple::empty());
                continue;
            };
            let pixels = grid.touched_pixels_in(&zone.geometry, &window);
            if pixels.is_empty() {
                results.push(StatisticTuple::empty());
                continue;
            }

            let block = read(&window)?;
            if block.dim() != (window.rows, window.cols) {
                return Err(ZonalError::ShapeMismatch(format!(
                    "window {:?} read as {:?}",
                    window,
                    block.dim()
                )));
            }
            let values: Vec<f64> = pixels
                .into_iter()
                .filter_map(|(row, col)| block[[row - window.row, col - window.col]].to_f64())
                .filter(|v| !v.is_nan() && *v != self.nodata)
                .collect();
            results.push(compute_statistics(values));
        }
        Ok(results)
    }
}

/// Summary statistics of the valid values of one zone
pub fn compute_statistics(mut values: Vec<f64>) -> StatisticTuple {
    if values.is_empty() {
        return StatisticTuple::empty();
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len() as f64;
    let min = values[0];
    let max = values[values.len() - 1];
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    let mut stats = StatisticTuple::empty();
    stats.set(StatField::Count, Some(n));
    stats.set(StatField::Min, Some(min));
    stats.set(StatField::Max, Some(max));
    stats.set(StatField::Mean, Some(mean));
    stats.set(StatField::Median, Some(percentile(&values, 50.0)));
    stats.set(StatField::Std, Some(variance.sqrt()));
    stats.set(StatField::P25, Some(percentile(&values, 25.0)));
    stats.set(StatField::P50, Some(percentile(&values, 50.0)));
    stats.set(StatField::P75, Some(percentile(&values, 75.0)));
    stats.set(StatField::P95, Some(percentile(&values, 95.0)));
    stats.set(StatField::P99, Some(percentile(&values, 99.0)));
    stats.set(StatField::Range, Some(max - min));
    stats
}

/// Linear interpolation between the order statistics of `sorted`
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}
