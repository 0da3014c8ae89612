use crate::core::rasterize::{PixelWindow, RasterGrid};
use crate::types::{GeoTransform, ZonalError, ZonalResult};
use gdal::Dataset;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

/// One band of an open raster, read window by window
pub struct BandSource {
    dataset: Dataset,
    band: usize,
    pub grid: RasterGrid,
    /// Projection WKT declared by the dataset (empty when absent)
    pub projection: String,
    /// Nodata value declared by the band itself
    pub declared_nodata: Option<f64>,
}

impl BandSource {
    /// Read the pixels of `window` only
    pub fn read_window(&self, window: &PixelWindow) -> ZonalResult<Array2<f64>> {
        let rasterband = self.dataset.rasterband(self.band as isize)?;
        let size = (window.cols, window.rows);
        let buffer = rasterband.read_as::<f64>(
            (window.col as isize, window.row as isize),
            size,
            size,
            None,
        )?;
        Array2::from_shape_vec((window.rows, window.cols), buffer.data).map_err(|e| {
            ZonalError::ShapeMismatch(format!("failed to reshape window {:?}: {}", window, e))
        })
    }
}

/// Raster reader with an optional bound on how long an open may take
#[derive(Debug, Clone, Default)]
pub struct RasterReader {
    open_timeout: Option<Duration>,
}

impl RasterReader {
    pub fn new(open_timeout: Option<Duration>) -> Self {
        Self { open_timeout }
    }

    /// Open a dataset, giving up after the configured timeout
    pub fn open(&self, path: &Path) -> ZonalResult<Dataset> {
        let Some(timeout) = self.open_timeout else {
            return open_dataset(path);
        };

        let (tx, rx) = mpsc::channel();
        let owned: PathBuf = path.to_path_buf();
        std::thread::spawn(move || {
            // The receiver may be gone after a timeout; the handle is then dropped here.
            let _ = tx.send(open_dataset(&owned));
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(_) => Err(ZonalError::Timeout {
                path: path.to_path_buf(),
                seconds: timeout.as_secs(),
            }),
        }
    }

    /// Open 1-based `band` of the raster at `path` without reading pixels
    pub fn open_band(&self, path: &Path, band: usize) -> ZonalResult<BandSource> {
        log::debug!("Opening band {} of {}", band, path.display());
        let dataset = self.open(path)?;

        let band_count = dataset.raster_count() as usize;
        if band == 0 || band > band_count {
            return Err(ZonalError::Configuration(format!(
                "band {} requested but {} has {} band(s)",
                band,
                path.display(),
                band_count
            )));
        }

        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let (width, height) = dataset.raster_size();
        log::debug!("Raster size: {}x{}, transform: {:?}", width, height, transform);

        let declared_nodata = dataset.rasterband(band as isize)?.no_data_value();
        let projection = dataset.projection();
        Ok(BandSource {
            dataset,
            band,
            grid: RasterGrid {
                transform,
                width,
                height,
            },
            projection,
            declared_nodata,
        })
    }
}

fn open_dataset(path: &Path) -> ZonalResult<Dataset> {
    Dataset::open(path).map_err(|source| ZonalError::Open {
        path: path.to_path_buf(),
        source,
    })
}
