//! Product-family pipeline: extraction fan-out, merge barrier, correction, emission

use crate::config::{ProductConfig, RunConfig};
use crate::core::assembler::BandAssembler;
use crate::core::band_merge::merge_band_tables;
use crate::core::correction::OffsetCorrector;
use crate::core::date_decoder::DateDecoder;
use crate::core::site_writer::SiteWriter;
use crate::io::catalog::ImageCatalog;
use crate::io::raster::RasterReader;
use crate::io::zones::ZoneReader;
use crate::types::{Image, ZoneSet, ZonalError, ZonalResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;

/// Scratch space owned by one product run, removed when dropped
pub struct RunContext {
    scratch: TempDir,
}

impl RunContext {
    /// Create a uniquely named scratch root under `parent` (system temp if `None`)
    pub fn create(parent: Option<&Path>, variable: &str) -> ZonalResult<Self> {
        let prefix = format!("{}_zonal_", variable);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let scratch = match parent {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)?
            }
            None => builder.tempdir()?,
        };
        log::debug!("Scratch directory: {}", scratch.path().display());
        Ok(Self { scratch })
    }

    pub fn root(&self) -> &Path {
        self.scratch.path()
    }

    /// Directory holding the per-image tables of one band
    pub fn band_dir(&self, band: usize) -> ZonalResult<PathBuf> {
        let dir = self.root().join(format!("band{}", band));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// One (image, band) extraction that did not complete
#[derive(Debug)]
pub struct TaskFailure {
    pub image: String,
    pub band: usize,
    pub error: ZonalError,
}

/// Outcome of a completed product run
#[derive(Debug, Clone)]
pub struct ProductReport {
    pub variable: String,
    pub images: usize,
    pub zones: usize,
    pub rows: usize,
    pub files: Vec<PathBuf>,
}

/// Runs one product family end to end
pub struct ProductPipeline<'a> {
    run: &'a RunConfig,
    product: &'a ProductConfig,
}

impl<'a> ProductPipeline<'a> {
    pub fn new(run: &'a RunConfig, product: &'a ProductConfig) -> Self {
        Self { run, product }
    }

    /// Read zones and catalog, then process
    pub fn run(&self) -> ZonalResult<ProductReport> {
        let zones = ZoneReader::new(&self.run.uid_field, &self.run.site_field).read(&self.run.zones)?;
        let catalog = ImageCatalog::for_product(self.product)?;
        self.run_with(&zones, &catalog)
    }

    pub fn run_with(&self, zones: &ZoneSet, catalog: &ImageCatalog) -> ZonalResult<ProductReport> {
        let started = Instant::now();
        let variable = self.product.variable_name.as_str();
        log::info!("🛰️  Starting zonal statistics for '{}'", variable);

        self.product.validate()?;
        let correction = self.product.offset_correction()?;
        let decoder = DateDecoder::new(self.product.filename_date_marker)?;
        let images = catalog.images(self.product)?;
        log::info!(
            "{} images x {} bands x {} zones",
            images.len(),
            self.product.band_count,
            zones.len()
        );

        // Dropping the context removes every scratch file, on success or error.
        let ctx = RunContext::create(self.run.scratch_root.as_deref(), variable)?;
        let assembler = BandAssembler::new(variable, zones, RasterReader::new(self.run.open_timeout()));

        let band_dirs = (1..=self.product.band_count)
            .map(|band| ctx.band_dir(band))
            .collect::<ZonalResult<Vec<_>>>()?;
        let tasks: Vec<(&Image, usize)> = (1..=self.product.band_count)
            .flat_map(|band| images.iter().map(move |image| (image, band)))
            .collect();

        let failures = self.extract_all(&assembler, &tasks, &band_dirs)?;
        if !failures.is_empty() {
            for failure in &failures {
                log::error!(
                    "Extraction failed for {} band {}: {}",
                    failure.image,
                    failure.band,
                    failure.error
                );
            }
            let listed: Vec<String> = failures
                .iter()
                .map(|f| format!("{} band {}", f.image, f.band))
                .collect();
            return Err(ZonalError::SchemaMismatch(format!(
                "{} of {} extraction tasks failed: {}",
                failures.len(),
                tasks.len(),
                listed.join(", ")
            )));
        }
        log::info!("✅ All {} extraction tasks complete", tasks.len());

        let expected_rows = images.len() * zones.len();
        let mut tables = Vec::with_capacity(self.product.band_count);
        for (i, dir) in band_dirs.iter().enumerate() {
            let table = assembler.assemble(i + 1, dir, &images, &decoder)?;
            if table.rows.len() != expected_rows {
                return Err(ZonalError::SchemaMismatch(format!(
                    "band {} has {} rows, expected {}",
                    i + 1,
                    table.rows.len(),
                    expected_rows
                )));
            }
            tables.push(table);
        }

        let mut merged = merge_band_tables(variable, &tables)?;
        if let Some(correction) = correction {
            OffsetCorrector::new(correction).apply(&mut merged)?;
        }
        let files = SiteWriter::new(&self.run.output_dir, variable).write(&merged)?;

        log::info!(
            "🎉 '{}' done: {} rows in {} site files ({:.1}s)",
            variable,
            merged.rows.len(),
            files.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(ProductReport {
            variable: variable.to_string(),
            images: images.len(),
            zones: zones.len(),
            rows: merged.rows.len(),
            files,
        })
    }

    fn run_task(
        assembler: &BandAssembler<'_>,
        image: &Image,
        band: usize,
        band_dirs: &[PathBuf],
    ) -> Option<TaskFailure> {
        let out = BandAssembler::scratch_path(&band_dirs[band - 1], image);
        match assembler.process(image, band, &out) {
            Ok(_) => None,
            Err(error) => Some(TaskFailure {
                image: image.name.clone(),
                band,
                error,
            }),
        }
    }

    /// Run every (image, band) task on a bounded pool
    #[cfg(feature = "parallel")]
    fn extract_all(
        &self,
        assembler: &BandAssembler<'_>,
        tasks: &[(&Image, usize)],
        band_dirs: &[PathBuf],
    ) -> ZonalResult<Vec<TaskFailure>> {
        use rayon::prelude::*;

        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(workers) = self.run.workers {
            builder = builder.num_threads(workers);
        }
        let pool = builder
            .build()
            .map_err(|e| ZonalError::Configuration(format!("cannot build worker pool: {}", e)))?;
        log::debug!("Extracting on {} workers", pool.current_num_threads());

        Ok(pool.install(|| {
            tasks
                .par_iter()
                .filter_map(|(image, band)| Self::run_task(assembler, image, *band, band_dirs))
                .collect()
        }))
    }

    #[cfg(not(feature = "parallel"))]
    fn extract_all(
        &self,
        assembler: &BandAssembler<'_>,
        tasks: &[(&Image, usize)],
        band_dirs: &[PathBuf],
    ) -> ZonalResult<Vec<TaskFailure>> {
        Ok(tasks
            .iter()
            .filter_map(|(image, band)| Self::run_task(assembler, image, *band, band_dirs))
            .collect())
    }
}

/// Run the selected products; one product's failure does not stop the others
pub fn run_products(
    config: &RunConfig,
    names: &[String],
) -> ZonalResult<Vec<(String, ZonalResult<ProductReport>)>> {
    let products = config.select_products(names)?;
    if products.is_empty() {
        return Err(ZonalError::Configuration("no products configured".to_string()));
    }

    let zones = ZoneReader::new(&config.uid_field, &config.site_field).read(&config.zones)?;
    Ok(products
        .into_iter()
        .map(|product| {
            let result = ImageCatalog::for_product(product)
                .and_then(|catalog| ProductPipeline::new(config, product).run_with(&zones, &catalog));
            if let Err(e) = &result {
                log::error!("Product '{}' failed: {}", product.variable_name, e);
            }
            (product.variable_name.clone(), result)
        })
        .collect())
}
