//! Run and product-family configuration
//!
//! A run is described by a TOML file naming the zone layer, the output
//! directory and one `[[products]]` table per raster product family.

use crate::types::{StatField, ZonalError, ZonalResult};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_uid_field() -> String {
    "uid".to_string()
}

fn default_site_field() -> String {
    "site_name".to_string()
}

fn default_marker() -> char {
    'm'
}

fn default_true() -> bool {
    true
}

/// Top-level run configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Zone vector file, already in the rasters' CRS
    pub zones: PathBuf,
    pub output_dir: PathBuf,
    /// Parent directory for per-product scratch space (system temp if unset)
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,
    /// Worker pool size for extraction (all cores if unset)
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub open_timeout_secs: Option<u64>,
    #[serde(default = "default_uid_field")]
    pub uid_field: String,
    #[serde(default = "default_site_field")]
    pub site_field: String,
    #[serde(default)]
    pub products: Vec<ProductConfig>,
}

/// Parameters of one raster product family
#[derive(Debug, Clone, Deserialize)]
pub struct ProductConfig {
    /// Prefix for column naming and output paths
    pub variable_name: String,
    pub band_count: usize,
    pub nodata_sentinel: f64,
    #[serde(default = "default_marker")]
    pub filename_date_marker: char,
    #[serde(default)]
    pub needs_offset_correction: bool,
    #[serde(default)]
    pub offset_value: Option<f64>,
    /// 1-based bands to correct; every band when unset
    #[serde(default)]
    pub offset_bands: Option<Vec<usize>>,
    /// Fields to correct; every field except count and range when unset
    #[serde(default)]
    pub offset_fields: Option<Vec<StatField>>,
    #[serde(default = "default_true")]
    pub zero_min_is_missing: bool,
    /// Newline-delimited list of raster paths
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    /// Directory searched with `pattern` when no catalog list is given
    #[serde(default)]
    pub image_dir: Option<PathBuf>,
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Where a product's image paths come from
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    List(PathBuf),
    Discover { dir: PathBuf, pattern: String },
}

/// Offset correction resolved from a product's configuration
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetCorrection {
    pub value: f64,
    pub bands: Vec<usize>,
    pub fields: Vec<StatField>,
    pub zero_min_is_missing: bool,
}

impl OffsetCorrection {
    /// Fields shifted by the offset when none are configured
    pub fn default_fields() -> Vec<StatField> {
        StatField::ALL
            .iter()
            .copied()
            .filter(|f| !matches!(f, StatField::Count | StatField::Range))
            .collect()
    }
}

impl RunConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> ZonalResult<Self> {
        let path = path.as_ref();
        log::info!("Loading run configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> ZonalResult<Self> {
        let config: RunConfig = toml::from_str(text)
            .map_err(|e| ZonalError::Configuration(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ZonalResult<()> {
        if self.uid_field.is_empty() || self.site_field.is_empty() {
            return Err(ZonalError::Configuration(
                "uid_field and site_field must not be empty".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(ZonalError::Configuration(
                "workers must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for product in &self.products {
            product.validate()?;
            if !seen.insert(product.variable_name.as_str()) {
                return Err(ZonalError::Configuration(format!(
                    "product '{}' is configured more than once",
                    product.variable_name
                )));
            }
        }
        Ok(())
    }

    pub fn open_timeout(&self) -> Option<Duration> {
        self.open_timeout_secs.map(Duration::from_secs)
    }

    /// Products to run, restricted to `names` when it is not empty
    pub fn select_products(&self, names: &[String]) -> ZonalResult<Vec<&ProductConfig>> {
        if names.is_empty() {
            return Ok(self.products.iter().collect());
        }
        names
            .iter()
            .map(|name| {
                self.products
                    .iter()
                    .find(|p| &p.variable_name == name)
                    .ok_or_else(|| {
                        ZonalError::Configuration(format!("unknown product '{}'", name))
                    })
            })
            .collect()
    }
}

impl ProductConfig {
    pub fn validate(&self) -> ZonalResult<()> {
        let name = &self.variable_name;
        if name.trim().is_empty() {
            return Err(ZonalError::Configuration(
                "variable_name must not be empty".to_string(),
            ));
        }
        if self.band_count == 0 {
            return Err(ZonalError::Configuration(format!(
                "product '{}' declares zero bands",
                name
            )));
        }
        if !self.nodata_sentinel.is_finite() {
            return Err(ZonalError::Configuration(format!(
                "product '{}' has a non-finite nodata sentinel",
                name
            )));
        }
        if !self.filename_date_marker.is_ascii_alphabetic() {
            return Err(ZonalError::Configuration(format!(
                "product '{}' date marker '{}' is not an ASCII letter",
                name, self.filename_date_marker
            )));
        }
        self.image_source()?;
        self.offset_correction()?;
        Ok(())
    }

    pub fn image_source(&self) -> ZonalResult<ImageSource> {
        match (&self.catalog, &self.image_dir, &self.pattern) {
            (Some(list), None, None) => Ok(ImageSource::List(list.clone())),
            (None, Some(dir), Some(pattern)) => Ok(ImageSource::Discover {
                dir: dir.clone(),
                pattern: pattern.clone(),
            }),
            _ => Err(ZonalError::Configuration(format!(
                "product '{}' needs either `catalog` or both `image_dir` and `pattern`",
                self.variable_name
            ))),
        }
    }

    /// Resolved offset correction, `None` for products stored without an offset
    pub fn offset_correction(&self) -> ZonalResult<Option<OffsetCorrection>> {
        let name = &self.variable_name;
        if !self.needs_offset_correction {
            if self.offset_value.is_some() {
                log::warn!(
                    "Product '{}' sets offset_value but needs_offset_correction is false; ignoring",
                    name
                );
            }
            return Ok(None);
        }

        let value = self.offset_value.ok_or_else(|| {
            ZonalError::Configuration(format!(
                "product '{}' needs offset correction but has no offset_value",
                name
            ))
        })?;
        if !value.is_finite() {
            return Err(ZonalError::Configuration(format!(
                "product '{}' has a non-finite offset_value",
                name
            )));
        }

        let bands = match &self.offset_bands {
            Some(bands) => {
                if let Some(bad) = bands.iter().find(|&&b| b == 0 || b > self.band_count) {
                    return Err(ZonalError::Configuration(format!(
                        "product '{}' offset band {} is outside 1..={}",
                        name, bad, self.band_count
                    )));
                }
                bands.clone()
            }
            None => (1..=self.band_count).collect(),
        };

        let fields = match &self.offset_fields {
            Some(fields) => {
                if fields.contains(&StatField::Count) {
                    return Err(ZonalError::Configuration(format!(
                        "product '{}' cannot offset-correct the count field",
                        name
                    )));
                }
                fields.clone()
            }
            None => OffsetCorrection::default_fields(),
        };

        Ok(Some(OffsetCorrection {
            value,
            bands,
            fields,
            zero_min_is_missing: self.zero_min_is_missing,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
        zones = "/data/biomass_1ha_all_sites.shp"
        output_dir = "/data/out"

        [[products]]
        variable_name = "dbi"
        band_count = 6
        nodata_sentinel = 32767
        needs_offset_correction = true
        offset_value = 100
        catalog = "/data/dbi_list.txt"

        [[products]]
        variable_name = "dis"
        band_count = 1
        nodata_sentinel = 255
        image_dir = "/mosaics/dis"
        pattern = "*dis*.tif"
    "#;

    #[test]
    fn test_parse_run_config() {
        let config = RunConfig::from_toml(BASE).unwrap();
        assert_eq!(config.products.len(), 2);
        assert_eq!(config.uid_field, "uid");
        assert_eq!(config.site_field, "site_name");

        let dbi = &config.products[0];
        assert_eq!(dbi.filename_date_marker, 'm');
        let correction = dbi.offset_correction().unwrap().unwrap();
        assert_eq!(correction.value, 100.0);
        assert_eq!(correction.bands, vec![1, 2, 3, 4, 5, 6]);
        assert!(!correction.fields.contains(&StatField::Range));
        assert!(!correction.fields.contains(&StatField::Count));
        assert!(correction.zero_min_is_missing);

        let dis = &config.products[1];
        assert_eq!(dis.offset_correction().unwrap(), None);
        assert_eq!(
            dis.image_source().unwrap(),
            ImageSource::Discover {
                dir: PathBuf::from("/mosaics/dis"),
                pattern: "*dis*.tif".to_string()
            }
        );
    }

    #[test]
    fn test_offset_without_value_is_rejected() {
        let text = r#"
            zones = "z.shp"
            output_dir = "out"
            [[products]]
            variable_name = "dja"
            band_count = 1
            nodata_sentinel = 0
            needs_offset_correction = true
            catalog = "dja.txt"
        "#;
        assert!(matches!(
            RunConfig::from_toml(text),
            Err(ZonalError::Configuration(_))
        ));
    }

    #[test]
    fn test_duplicate_products_are_rejected() {
        let text = r#"
            zones = "z.shp"
            output_dir = "out"
            [[products]]
            variable_name = "dja"
            band_count = 1
            nodata_sentinel = 0
            catalog = "a.txt"
            [[products]]
            variable_name = "dja"
            band_count = 1
            nodata_sentinel = 0
            catalog = "b.txt"
        "#;
        assert!(RunConfig::from_toml(text).is_err());
    }

    #[test]
    fn test_image_source_must_be_unambiguous() {
        let text = r#"
            zones = "z.shp"
            output_dir = "out"
            [[products]]
            variable_name = "stc"
            band_count = 1
            nodata_sentinel = 0
            catalog = "a.txt"
            image_dir = "/mosaics/stc"
            pattern = "*stc*.img"
        "#;
        assert!(RunConfig::from_toml(text).is_err());
    }

    #[test]
    fn test_offset_fields_and_bands_validation() {
        let mut product: ProductConfig = toml::from_str(
            r#"
            variable_name = "dbi"
            band_count = 3
            nodata_sentinel = 32767
            needs_offset_correction = true
            offset_value = 100
            offset_bands = [1, 4]
            catalog = "dbi.txt"
        "#,
        )
        .unwrap();
        assert!(product.validate().is_err());

        product.offset_bands = Some(vec![2]);
        product.offset_fields = Some(vec![StatField::Min, StatField::Range]);
        let correction = product.offset_correction().unwrap().unwrap();
        assert_eq!(correction.bands, vec![2]);
        assert_eq!(correction.fields, vec![StatField::Min, StatField::Range]);

        product.offset_fields = Some(vec![StatField::Count]);
        assert!(product.validate().is_err());
    }

    #[test]
    fn test_select_products() {
        let config = RunConfig::from_toml(BASE).unwrap();
        let all = config.select_products(&[]).unwrap();
        assert_eq!(all.len(), 2);
        let only = config.select_products(&["dis".to_string()]).unwrap();
        assert_eq!(only[0].variable_name, "dis");
        assert!(config.select_products(&["h99a2".to_string()]).is_err());
    }
}
