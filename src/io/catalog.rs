use crate::config::{ImageSource, ProductConfig};
use crate::core::date_decoder::DateDecoder;
use crate::types::{Image, ZonalError, ZonalResult};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Ordered raster paths of one product family
#[derive(Debug, Clone, Default)]
pub struct ImageCatalog {
    pub paths: Vec<PathBuf>,
}

impl ImageCatalog {
    /// Read a newline-delimited list of raster paths; blank lines are skipped
    pub fn load<P: AsRef<Path>>(list: P) -> ZonalResult<Self> {
        let list = list.as_ref();
        log::info!("Reading image list: {}", list.display());
        let text = fs::read_to_string(list)?;
        let paths = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect();
        Ok(Self { paths })
    }

    /// Files in `dir` whose name matches the glob `pattern`, sorted by path
    pub fn discover<P: AsRef<Path>>(dir: P, pattern: &str) -> ZonalResult<Self> {
        let dir = dir.as_ref();
        let dir_str = dir.to_str().ok_or_else(|| {
            ZonalError::Configuration(format!("{} is not valid UTF-8", dir.display()))
        })?;
        let full = format!("{}/{}", glob::Pattern::escape(dir_str), pattern);
        log::info!("Searching for images: {}", full);

        let mut paths = Vec::new();
        let entries = glob::glob(&full)
            .map_err(|e| ZonalError::Configuration(format!("bad pattern '{}': {}", pattern, e)))?;
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => paths.push(path),
                Ok(_) => {}
                Err(e) => log::warn!("Skipping unreadable entry: {}", e),
            }
        }
        paths.sort();

        log::info!("Found {} images", paths.len());
        Ok(Self { paths })
    }

    /// Catalog for a product, from its list file or by discovery
    pub fn for_product(product: &ProductConfig) -> ZonalResult<Self> {
        match product.image_source()? {
            ImageSource::List(list) => Self::load(list),
            ImageSource::Discover { dir, pattern } => Self::discover(dir, &pattern),
        }
    }

    /// Write the catalog as a newline-delimited list
    pub fn write_list<P: AsRef<Path>>(&self, path: P) -> ZonalResult<()> {
        let mut file = fs::File::create(path.as_ref())?;
        for p in &self.paths {
            writeln!(file, "{}", p.display())?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Resolve every path into an `Image`, decoding its acquisition window.
    ///
    /// Fails on the first undecodable name, on duplicate file names and on
    /// an empty catalog.
    pub fn images(&self, product: &ProductConfig) -> ZonalResult<Vec<Image>> {
        if self.paths.is_empty() {
            return Err(ZonalError::Configuration(format!(
                "no images listed for product '{}'",
                product.variable_name
            )));
        }

        let decoder = DateDecoder::new(product.filename_date_marker)?;
        let mut names = HashSet::new();
        let mut images = Vec::with_capacity(self.paths.len());

        for path in &self.paths {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    ZonalError::Configuration(format!("{} has no file name", path.display()))
                })?
                .to_string();
            if !names.insert(name.clone()) {
                return Err(ZonalError::Configuration(format!(
                    "image name '{}' appears more than once",
                    name
                )));
            }

            let (filename_token, window) = decoder.decode_path(path)?;
            images.push(Image {
                path: path.clone(),
                name,
                nodata: product.nodata_sentinel,
                filename_token,
                window,
            });
        }
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn product(catalog: &Path) -> ProductConfig {
        toml::from_str(&format!(
            r#"
            variable_name = "dbi"
            band_count = 6
            nodata_sentinel = 32767
            catalog = "{}"
        "#,
            catalog.display()
        ))
        .unwrap()
    }

    #[test]
    fn test_load_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let list = dir.path().join("dbi_list.txt");
        fs::write(
            &list,
            "/m/lztmre_nt_m202001202003_dbia2.tif\n\n  /m/lztmre_nt_m202003202005_dbia2.tif  \n",
        )
        .unwrap();

        let catalog = ImageCatalog::load(&list).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.paths[1], PathBuf::from("/m/lztmre_nt_m202003202005_dbia2.tif"));

        let images = catalog.images(&product(&list)).unwrap();
        assert_eq!(images[0].name, "lztmre_nt_m202001202003_dbia2.tif");
        assert_eq!(images[0].filename_token, "m202001202003");
        assert_eq!(images[1].window.end_date, "20200531");
        assert_eq!(images[1].nodata, 32767.0);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let catalog = ImageCatalog {
            paths: vec![
                PathBuf::from("/a/lztmre_nt_m202001202003_dbia2.tif"),
                PathBuf::from("/b/lztmre_nt_m202001202003_dbia2.tif"),
            ],
        };
        let result = catalog.images(&product(Path::new("unused.txt")));
        assert!(matches!(result, Err(ZonalError::Configuration(_))));
    }

    #[test]
    fn test_bad_token_fails_catalog() {
        let catalog = ImageCatalog {
            paths: vec![PathBuf::from("/a/lztmre_nt_m2020_dbia2.tif")],
        };
        let result = catalog.images(&product(Path::new("unused.txt")));
        assert!(matches!(result, Err(ZonalError::Format(_))));
    }

    #[test]
    fn test_discover_and_write_list() {
        let dir = tempdir().unwrap();
        for name in [
            "lztmre_nt_m202003202005_dbia2.tif",
            "lztmre_nt_m202001202003_dbia2.tif",
            "lztmre_nt_m202001202003_dima2.tif",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let catalog = ImageCatalog::discover(dir.path(), "*dbi*.tif").unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.paths[0].ends_with("lztmre_nt_m202001202003_dbia2.tif"));

        let list = dir.path().join("dbi_list.txt");
        catalog.write_list(&list).unwrap();
        let reloaded = ImageCatalog::load(&list).unwrap();
        assert_eq!(reloaded.paths, catalog.paths);
    }
}
