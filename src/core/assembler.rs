use crate::core::date_decoder::DateDecoder;
use crate::core::zonal_stats::ZonalStatsExtractor;
use crate::io::band_csv;
use crate::io::raster::RasterReader;
use crate::io::zones::same_crs;
use crate::types::{
    BandRow, BandTable, Image, StatisticTuple, ZoneSet, ZonalError, ZonalResult,
};
use std::path::{Path, PathBuf};

/// Join one image's per-zone statistics with zone identity and image metadata
pub fn build_band_rows(
    image: &Image,
    band: usize,
    zones: &ZoneSet,
    stats: Vec<StatisticTuple>,
) -> ZonalResult<Vec<BandRow>> {
    if stats.len() != zones.len() {
        return Err(ZonalError::SchemaMismatch(format!(
            "{} band {}: {} statistic tuples for {} zones",
            image.name,
            band,
            stats.len(),
            zones.len()
        )));
    }

    Ok(zones
        .zones
        .iter()
        .zip(stats)
        .map(|(zone, stats)| {
            if stats.is_empty() {
                log::warn!(
                    "{}",
                    ZonalError::EmptyZone {
                        uid: zone.uid,
                        image: image.name.clone(),
                        band,
                    }
                );
            }
            BandRow {
                uid: zone.uid,
                site_name: zone.site_name.clone(),
                window: image.window.clone(),
                stats,
                image: image.name.clone(),
                band,
                date_token: image.filename_token.clone(),
            }
        })
        .collect())
}

/// Builds per-band rows for a product and persists them per image
pub struct BandAssembler<'a> {
    variable: &'a str,
    zones: &'a ZoneSet,
    reader: RasterReader,
}

impl<'a> BandAssembler<'a> {
    pub fn new(variable: &'a str, zones: &'a ZoneSet, reader: RasterReader) -> Self {
        Self {
            variable,
            zones,
            reader,
        }
    }

    /// Scratch file of one (image, band) task under `band_dir`
    pub fn scratch_path(band_dir: &Path, image: &Image) -> PathBuf {
        band_dir.join(format!("image_{}.csv", image.name))
    }

    /// Extract `band` of `image` and write its rows to `out`
    pub fn process(&self, image: &Image, band: usize, out: &Path) -> ZonalResult<usize> {
        let source = self.reader.open_band(&image.path, band)?;

        if let Some(declared) = source.declared_nodata {
            if declared != image.nodata {
                log::debug!(
                    "{} declares nodata {} but product sentinel {} is used",
                    image.name,
                    declared,
                    image.nodata
                );
            }
        }
        if same_crs(self.zones.srs_wkt.as_deref(), Some(source.projection.as_str())) == Some(false) {
            log::warn!(
                "Zone layer CRS differs from {}; zones must be reprojected beforehand",
                image.name
            );
        }

        let stats = ZonalStatsExtractor::new(image.nodata).extract_windows(
            &source.grid,
            &self.zones.zones,
            |window| source.read_window(window),
        )?;
        let rows = build_band_rows(image, band, self.zones, stats)?;
        band_csv::write_band_rows(out, self.variable, band, &rows)?;
        log::debug!("Wrote {} rows to {}", rows.len(), out.display());
        Ok(rows.len())
    }

    /// Concatenate the scratch files of `band` in catalog order
    pub fn assemble(
        &self,
        band: usize,
        band_dir: &Path,
        images: &[Image],
        decoder: &DateDecoder,
    ) -> ZonalResult<BandTable> {
        let mut rows = Vec::with_capacity(images.len() * self.zones.len());
        for image in images {
            let path = Self::scratch_path(band_dir, image);
            if !path.exists() {
                return Err(ZonalError::SchemaMismatch(format!(
                    "band {} has no result for {}",
                    band, image.name
                )));
            }
            let image_rows = band_csv::read_band_rows(&path, self.variable, band, decoder)?;
            if image_rows.len() != self.zones.len() {
                return Err(ZonalError::SchemaMismatch(format!(
                    "band {} of {} has {} rows for {} zones",
                    band,
                    image.name,
                    image_rows.len(),
                    self.zones.len()
                )));
            }
            rows.extend(image_rows);
        }

        log::debug!("Band {} table: {} rows", band, rows.len());
        Ok(BandTable { band, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::zonal_stats::compute_statistics;
    use crate::types::{StatField, Zone};
    use geo_types::MultiPolygon;
    use tempfile::tempdir;

    fn zones() -> ZoneSet {
        ZoneSet {
            zones: vec![
                Zone {
                    uid: 1,
                    site_name: "NTABAR0001".to_string(),
                    geometry: MultiPolygon(vec![]),
                },
                Zone {
                    uid: 2,
                    site_name: "NTAFIN0002".to_string(),
                    geometry: MultiPolygon(vec![]),
                },
            ],
            srs_wkt: None,
        }
    }

    fn image(name: &str) -> Image {
        let decoder = DateDecoder::new('m').unwrap();
        let (token, window) = decoder.decode_path(Path::new(name)).unwrap();
        Image {
            path: PathBuf::from(name),
            name: name.to_string(),
            nodata: 0.0,
            filename_token: token,
            window,
        }
    }

    #[test]
    fn test_rows_carry_identity_and_window() {
        let img = image("lztmre_nt_m202001202003_dbia2.tif");
        let stats = vec![compute_statistics(vec![1.0]), StatisticTuple::empty()];
        let rows = build_band_rows(&img, 2, &zones(), stats).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].uid, 1);
        assert_eq!(rows[1].site_name, "NTAFIN0002");
        assert_eq!(rows[1].window.end_date, "20200331");
        assert_eq!(rows[1].band, 2);
        assert_eq!(rows[1].stats.get(StatField::Mean), None);
    }

    #[test]
    fn test_stat_count_must_match_zones() {
        let img = image("lztmre_nt_m202001202003_dbia2.tif");
        let result = build_band_rows(&img, 1, &zones(), vec![StatisticTuple::empty()]);
        assert!(matches!(result, Err(ZonalError::SchemaMismatch(_))));
    }

    #[test]
    fn test_assemble_uses_catalog_order_and_requires_every_image() {
        let dir = tempdir().unwrap();
        let zone_set = zones();
        let assembler = BandAssembler::new("dbi", &zone_set, RasterReader::default());
        let decoder = DateDecoder::new('m').unwrap();
        let images = vec![
            image("lztmre_nt_m202003202005_dbia2.tif"),
            image("lztmre_nt_m202001202003_dbia2.tif"),
        ];

        for img in &images {
            let rows = build_band_rows(
                img,
                1,
                &zone_set,
                vec![compute_statistics(vec![5.0]), compute_statistics(vec![6.0])],
            )
            .unwrap();
            let path = BandAssembler::scratch_path(dir.path(), img);
            band_csv::write_band_rows(&path, "dbi", 1, &rows).unwrap();
        }

        let table = assembler.assemble(1, dir.path(), &images, &decoder).unwrap();
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.rows[0].image, "lztmre_nt_m202003202005_dbia2.tif");
        assert_eq!(table.rows[2].image, "lztmre_nt_m202001202003_dbia2.tif");
        assert_eq!(table.rows[3].uid, 2);

        let mut more = images.clone();
        more.push(image("lztmre_nt_m202005202007_dbia2.tif"));
        assert!(matches!(
            assembler.assemble(1, dir.path(), &more, &decoder),
            Err(ZonalError::SchemaMismatch(_))
        ));
    }
}
