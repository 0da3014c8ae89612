use crate::types::{Zone, ZoneSet, ZonalError, ZonalResult};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{FieldValue, LayerAccess};
use gdal::Dataset;
use geo_types::{Geometry, MultiPolygon};
use std::collections::HashSet;
use std::path::Path;

/// Reads site plot polygons from a vector file
pub struct ZoneReader {
    uid_field: String,
    site_field: String,
}

impl ZoneReader {
    pub fn new(uid_field: &str, site_field: &str) -> Self {
        Self {
            uid_field: uid_field.to_string(),
            site_field: site_field.to_string(),
        }
    }

    /// Read every feature of the first layer, in layer order.
    ///
    /// Order is whatever the driver yields for the file; reading the same
    /// file twice yields the same sequence.
    pub fn read<P: AsRef<Path>>(&self, path: P) -> ZonalResult<ZoneSet> {
        let path = path.as_ref();
        log::info!("Reading zones from: {}", path.display());

        let dataset = Dataset::open(path).map_err(|source| ZonalError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut layer = dataset.layer(0)?;
        let srs_wkt = layer.spatial_ref().and_then(|srs| srs.to_wkt().ok());

        let mut zones = Vec::new();
        let mut seen = HashSet::new();
        for (index, feature) in layer.features().enumerate() {
            let uid = match feature.field(&self.uid_field)? {
                Some(FieldValue::IntegerValue(v)) => v as i64,
                Some(FieldValue::Integer64Value(v)) => v,
                Some(FieldValue::RealValue(v)) if v.fract() == 0.0 => v as i64,
                other => {
                    return Err(ZonalError::InvalidZone(format!(
                        "feature {} has non-integer {}: {:?}",
                        index, self.uid_field, other
                    )))
                }
            };
            if uid <= 0 {
                return Err(ZonalError::InvalidZone(format!(
                    "feature {} has {} {} (must be > 0)",
                    index, self.uid_field, uid
                )));
            }
            if !seen.insert(uid) {
                return Err(ZonalError::InvalidZone(format!(
                    "{} {} is not unique",
                    self.uid_field, uid
                )));
            }

            let site_name = match feature.field(&self.site_field)? {
                Some(FieldValue::StringValue(s)) if !s.trim().is_empty() => s,
                other => {
                    return Err(ZonalError::InvalidZone(format!(
                        "zone {} has no usable {}: {:?}",
                        uid, self.site_field, other
                    )))
                }
            };

            let geometry = feature
                .geometry()
                .ok_or_else(|| ZonalError::InvalidZone(format!("zone {} has no geometry", uid)))?
                .to_geo()?;
            let geometry = match geometry {
                Geometry::Polygon(polygon) => MultiPolygon(vec![polygon]),
                Geometry::MultiPolygon(multi) => multi,
                _ => {
                    return Err(ZonalError::InvalidZone(format!(
                        "zone {} is not a polygon",
                        uid
                    )))
                }
            };

            zones.push(Zone {
                uid,
                site_name,
                geometry,
            });
        }

        if zones.is_empty() {
            return Err(ZonalError::InvalidZone(format!(
                "{} contains no zones",
                path.display()
            )));
        }

        log::info!("Loaded {} zones", zones.len());
        Ok(ZoneSet { zones, srs_wkt })
    }
}

/// Whether two WKT spatial references describe the same CRS.
///
/// `None` when either side is missing or cannot be parsed.
pub fn same_crs(a: Option<&str>, b: Option<&str>) -> Option<bool> {
    let (a, b) = (a?, b?);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if a == b {
        return Some(true);
    }
    let a = SpatialRef::from_wkt(a).ok()?;
    let b = SpatialRef::from_wkt(b).ok()?;
    Some(a == b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_zone_file() {
        let reader = ZoneReader::new("uid", "site_name");
        assert!(matches!(
            reader.read("/nonexistent/biomass_1ha_all_sites.shp"),
            Err(ZonalError::Open { .. })
        ));
    }

    #[test]
    fn test_same_crs_unknown_sides() {
        assert_eq!(same_crs(None, Some("x")), None);
        assert_eq!(same_crs(Some(""), Some("x")), None);
        assert_eq!(same_crs(Some("GEOGCS[]"), Some("GEOGCS[]")), Some(true));
    }
}
