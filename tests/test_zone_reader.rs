use gdal::spatial_ref::SpatialRef;
use plotstats::io::zones::same_crs;
use plotstats::{ZonalError, ZoneReader};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const SQUARE: &str =
    r#"{"type": "Polygon", "coordinates": [[[0, 80], [20, 80], [20, 100], [0, 100], [0, 80]]]}"#;

fn feature(properties: &str, geometry: &str) -> String {
    format!(
        r#"{{"type": "Feature", "properties": {}, "geometry": {}}}"#,
        properties, geometry
    )
}

fn write_layer(dir: &TempDir, features: &[String]) -> PathBuf {
    let path = dir.path().join("sites.geojson");
    fs::write(
        &path,
        format!(
            r#"{{"type": "FeatureCollection", "features": [{}]}}"#,
            features.join(",\n")
        ),
    )
    .unwrap();
    path
}

fn read(features: &[String]) -> Result<plotstats::ZoneSet, ZonalError> {
    let dir = tempfile::tempdir().unwrap();
    let path = write_layer(&dir, features);
    ZoneReader::new("uid", "site_name").read(&path)
}

#[test]
fn test_valid_layer_keeps_layer_order() {
    let multi = r#"{"type": "MultiPolygon", "coordinates": [[[[50, 30], [70, 30], [70, 50], [50, 50], [50, 30]]], [[[80, 30], [90, 30], [90, 40], [80, 30]]]]}"#;
    let zones = read(&[
        feature(r#"{"uid": 7, "site_name": "NTABAR0001"}"#, SQUARE),
        feature(r#"{"uid": 3, "site_name": "NTAFIN0002"}"#, multi),
    ])
    .unwrap();

    assert_eq!(zones.len(), 2);
    assert_eq!(zones.zones[0].uid, 7);
    assert_eq!(zones.zones[1].site_name, "NTAFIN0002");
    assert_eq!(zones.zones[0].geometry.0.len(), 1);
    assert_eq!(zones.zones[1].geometry.0.len(), 2);
}

#[test]
fn test_integral_real_uid_is_accepted() {
    let zones = read(&[
        feature(r#"{"uid": 1.0, "site_name": "NTABAR0001"}"#, SQUARE),
        feature(r#"{"uid": 2.0, "site_name": "NTABAR0001"}"#, SQUARE),
    ])
    .unwrap();
    let uids: Vec<i64> = zones.zones.iter().map(|z| z.uid).collect();
    assert_eq!(uids, vec![1, 2]);
}

#[test]
fn test_fractional_uid_is_rejected() {
    let result = read(&[feature(r#"{"uid": 1.5, "site_name": "NTABAR0001"}"#, SQUARE)]);
    assert!(matches!(result, Err(ZonalError::InvalidZone(_))));
}

#[test]
fn test_text_uid_is_rejected() {
    let result = read(&[feature(r#"{"uid": "one", "site_name": "NTABAR0001"}"#, SQUARE)]);
    assert!(matches!(result, Err(ZonalError::InvalidZone(_))));
}

#[test]
fn test_duplicate_uid_is_rejected() {
    let result = read(&[
        feature(r#"{"uid": 4, "site_name": "NTABAR0001"}"#, SQUARE),
        feature(r#"{"uid": 4, "site_name": "NTAFIN0002"}"#, SQUARE),
    ]);
    assert!(matches!(result, Err(ZonalError::InvalidZone(_))));
}

#[test]
fn test_zero_uid_is_rejected() {
    let result = read(&[feature(r#"{"uid": 0, "site_name": "NTABAR0001"}"#, SQUARE)]);
    assert!(matches!(result, Err(ZonalError::InvalidZone(_))));
}

#[test]
fn test_empty_site_name_is_rejected() {
    let result = read(&[
        feature(r#"{"uid": 1, "site_name": "NTABAR0001"}"#, SQUARE),
        feature(r#"{"uid": 2, "site_name": ""}"#, SQUARE),
    ]);
    assert!(matches!(result, Err(ZonalError::InvalidZone(_))));
}

#[test]
fn test_point_geometry_is_rejected() {
    let result = read(&[feature(
        r#"{"uid": 1, "site_name": "NTABAR0001"}"#,
        r#"{"type": "Point", "coordinates": [10, 90]}"#,
    )]);
    assert!(matches!(result, Err(ZonalError::InvalidZone(_))));
}

#[test]
fn test_empty_layer_is_rejected() {
    let result = read(&[]);
    assert!(matches!(result, Err(ZonalError::InvalidZone(_))));
}

#[test]
fn test_different_crs_are_detected() {
    let wgs84 = SpatialRef::from_epsg(4326).unwrap().to_wkt().unwrap();
    let gda94_53 = SpatialRef::from_epsg(28353).unwrap().to_wkt().unwrap();

    assert_eq!(same_crs(Some(&wgs84), Some(&gda94_53)), Some(false));
    assert_eq!(same_crs(Some(&wgs84), Some(&wgs84)), Some(true));
    assert_eq!(same_crs(Some(&wgs84), Some("")), None);
}
