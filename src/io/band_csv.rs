//! Per-(image, band) intermediate tables
//!
//! Header: `uid, site, b<band>_<var>_<stat>..., band, image, date`.
//! Missing statistics are empty cells.

use crate::core::date_decoder::DateDecoder;
use crate::types::{stat_column, BandRow, StatField, StatisticTuple, ZonalError, ZonalResult};
use std::path::Path;

/// Header of the intermediate table for `band`
pub fn header(band: usize, variable: &str) -> Vec<String> {
    let mut columns = vec!["uid".to_string(), "site".to_string()];
    columns.extend(StatField::ALL.iter().map(|f| stat_column(band, variable, *f)));
    columns.extend(["band", "image", "date"].iter().map(|c| c.to_string()));
    columns
}

/// Text of one statistic cell
pub fn format_stat(field: StatField, value: Option<f64>) -> String {
    match (field, value) {
        (_, None) => String::new(),
        (StatField::Count, Some(v)) => format!("{}", v as u64),
        (_, Some(v)) => format!("{}", v),
    }
}

fn parse_stat(cell: &str, column: &str) -> ZonalResult<Option<f64>> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }
    cell.parse::<f64>().map(Some).map_err(|_| {
        ZonalError::SchemaMismatch(format!("column {} holds non-numeric '{}'", column, cell))
    })
}

/// Write one image's rows for one band
pub fn write_band_rows(path: &Path, variable: &str, band: usize, rows: &[BandRow]) -> ZonalResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header(band, variable))?;
    for row in rows {
        let mut record = vec![row.uid.to_string(), row.site_name.clone()];
        record.extend(
            StatField::ALL
                .iter()
                .map(|f| format_stat(*f, row.stats.get(*f))),
        );
        record.push(row.band.to_string());
        record.push(row.image.clone());
        record.push(row.date_token.clone());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read back a table written by [`write_band_rows`].
///
/// The header must match the expected layout exactly; acquisition windows
/// are re-derived from the `date` column.
pub fn read_band_rows(
    path: &Path,
    variable: &str,
    band: usize,
    decoder: &DateDecoder,
) -> ZonalResult<Vec<BandRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let expected = header(band, variable);
    let found: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if found != expected {
        return Err(ZonalError::SchemaMismatch(format!(
            "{} has header {:?}, expected {:?}",
            path.display(),
            found,
            expected
        )));
    }

    let stat_start = 2;
    let band_col = stat_start + StatField::ALL.len();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let uid: i64 = record[0].parse().map_err(|_| {
            ZonalError::SchemaMismatch(format!("bad uid '{}' in {}", &record[0], path.display()))
        })?;

        let mut stats = StatisticTuple::empty();
        for (i, field) in StatField::ALL.iter().enumerate() {
            let col = stat_start + i;
            stats.set(*field, parse_stat(&record[col], &expected[col])?);
        }

        let row_band: usize = record[band_col].parse().map_err(|_| {
            ZonalError::SchemaMismatch(format!("bad band '{}' in {}", &record[band_col], path.display()))
        })?;
        if row_band != band {
            return Err(ZonalError::SchemaMismatch(format!(
                "{} holds band {} rows but was filed under band {}",
                path.display(),
                row_band,
                band
            )));
        }

        let date_token = record[band_col + 2].to_string();
        rows.push(BandRow {
            uid,
            site_name: record[1].to_string(),
            window: decoder.decode_token(&date_token)?,
            stats,
            image: record[band_col + 1].to_string(),
            band,
            date_token,
        });
    }
    Ok(rows)
}
