//! Cross-band merge
//!
//! Band tables are joined on the `(uid, image)` identity of each row, with
//! band 1 defining output order. Every band must hold exactly the same set
//! of keys; anything else is a `SchemaMismatch`, never a silent pad or trim.

use crate::types::{BandRow, BandTable, MergedRow, MergedTable, ZonalError, ZonalResult};
use std::collections::HashMap;

type RowKey<'a> = (i64, &'a str);

fn key(row: &BandRow) -> RowKey<'_> {
    (row.uid, row.image.as_str())
}

fn index_rows(table: &BandTable) -> ZonalResult<HashMap<RowKey<'_>, &BandRow>> {
    let mut index = HashMap::with_capacity(table.rows.len());
    for row in &table.rows {
        if index.insert(key(row), row).is_some() {
            return Err(ZonalError::SchemaMismatch(format!(
                "band {} holds uid {} / image {} more than once",
                table.band, row.uid, row.image
            )));
        }
    }
    Ok(index)
}

/// Merge band tables `1..=B` of one product into a wide table
pub fn merge_band_tables(variable: &str, tables: &[BandTable]) -> ZonalResult<MergedTable> {
    let first = tables
        .first()
        .ok_or_else(|| ZonalError::SchemaMismatch("no band tables to merge".to_string()))?;

    for (i, table) in tables.iter().enumerate() {
        if table.band != i + 1 {
            return Err(ZonalError::SchemaMismatch(format!(
                "band tables out of order: position {} holds band {}",
                i + 1,
                table.band
            )));
        }
        if table.rows.len() != first.rows.len() {
            return Err(ZonalError::SchemaMismatch(format!(
                "band {} has {} rows but band 1 has {}",
                table.band,
                table.rows.len(),
                first.rows.len()
            )));
        }
    }

    // Band 1 only needs the duplicate check; its order is the output order.
    index_rows(first)?;
    let others = tables[1..]
        .iter()
        .map(index_rows)
        .collect::<ZonalResult<Vec<_>>>()?;

    let mut reordered = vec![0usize; others.len()];
    let mut rows = Vec::with_capacity(first.rows.len());
    for (position, anchor) in first.rows.iter().enumerate() {
        let mut stats = Vec::with_capacity(tables.len());
        stats.push(anchor.stats);

        for (i, index) in others.iter().enumerate() {
            let band = i + 2;
            let matched = index.get(&key(anchor)).ok_or_else(|| {
                ZonalError::SchemaMismatch(format!(
                    "band {} has no row for uid {} / image {}",
                    band, anchor.uid, anchor.image
                ))
            })?;
            if key(&tables[band - 1].rows[position]) != key(anchor) {
                reordered[i] += 1;
            }
            stats.push(matched.stats);
        }

        rows.push(MergedRow {
            uid: anchor.uid,
            site_name: anchor.site_name.clone(),
            image: anchor.image.clone(),
            window: anchor.window.clone(),
            stats,
        });
    }

    for (i, count) in reordered.iter().enumerate() {
        if *count > 0 {
            log::debug!(
                "Band {} rows are ordered differently from band 1 ({} positions); joined by key",
                i + 2,
                count
            );
        }
    }

    log::info!(
        "Merged {} bands of '{}' into {} rows",
        tables.len(),
        variable,
        rows.len()
    );
    Ok(MergedTable {
        variable: variable.to_string(),
        band_count: tables.len(),
        rows,
    })
}
