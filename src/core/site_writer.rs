use crate::io::band_csv::format_stat;
use crate::types::{stat_column, MergedRow, MergedTable, StatField, ZonalError, ZonalResult};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const IDENTITY_COLUMNS: [&str; 11] = [
    "uid", "site", "image", "s_day", "s_month", "s_year", "s_date", "e_day", "e_month", "e_year",
    "e_date",
];

/// Writes one CSV per site of a merged table
pub struct SiteWriter {
    output_dir: PathBuf,
    variable: String,
}

impl SiteWriter {
    /// Files land in `<output_root>/<variable>_zonal_stats/`
    pub fn new(output_root: &Path, variable: &str) -> Self {
        Self {
            output_dir: output_root.join(format!("{}_zonal_stats", variable)),
            variable: variable.to_string(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn header(&self, band_count: usize) -> Vec<String> {
        let mut columns: Vec<String> = IDENTITY_COLUMNS.iter().map(|c| c.to_string()).collect();
        for band in 1..=band_count {
            columns.extend(
                StatField::ALL
                    .iter()
                    .map(|f| stat_column(band, &self.variable, *f)),
            );
        }
        columns
    }

    pub fn site_path(&self, site: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}_zonal_stats.csv", sanitize(site), self.variable))
    }

    /// Rows grouped by site, sites in first-appearance order, rows in table order
    pub fn split<'t>(table: &'t MergedTable) -> Vec<(&'t str, Vec<&'t MergedRow>)> {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<&MergedRow>> = HashMap::new();
        for row in &table.rows {
            let site = row.site_name.as_str();
            groups
                .entry(site)
                .or_insert_with(|| {
                    order.push(site);
                    Vec::new()
                })
                .push(row);
        }
        order
            .into_iter()
            .map(|site| (site, groups.remove(site).unwrap_or_default()))
            .collect()
    }

    /// Write every site's file and return their paths.
    ///
    /// All sites are staged under hidden `.partial` names first; final names
    /// appear only once every site has been written.
    pub fn write(&self, table: &MergedTable) -> ZonalResult<Vec<PathBuf>> {
        fs::create_dir_all(&self.output_dir)?;

        let groups = Self::split(table);
        let mut claimed: HashMap<PathBuf, &str> = HashMap::new();
        for (site, _) in &groups {
            let path = self.site_path(site);
            if let Some(other) = claimed.insert(path.clone(), *site) {
                return Err(ZonalError::Configuration(format!(
                    "sites '{}' and '{}' map to the same file {}",
                    other,
                    site,
                    path.display()
                )));
            }
        }

        let header = self.header(table.band_count);
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(groups.len());
        for (site, rows) in &groups {
            let path = self.site_path(site);
            let partial = partial_path(&path);
            if let Err(e) = write_rows(&partial, &header, rows) {
                let _ = fs::remove_file(&partial);
                for (staged_partial, _) in &staged {
                    let _ = fs::remove_file(staged_partial);
                }
                return Err(e);
            }
            log::debug!("Staged {} rows for site {}", rows.len(), site);
            staged.push((partial, path));
        }

        // Every site is on disk before any final name appears.
        let mut written = Vec::with_capacity(staged.len());
        for (partial, path) in staged {
            fs::rename(&partial, &path)?;
            log::info!("Wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("site.csv");
    path.with_file_name(format!(".{}.partial", file_name))
}

fn write_rows(path: &Path, header: &[String], rows: &[&MergedRow]) -> ZonalResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header)?;
    for row in rows {
        let w = &row.window;
        let mut record = vec![
            row.uid.to_string(),
            row.site_name.clone(),
            row.image.clone(),
            w.start_day.clone(),
            w.start_month.clone(),
            w.start_year.clone(),
            w.start_date.clone(),
            w.end_day.clone(),
            w.end_month.clone(),
            w.end_year.clone(),
            w.end_date.clone(),
        ];
        for stats in &row.stats {
            record.extend(StatField::ALL.iter().map(|f| format_stat(*f, stats.get(*f))));
        }
        if record.len() != header.len() {
            return Err(ZonalError::SchemaMismatch(format!(
                "row for uid {} has {} cells, header has {}",
                row.uid,
                record.len(),
                header.len()
            )));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Replace characters that are unsafe in file names
fn sanitize(site: &str) -> String {
    site.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
