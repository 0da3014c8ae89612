use crate::config::OffsetCorrection;
use crate::types::{MergedTable, StatField, ZonalError, ZonalResult};

/// Radiometric offset correction for products stored with a positive offset
pub struct OffsetCorrector {
    correction: OffsetCorrection,
}

impl OffsetCorrector {
    pub fn new(correction: OffsetCorrection) -> Self {
        Self { correction }
    }

    /// Apply the correction in place.
    ///
    /// For every configured band a `min` of exactly zero becomes missing
    /// first (saturated or masked pixels), then the offset is subtracted from
    /// every configured field. Missing values stay missing.
    pub fn apply(&self, table: &mut MergedTable) -> ZonalResult<()> {
        if let Some(bad) = self
            .correction
            .bands
            .iter()
            .find(|&&b| b == 0 || b > table.band_count)
        {
            return Err(ZonalError::Configuration(format!(
                "offset band {} is outside 1..={}",
                bad, table.band_count
            )));
        }

        log::info!(
            "Applying offset -{} to bands {:?} of '{}'",
            self.correction.value,
            self.correction.bands,
            table.variable
        );

        let mut zero_mins = 0usize;
        for row in &mut table.rows {
            for &band in &self.correction.bands {
                let stats = &mut row.stats[band - 1];

                if self.correction.zero_min_is_missing && stats.get(StatField::Min) == Some(0.0) {
                    stats.set(StatField::Min, None);
                    zero_mins += 1;
                }

                for &field in &self.correction.fields {
                    let shifted = stats.get(field).map(|v| v - self.correction.value);
                    stats.set(field, shifted);
                }
            }
        }

        if zero_mins > 0 {
            log::debug!("Replaced {} zero minima with missing values", zero_mins);
        }
        Ok(())
    }
}
