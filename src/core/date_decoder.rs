use crate::types::{AcquisitionWindow, ZonalError, ZonalResult};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::path::Path;

/// Decodes acquisition windows from composite file names.
///
/// The date lives in the second-to-last `_`-delimited token, e.g.
/// `lztmre_nt_m202001202003_dbia2.tif`. Seasonal composites carry the
/// marker letter followed by two `YYYYMM` values; single-date composites
/// carry `YYYYMMDD`, optionally after one non-marker letter.
#[derive(Debug, Clone)]
pub struct DateDecoder {
    marker: char,
    seasonal: Regex,
    single: Regex,
}

impl DateDecoder {
    pub fn new(marker: char) -> ZonalResult<Self> {
        if !marker.is_ascii_alphabetic() {
            return Err(ZonalError::Configuration(format!(
                "date marker '{}' is not an ASCII letter",
                marker
            )));
        }
        let seasonal = Regex::new(r"^(\d{4})(\d{2})(\d{4})(\d{2})$")
            .map_err(|e| ZonalError::Configuration(e.to_string()))?;
        let single = Regex::new(r"^[A-Za-z]?(\d{4})(\d{2})(\d{2})$")
            .map_err(|e| ZonalError::Configuration(e.to_string()))?;
        Ok(Self {
            marker,
            seasonal,
            single,
        })
    }

    /// Second-to-last `_` token of the file name component of `path`
    pub fn date_token(path: &Path) -> ZonalResult<String> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ZonalError::Format(format!("no file name in {}", path.display())))?;
        let tokens: Vec<&str> = name.split('_').collect();
        if tokens.len() < 2 {
            return Err(ZonalError::Format(format!(
                "'{}' has no '_'-delimited date token",
                name
            )));
        }
        Ok(tokens[tokens.len() - 2].to_string())
    }

    /// Decode the window of an image from its path
    pub fn decode_path(&self, path: &Path) -> ZonalResult<(String, AcquisitionWindow)> {
        let token = Self::date_token(path)?;
        let window = self.decode_token(&token)?;
        Ok((token, window))
    }

    pub fn decode_token(&self, token: &str) -> ZonalResult<AcquisitionWindow> {
        match token.strip_prefix(self.marker) {
            Some(digits) => self.decode_seasonal(token, digits),
            None => self.decode_single(token),
        }
    }

    fn decode_seasonal(&self, token: &str, digits: &str) -> ZonalResult<AcquisitionWindow> {
        let caps = self.seasonal.captures(digits).ok_or_else(|| {
            ZonalError::Format(format!(
                "seasonal token '{}' must carry 12 digits after '{}'",
                token, self.marker
            ))
        })?;
        let (s_year, s_month, e_year, e_month) = (&caps[1], &caps[2], &caps[3], &caps[4]);

        let start = calendar_date(token, s_year, s_month, 1)?;
        let end_first = calendar_date(token, e_year, e_month, 1)?;
        let end = last_day_of_month(end_first)
            .ok_or_else(|| ZonalError::Format(format!("'{}' ends out of range", token)))?;
        if end < start {
            return Err(ZonalError::Format(format!(
                "'{}' ends before it starts",
                token
            )));
        }

        let e_day = end.day().to_string();
        Ok(AcquisitionWindow {
            start_year: s_year.to_string(),
            start_month: s_month.to_string(),
            start_day: "01".to_string(),
            start_date: format!("{}{}01", s_year, s_month),
            end_year: e_year.to_string(),
            end_month: e_month.to_string(),
            end_date: format!("{}{}{}", e_year, e_month, e_day),
            end_day: e_day,
        })
    }

    fn decode_single(&self, token: &str) -> ZonalResult<AcquisitionWindow> {
        let caps = self.single.captures(token).ok_or_else(|| {
            ZonalError::Format(format!(
                "'{}' is neither a '{}'-marked seasonal token nor a YYYYMMDD date",
                token, self.marker
            ))
        })?;
        let (year, month, day) = (&caps[1], &caps[2], &caps[3]);
        let day_num: u32 = day
            .parse()
            .map_err(|_| ZonalError::Format(format!("bad day in '{}'", token)))?;
        calendar_date(token, year, month, day_num)?;

        Ok(AcquisitionWindow {
            start_year: year.to_string(),
            start_month: month.to_string(),
            start_day: day.to_string(),
            start_date: token.to_string(),
            end_year: year.to_string(),
            end_month: month.to_string(),
            end_day: day.to_string(),
            end_date: token.to_string(),
        })
    }
}

fn calendar_date(token: &str, year: &str, month: &str, day: u32) -> ZonalResult<NaiveDate> {
    let y: i32 = year
        .parse()
        .map_err(|_| ZonalError::Format(format!("bad year in '{}'", token)))?;
    let m: u32 = month
        .parse()
        .map_err(|_| ZonalError::Format(format!("bad month in '{}'", token)))?;
    NaiveDate::from_ymd_opt(y, m, day)
        .ok_or_else(|| ZonalError::Format(format!("'{}' is not a calendar date", token)))
}

/// Last calendar day of the month containing `first`
fn last_day_of_month(first: NaiveDate) -> Option<NaiveDate> {
    let (y, m) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)?.pred_opt()
}
