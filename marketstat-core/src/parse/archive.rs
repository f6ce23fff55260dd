//! Zipped CSV archives: the NSE F&O bhavcopy and the margin-trading report.

use super::delimited::{column_index, read_rows};
use super::{decode_lossy, parse_number, DatedRecord, ParseError, SourceParser};
use crate::domain::{DateKey, MetricRecord};
use chrono::NaiveDate;
use std::fmt;
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Selects an archive member by file name: case-insensitive prefix and suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPattern {
    prefix: String,
    suffix: String,
}

impl MemberPattern {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().to_lowercase(),
            suffix: suffix.into().to_lowercase(),
        }
    }

    /// Any member ending in `suffix`.
    pub fn suffix(suffix: impl Into<String>) -> Self {
        Self::new("", suffix)
    }

    pub fn matches(&self, name: &str) -> bool {
        let file = name.rsplit('/').next().unwrap_or(name).to_lowercase();
        file.starts_with(&self.prefix) && file.ends_with(&self.suffix)
    }
}

impl fmt::Display for MemberPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*{}", self.prefix, self.suffix)
    }
}

/// Text of the first member matching `pattern`, in archive order.
pub(crate) fn read_member(raw: &[u8], pattern: &MemberPattern) -> Result<String, ParseError> {
    let mut archive =
        ZipArchive::new(Cursor::new(raw)).map_err(|e| ParseError::Archive(e.to_string()))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ParseError::Archive(format!("entry {i}: {e}")))?;
        if !pattern.matches(file.name()) {
            continue;
        }
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| ParseError::Archive(format!("{}: {e}", file.name())))?;
        return Ok(decode_lossy(&buf));
    }

    Err(ParseError::MemberNotFound(pattern.to_string()))
}

/// Sums target columns over every data row of a zipped CSV.
///
/// Targets are matched by exact (trimmed) header name and the metric takes the
/// column's name. Only targets present in the header appear in the record;
/// an archive with none of them is an error.
#[derive(Debug, Clone)]
pub struct ArchiveCsvParser {
    member: MemberPattern,
    targets: Vec<String>,
}

impl ArchiveCsvParser {
    pub fn new(member: MemberPattern, targets: &[&str]) -> Self {
        Self {
            member,
            targets: targets.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl SourceParser for ArchiveCsvParser {
    fn parse(&self, raw: &[u8], requested: NaiveDate) -> Result<Vec<DatedRecord>, ParseError> {
        let text = read_member(raw, &self.member)?;
        let rows = read_rows(&text)?;
        let header = rows
            .first()
            .ok_or_else(|| ParseError::Malformed(format!("{} is empty", self.member)))?;

        let found: Vec<(&str, usize)> = self
            .targets
            .iter()
            .filter_map(|t| column_index(header, t).map(|idx| (t.as_str(), idx)))
            .collect();
        if found.is_empty() {
            let preview: Vec<&str> = header.iter().take(10).map(String::as_str).collect();
            return Err(ParseError::NoTargetColumns(preview.join(",")));
        }

        let mut sums = vec![0.0; found.len()];
        for row in &rows[1..] {
            for (sum, (_, idx)) in sums.iter_mut().zip(&found) {
                if let Some(v) = row.get(*idx).and_then(|c| parse_number(c)) {
                    *sum += v;
                }
            }
        }

        let record = found
            .iter()
            .zip(sums)
            .map(|((name, _), sum)| (*name, sum))
            .collect::<MetricRecord>();
        Ok(vec![(DateKey::new(requested), record)])
    }
}

/// Reads "serial number → value" rows out of a zipped CSV.
///
/// Layouts are tried in order per row; the first layout whose serial cell is a
/// known serial decides the row. The first occurrence of each serial wins.
/// Partial results are returned (the collector reports the gaps); no serial
/// at all is an error.
#[derive(Debug, Clone)]
pub struct SerialRowsParser {
    member: MemberPattern,
    serials: Vec<(String, String)>,
    layouts: Vec<(usize, usize)>,
}

impl SerialRowsParser {
    /// `serials` maps serial cell text to metric name. Layouts default to
    /// (serial col 0, value col 2) then (col 1, col 3).
    pub fn new(member: MemberPattern, serials: &[(&str, &str)]) -> Self {
        Self {
            member,
            serials: serials
                .iter()
                .map(|(s, m)| (s.to_string(), m.to_string()))
                .collect(),
            layouts: vec![(0, 2), (1, 3)],
        }
    }

    pub fn with_layouts(mut self, layouts: Vec<(usize, usize)>) -> Self {
        self.layouts = layouts;
        self
    }

    fn metric_for(&self, serial: &str) -> Option<&str> {
        self.serials
            .iter()
            .find(|(s, _)| s == serial)
            .map(|(_, m)| m.as_str())
    }
}

impl SourceParser for SerialRowsParser {
    fn parse(&self, raw: &[u8], requested: NaiveDate) -> Result<Vec<DatedRecord>, ParseError> {
        let text = read_member(raw, &self.member)?;
        let mut record = MetricRecord::new();

        for row in read_rows(&text)? {
            for &(serial_col, value_col) in &self.layouts {
                let serial = row.get(serial_col).map(|c| c.trim()).unwrap_or("");
                let Some(metric) = self.metric_for(serial) else {
                    continue;
                };
                if record.get(metric).is_none() {
                    if let Some(v) = row.get(value_col).and_then(|c| parse_number(c)) {
                        record.insert(metric, v);
                    }
                }
                break;
            }
        }

        if record.is_empty() {
            return Err(ParseError::RowNotFound(format!(
                "serial rows in {}",
                self.member
            )));
        }
        Ok(vec![(DateKey::new(requested), record)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 3).unwrap()
    }

    fn fo_parser() -> ArchiveCsvParser {
        ArchiveCsvParser::new(
            MemberPattern::new("op", ".csv"),
            &["NO_OF_CONT", "NO_OF_TRADE", "NOTION_VAL", "PR_VAL"],
        )
    }

    #[test]
    fn sums_target_columns() {
        let raw = zip_of(&[(
            "op03022025.csv",
            "A,NO_OF_CONT,B,NO_OF_TRADE\n1,100,x,5\n2,50,y,3\n",
        )]);
        let out = fo_parser().parse(&raw, date()).unwrap();
        assert_eq!(out.len(), 1);
        let rec = &out[0].1;
        assert_eq!(rec.get("NO_OF_CONT"), Some(150.0));
        assert_eq!(rec.get("NO_OF_TRADE"), Some(8.0));
        // Absent targets stay absent.
        assert_eq!(rec.len(), 2);
    }

    #[test]
    fn picks_member_by_pattern() {
        let raw = zip_of(&[
            ("readme.txt", "ignore me"),
            ("fo03022025.csv", "NO_OF_CONT\n999\n"),
            ("OP03022025.CSV", "NO_OF_CONT\n\n7\n,\n3\n"),
        ]);
        let out = fo_parser().parse(&raw, date()).unwrap();
        assert_eq!(out[0].1.get("NO_OF_CONT"), Some(10.0));
    }

    #[test]
    fn skips_blank_and_non_numeric_cells() {
        let raw = zip_of(&[(
            "op03022025.csv",
            "NO_OF_CONT,PR_VAL\n\"1,000\",2.5\n,abc\n-,0.5\n",
        )]);
        let rec = &fo_parser().parse(&raw, date()).unwrap()[0].1;
        assert_eq!(rec.get("NO_OF_CONT"), Some(1000.0));
        assert_eq!(rec.get("PR_VAL"), Some(3.0));
    }

    #[test]
    fn missing_member_is_an_error() {
        let raw = zip_of(&[("fo03022025.csv", "NO_OF_CONT\n1\n")]);
        assert_eq!(
            fo_parser().parse(&raw, date()),
            Err(ParseError::MemberNotFound("op*.csv".into()))
        );
    }

    #[test]
    fn no_target_columns_is_an_error() {
        let raw = zip_of(&[("op03022025.csv", "X,Y\n1,2\n")]);
        assert!(matches!(
            fo_parser().parse(&raw, date()),
            Err(ParseError::NoTargetColumns(_))
        ));
    }

    #[test]
    fn rejects_non_zip_bytes() {
        assert!(matches!(
            fo_parser().parse(b"<html>maintenance</html>", date()),
            Err(ParseError::Archive(_))
        ));
    }

    fn mrg_parser() -> SerialRowsParser {
        SerialRowsParser::new(
            MemberPattern::suffix(".csv"),
            &[
                ("1", "NSE_MRG_OUTSTANDING_BOD_LAKHS"),
                ("2", "NSE_MRG_FRESH_EXP_LAKHS"),
                ("3", "NSE_MRG_EXP_LIQ_LAKHS"),
                ("4", "NSE_MRG_NET_EOD_LAKHS"),
            ],
        )
    }

    #[test]
    fn reads_serial_rows_in_current_layout() {
        let raw = zip_of(&[(
            "mrg_trading_030225.csv",
            "Sr. No.,Particulars,Amount (Rs. Lakhs)\n\
             1,Scripwise Total Outstanding on beginning of day,\"8,450.25\"\n\
             2,Fresh Exposure taken during the day,1200\n\
             3,Exposure liquidated during the day,900.5\n\
             4,Net scripwise outstanding at end of day,8749.75\n\
             1,Duplicate row,1\n",
        )]);
        let rec = &mrg_parser().parse(&raw, date()).unwrap()[0].1;
        assert_eq!(rec.get("NSE_MRG_OUTSTANDING_BOD_LAKHS"), Some(8450.25));
        assert_eq!(rec.get("NSE_MRG_NET_EOD_LAKHS"), Some(8749.75));
        assert_eq!(rec.len(), 4);
    }

    #[test]
    fn reads_serial_rows_in_shifted_layout() {
        let raw = zip_of(&[(
            "mrg_trading_030224.csv",
            ",Sr. No.,Particulars,Amount\n,1,BOD,10\n,2,Fresh,20\n",
        )]);
        let rec = &mrg_parser().parse(&raw, date()).unwrap()[0].1;
        assert_eq!(rec.get("NSE_MRG_OUTSTANDING_BOD_LAKHS"), Some(10.0));
        assert_eq!(rec.get("NSE_MRG_FRESH_EXP_LAKHS"), Some(20.0));
        assert_eq!(
            rec.missing(&["NSE_MRG_EXP_LIQ_LAKHS", "NSE_MRG_NET_EOD_LAKHS"]).len(),
            2
        );
    }

    #[test]
    fn no_serial_rows_is_an_error() {
        let raw = zip_of(&[("mrg.csv", "a,b,c\nx,y,z\n")]);
        assert!(matches!(
            mrg_parser().parse(&raw, date()),
            Err(ParseError::RowNotFound(_))
        ));
    }
}
