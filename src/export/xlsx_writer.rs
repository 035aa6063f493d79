//! Excel workbook writer.

use rust_xlsxwriter::{Format, Workbook};
use std::path::PathBuf;

use super::{prepare_path, ExportError, RecordSink};
use crate::harvest::{Field, Record};

/// Writes records to `<dir>/<stem>.xlsx`, one worksheet, bold header row.
///
/// Integers are written as numbers and flags as booleans so the sheet can be
/// filtered natively; sentinels stay text.
#[derive(Debug, Clone)]
pub struct XlsxSink {
    dir: PathBuf,
}

impl XlsxSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl RecordSink for XlsxSink {
    fn write<R: Record>(&self, records: &[R], stem: &str) -> Result<PathBuf, ExportError> {
        let path = prepare_path(&self.dir, stem, "xlsx")?;

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let header = Format::new().set_bold();

        for (col, name) in (0u16..).zip(R::COLUMNS) {
            sheet.write_string_with_format(0, col, *name, &header)?;
        }

        for (row, record) in (1u32..).zip(records) {
            for (col, field) in (0u16..).zip(record.row()) {
                match field {
                    Field::Text(text) => sheet.write_string(row, col, text.as_str())?,
                    // Excel stores numbers as f64; ids above 2^53 lose precision
                    Field::Integer(value) => sheet.write_number(row, col, *value as f64)?,
                    Field::Flag(flag) => sheet.write_boolean(row, col, *flag)?,
                };
            }
        }

        workbook.save(&path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::testing::{conversation, user};
    use crate::harvest::{MemberRecord, ProfileFields};

    #[test]
    fn test_write_members_xlsx() {
        let dir = tempfile::tempdir().unwrap();
        let sink = XlsxSink::new(dir.path());
        let profile = ProfileFields::unavailable();
        let record = MemberRecord::from_parts(&conversation(9), &user(3), false, profile);

        let path = sink.write(&[record], "9_contacts").unwrap();

        assert_eq!(path, dir.path().join("9_contacts.xlsx"));
        let bytes = std::fs::read(&path).unwrap();
        // xlsx is a zip container
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_write_empty_batch_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let sink = XlsxSink::new(dir.path());

        let path = sink.write::<MemberRecord>(&[], "empty").unwrap();

        assert!(path.exists());
    }
}
