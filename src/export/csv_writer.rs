//! CSV output writer.

use std::fs::File;
use std::path::PathBuf;

use super::{prepare_path, ExportError, RecordSink};
use crate::harvest::Record;

/// Writes records to `<dir>/<stem>.csv`.
///
/// # Format
/// - Delimiter: `;`
/// - First row: the record's column names
/// - Flags as `true`/`false`, sentinels verbatim
/// - Encoding: UTF-8
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl RecordSink for CsvSink {
    fn write<R: Record>(&self, records: &[R], stem: &str) -> Result<PathBuf, ExportError> {
        let path = prepare_path(&self.dir, stem, "csv")?;
        let file = File::create(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_writer(file);

        writer.write_record(R::COLUMNS)?;
        for record in records {
            writer.write_record(record.row().iter().map(|field| field.to_string()))?;
        }

        writer.flush()?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::testing::{conversation, message_at, user};
    use crate::harvest::{Field, MemberRecord, MessageRecord, ProfileFields, SenderFields, NONE};

    #[test]
    fn test_write_messages_csv() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        let record = MessageRecord::from_parts(
            &conversation(42),
            &message_at(7, 2024, 6, "Hello"),
            SenderFields::unknown(),
            Field::text(NONE),
        );

        let path = sink.write(&[record], "42_messages").unwrap();

        assert_eq!(path, dir.path().join("42_messages.csv"));
        let content = std::fs::read_to_string(path).unwrap();
        let mut lines = content.lines();
        let header = MessageRecord::COLUMNS.join(";");
        assert_eq!(lines.next(), Some(header.as_str()));
        assert!(header.starts_with("conversation_id;conversation_title;message_id;"));
        assert_eq!(
            lines.next(),
            Some("42;Group 42;7;unknown;unknown;unknown;2024-06-15 12:00:00;Hello;none;false")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_write_members_csv_creates_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("out").join("run1");
        let sink = CsvSink::new(&nested);
        let records: Vec<MemberRecord> = [user(1), user(2)]
            .iter()
            .map(|u| {
                MemberRecord::from_parts(&conversation(5), u, true, ProfileFields::unavailable())
            })
            .collect();

        let path = sink.write(&records, "all_telegram_contacts").unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.contains(";no description;none;none"));
    }
}
