//! Tabular export of harvested records.
//!
//! A [`RecordSink`] writes one ordered batch of records under a destination
//! stem (`"-1001234_messages"`, `"all_telegram_contacts"`); the sink picks
//! the file extension.

#[cfg(feature = "csv-output")]
mod csv_writer;
#[cfg(feature = "xlsx")]
mod xlsx_writer;

#[cfg(feature = "csv-output")]
pub use csv_writer::CsvSink;
#[cfg(feature = "xlsx")]
pub use xlsx_writer::XlsxSink;

#[cfg(not(any(feature = "xlsx", feature = "csv-output")))]
compile_error!("enable at least one export format: `xlsx` or `csv-output`");

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{ExportFormat, HarvestConfig};
use crate::harvest::Record;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error while exporting: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "xlsx")]
    #[error("Spreadsheet write failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[cfg(feature = "csv-output")]
    #[error("CSV write failed: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("Export format '{0}' is not enabled in this build")]
    FormatDisabled(ExportFormat),
}

/// Destination for batches of flat records.
pub trait RecordSink: Send + Sync {
    /// Writes `records` under `stem` and returns the file written.
    fn write<R: Record>(&self, records: &[R], stem: &str) -> Result<PathBuf, ExportError>;
}

/// File-backed sink chosen from [`HarvestConfig::format`].
#[derive(Debug, Clone)]
pub enum FileSink {
    #[cfg(feature = "xlsx")]
    Xlsx(XlsxSink),
    #[cfg(feature = "csv-output")]
    Csv(CsvSink),
}

impl FileSink {
    pub fn from_config(config: &HarvestConfig) -> Result<Self, ExportError> {
        let dir = config.output_dir.clone();
        match config.format {
            #[cfg(feature = "xlsx")]
            ExportFormat::Xlsx => Ok(Self::Xlsx(XlsxSink::new(dir))),
            #[cfg(feature = "csv-output")]
            ExportFormat::Csv => Ok(Self::Csv(CsvSink::new(dir))),
            #[allow(unreachable_patterns)]
            other => Err(ExportError::FormatDisabled(other)),
        }
    }
}

impl RecordSink for FileSink {
    fn write<R: Record>(&self, records: &[R], stem: &str) -> Result<PathBuf, ExportError> {
        match self {
            #[cfg(feature = "xlsx")]
            Self::Xlsx(sink) => sink.write(records, stem),
            #[cfg(feature = "csv-output")]
            Self::Csv(sink) => sink.write(records, stem),
        }
    }
}

fn prepare_path(dir: &Path, stem: &str, extension: &str) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir)?;
    Ok(dir.join(format!("{stem}.{extension}")))
}
