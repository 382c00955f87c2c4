//! Parquet files for a finished run.

use std::fs::File;
use std::path::{Path, PathBuf};

use aipanel_core::PanelRow;
use aipanel_panel::RunOutput;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::info;

use crate::StoreError;
use crate::batch::{audit_batch, decision_batch, firm_batch, panel_batch, panel_rows};

pub const PANEL_FILE: &str = "panel.parquet";
pub const DECISIONS_FILE: &str = "decisions.parquet";
pub const FIRMS_FILE: &str = "firms.parquet";
pub const AUDIT_FILE: &str = "audit.parquet";

/// Paths of the files written for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    pub panel: PathBuf,
    pub decisions: PathBuf,
    pub firms: PathBuf,
    pub audit: PathBuf,
}

/// Write one batch to a Parquet file, replacing any existing file.
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<(), StoreError> {
    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    info!(path = %path.display(), rows = batch.num_rows(), "wrote parquet");
    Ok(())
}

pub fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>, StoreError> {
    if !path.exists() {
        return Err(StoreError::ParquetNotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let batches: Result<Vec<RecordBatch>, _> = reader.collect();
    Ok(batches?)
}

/// Write the panel, decision, firm and audit tables into `out_dir`,
/// creating it if needed.
pub fn write_run(out_dir: &Path, output: &RunOutput) -> Result<WrittenFiles, StoreError> {
    std::fs::create_dir_all(out_dir)?;
    let files = WrittenFiles {
        panel: out_dir.join(PANEL_FILE),
        decisions: out_dir.join(DECISIONS_FILE),
        firms: out_dir.join(FIRMS_FILE),
        audit: out_dir.join(AUDIT_FILE),
    };
    write_parquet(&files.panel, &panel_batch(&output.panel)?)?;
    write_parquet(&files.decisions, &decision_batch(&output.traces)?)?;
    write_parquet(&files.firms, &firm_batch(&output.firms)?)?;
    write_parquet(&files.audit, &audit_batch(output.audit.entries())?)?;
    Ok(files)
}

/// Read a written `panel.parquet` back into rows.
pub fn read_panel(path: &Path) -> Result<Vec<PanelRow>, StoreError> {
    panel_rows(&read_parquet(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aipanel_core::{FirmId, Group};
    use tempfile::TempDir;

    fn rows() -> Vec<PanelRow> {
        vec![PanelRow {
            firm_id: FirmId::new("F00000000000000ab"),
            year: 2024,
            quarter: 3,
            group: Group::Ai,
            application_count: 2,
            rejection_count: 0,
            rejection_rate: Some(0.0),
            treated: true,
            post: true,
        }]
    }

    #[test]
    fn panel_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PANEL_FILE);
        write_parquet(&path, &panel_batch(&rows()).unwrap()).unwrap();
        assert_eq!(read_panel(&path).unwrap(), rows());
    }

    #[test]
    fn written_schema_keeps_column_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PANEL_FILE);
        write_parquet(&path, &panel_batch(&rows()).unwrap()).unwrap();
        let batches = read_parquet(&path).unwrap();
        let schema = batches[0].schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        let expected = aipanel_core::tables::panel_schema();
        let expected: Vec<&str> = expected.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = read_panel(&dir.path().join("nope.parquet")).unwrap_err();
        assert!(matches!(err, StoreError::ParquetNotFound(_)));
    }
}
