//! DuckDB analytical view over a written panel.

use std::path::Path;

use aipanel_core::PanelRow;
use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use tracing::info;

use crate::StoreError;
use crate::batch::panel_rows;

/// In-memory DuckDB database holding the `panel` table, for ad-hoc SQL on
/// a finished run.
pub struct PanelStore {
    conn: Connection,
}

impl PanelStore {
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Load `panel.parquet` into the `panel` table, replacing any previous load.
    pub fn load_panel(&self, path: &Path) -> Result<(), StoreError> {
        if !path.exists() {
            return Err(StoreError::ParquetNotFound(path.to_path_buf()));
        }
        let sql = format!(
            "CREATE OR REPLACE TABLE panel AS SELECT * FROM read_parquet('{}')",
            path.display().to_string().replace('\'', "''")
        );
        self.conn.execute_batch(&sql)?;
        let count = self.panel_count()?;
        info!(count, "loaded panel table");
        Ok(())
    }

    pub fn panel_count(&self) -> Result<usize, StoreError> {
        let mut stmt = self.conn.prepare("SELECT count(*)::BIGINT AS cnt FROM panel")?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        let batch = batches.first().ok_or(StoreError::NoResults)?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Column {
                column: "cnt",
                message: "count column not i64".into(),
            })?;
        Ok(col.value(0) as usize)
    }

    /// Every row for one firm, ordered by period then group.
    pub fn rows_for_firm(&self, firm_id: &str) -> Result<Vec<PanelRow>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM panel WHERE firm_id = ? ORDER BY year, quarter, \"group\"")?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([firm_id])?.collect();
        panel_rows(&batches)
    }

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::panel_batch;
    use crate::files::write_parquet;
    use aipanel_core::{FirmId, Group};
    use tempfile::TempDir;

    fn row(firm: &str, quarter: u8, group: Group) -> PanelRow {
        PanelRow {
            firm_id: FirmId::new(firm),
            year: 2024,
            quarter,
            group,
            application_count: 4,
            rejection_count: 1,
            rejection_rate: Some(0.25),
            treated: group == Group::Ai,
            post: quarter >= 3,
        }
    }

    #[test]
    fn loads_and_filters_by_firm() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("panel.parquet");
        let rows = vec![
            row("FA", 3, Group::Ai),
            row("FA", 2, Group::Control),
            row("FB", 2, Group::Ai),
        ];
        write_parquet(&path, &panel_batch(&rows).unwrap()).unwrap();

        let store = PanelStore::open().unwrap();
        store.load_panel(&path).unwrap();
        assert_eq!(store.panel_count().unwrap(), 3);

        let fa = store.rows_for_firm("FA").unwrap();
        assert_eq!(fa.len(), 2);
        assert_eq!(fa[0].quarter, 2);
        assert_eq!(fa[1].group, Group::Ai);
    }

    #[test]
    fn missing_parquet_is_reported() {
        let store = PanelStore::open().unwrap();
        let err = store.load_panel(Path::new("/nonexistent/panel.parquet")).unwrap_err();
        assert!(matches!(err, StoreError::ParquetNotFound(_)));
    }
}
