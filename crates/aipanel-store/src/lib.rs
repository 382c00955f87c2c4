//! Storage layer: Arrow/Parquet tables for every run output, DuckDB for
//! ad-hoc analysis of a written panel.

pub mod batch;
mod error;
pub mod files;

pub use batch::{audit_batch, decision_batch, firm_batch, panel_batch, panel_rows};
pub use error::StoreError;
pub use files::{WrittenFiles, read_panel, read_parquet, write_parquet, write_run};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::PanelStore;
