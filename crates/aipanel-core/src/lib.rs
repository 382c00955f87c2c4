pub mod config;
pub mod cpc;
pub mod date;
pub mod error;
pub mod model;
pub mod schema;

pub use config::{ClassifierTables, ExtractorOptions, PanelOptions, PipelineConfig};
pub use cpc::{CpcPrefix, normalize_cpc};
pub use date::parse_date;
pub use error::{ConfigError, CoreError};
pub use model::{
    Firm, FirmId, Group, OfficeActionEvent, PanelRow, PatentRecord, Quarter, RejectionSignal,
};
pub use schema::tables;
