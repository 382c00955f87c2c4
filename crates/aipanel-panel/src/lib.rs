//! Firm resolution, firm-quarter aggregation and the run driver that wires
//! every stage together.

pub mod aggregate;
pub mod audit;
pub mod firm;
pub mod pipeline;

pub use aggregate::{AggregateStats, Observation, aggregate};
pub use audit::{AuditEntry, AuditKind, AuditLog, Stage, StageReport};
pub use firm::{AliasTable, FirmRegistry, FirmResolver, Resolution, firm_id_for, normalize_firm_name};
pub use pipeline::{Pipeline, RecordTrace, RunContext, RunOutput};
