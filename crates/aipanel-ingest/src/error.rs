use thiserror::Error;

use crate::SourceRef;

/// A single record that cannot be normalised. Never fatal to a run: the
/// record is skipped, counted and written to the audit log.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedRecordError {
    #[error("{origin}: missing required field `{field}`")]
    MissingField {
        origin: SourceRef,
        application_id: Option<String>,
        field: &'static str,
    },

    #[error("{origin}: unparseable {field} {value:?}")]
    UnparseableDate {
        origin: SourceRef,
        application_id: Option<String>,
        field: &'static str,
        value: String,
    },

    #[error("{origin}: unreadable record: {message}")]
    Unreadable { origin: SourceRef, message: String },
}

impl MalformedRecordError {
    pub fn origin(&self) -> &SourceRef {
        match self {
            Self::MissingField { origin, .. }
            | Self::UnparseableDate { origin, .. }
            | Self::Unreadable { origin, .. } => origin,
        }
    }

    pub fn application_id(&self) -> Option<&str> {
        match self {
            Self::MissingField { application_id, .. }
            | Self::UnparseableDate { application_id, .. } => application_id.as_deref(),
            Self::Unreadable { .. } => None,
        }
    }

    /// Audit-log key: the application id when known, else the source locator.
    pub fn audit_key(&self) -> String {
        self.application_id()
            .map(str::to_string)
            .unwrap_or_else(|| self.origin().to_string())
    }
}

/// Failure of a whole input file. Records already produced still stand.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("XML error in {origin} at byte {position}: {source}")]
    Xml {
        origin: String,
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("I/O error reading {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
}
