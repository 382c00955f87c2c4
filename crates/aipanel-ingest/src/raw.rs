//! Origin-neutral raw shapes and their normalisation into core records.

use std::fmt;

use aipanel_core::{OfficeActionEvent, PatentRecord, normalize_cpc, parse_date};
use tracing::debug;

use crate::MalformedRecordError;

/// Where a raw record came from: input name and 1-based position within it.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceRef {
    pub origin: String,
    pub ordinal: usize,
}

impl SourceRef {
    pub fn new(origin: impl Into<String>, ordinal: usize) -> Self {
        Self {
            origin: origin.into(),
            ordinal,
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.origin, self.ordinal)
    }
}

/// A patent record as found in the source, before any validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPatent {
    pub application_id: Option<String>,
    /// Raw date text; integer JSON dates arrive here as their decimal form.
    pub filing_date: Option<String>,
    pub cpc: Vec<String>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub assignees: Vec<String>,
    pub source: SourceRef,
    /// Set when the source fragment itself could not be decoded.
    pub unreadable: Option<String>,
}

/// An office-action document as found in the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOfficeAction {
    pub application_id: Option<String>,
    pub action_date: Option<String>,
    pub document_id: Option<String>,
    pub raw_text: Option<String>,
    pub source: SourceRef,
    pub unreadable: Option<String>,
}

/// A normalised record plus the CPC strings dropped as malformed.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPatent {
    pub record: PatentRecord,
    pub dropped_cpc: Vec<String>,
}

/// Normalise one raw patent.
///
/// `application_id` and `filing_date` are required; everything else
/// defaults to empty. Malformed CPC codes are dropped one by one and
/// reported in [`NormalizedPatent::dropped_cpc`].
pub fn normalize(raw: RawPatent) -> Result<NormalizedPatent, MalformedRecordError> {
    if let Some(message) = raw.unreadable {
        return Err(MalformedRecordError::Unreadable {
            origin: raw.source,
            message,
        });
    }

    let application_id = required_id(raw.application_id, &raw.source)?;
    let filing_date = required_date(raw.filing_date, "filing_date", &application_id, &raw.source)?;

    let mut record = PatentRecord::new(application_id, filing_date);
    let mut dropped_cpc = Vec::new();
    for code in raw.cpc {
        match normalize_cpc(&code) {
            Some(c) => {
                record.cpc_codes.insert(c);
            }
            None if code.trim().is_empty() => {}
            None => {
                debug!(application_id = record.application_id(), code = %code, "dropping malformed CPC code");
                dropped_cpc.push(code);
            }
        }
    }

    record.title = clean_text(raw.title);
    record.abstract_text = clean_text(raw.abstract_text);
    record.raw_assignee_names = raw
        .assignees
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();

    Ok(NormalizedPatent {
        record,
        dropped_cpc,
    })
}

/// Normalise one raw office action. A missing body is not malformed; it
/// becomes an empty document and extracts as `Unknown`.
pub fn normalize_office_action(raw: RawOfficeAction) -> Result<OfficeActionEvent, MalformedRecordError> {
    if let Some(message) = raw.unreadable {
        return Err(MalformedRecordError::Unreadable {
            origin: raw.source,
            message,
        });
    }

    let application_id = required_id(raw.application_id, &raw.source)?;
    let action_date = required_date(raw.action_date, "action_date", &application_id, &raw.source)?;

    let mut event = OfficeActionEvent::new(application_id, action_date, raw.raw_text.unwrap_or_default());
    if let Some(doc) = raw.document_id.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()) {
        event = event.with_document_id(doc);
    }
    Ok(event)
}

fn required_id(id: Option<String>, source: &SourceRef) -> Result<String, MalformedRecordError> {
    id.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| MalformedRecordError::MissingField {
            origin: source.clone(),
            application_id: None,
            field: "application_id",
        })
}

fn required_date(
    raw: Option<String>,
    field: &'static str,
    application_id: &str,
    source: &SourceRef,
) -> Result<chrono::NaiveDate, MalformedRecordError> {
    let value = raw
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| MalformedRecordError::MissingField {
            origin: source.clone(),
            application_id: Some(application_id.to_string()),
            field,
        })?;
    parse_date(&value).ok_or_else(|| MalformedRecordError::UnparseableDate {
        origin: source.clone(),
        application_id: Some(application_id.to_string()),
        field,
        value,
    })
}

/// Collapse internal whitespace runs; `None` becomes empty.
fn clean_text(s: Option<String>) -> String {
    s.map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}
