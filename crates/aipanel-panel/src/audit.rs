//! Skip / ambiguity audit log and per-stage counters.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{info, warn};

use crate::AggregateStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Normalize,
    Classify,
    Extract,
    Resolve,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::Classify => "classify",
            Self::Extract => "extract",
            Self::Resolve => "resolve",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuditKind {
    Malformed,
    DroppedCpc,
    Duplicate,
    Excluded,
    OrphanOfficeAction,
    AmbiguousRejection,
    UnknownOutcome,
    NoOfficeAction,
    UnresolvedFirm,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::DroppedCpc => "dropped_cpc",
            Self::Duplicate => "duplicate",
            Self::Excluded => "excluded",
            Self::OrphanOfficeAction => "orphan_office_action",
            Self::AmbiguousRejection => "ambiguous_rejection",
            Self::UnknownOutcome => "unknown_outcome",
            Self::NoOfficeAction => "no_office_action",
            Self::UnresolvedFirm => "unresolved_firm",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One skipped or ambiguous case, keyed by application id (or source
/// locator when the id itself was missing).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AuditEntry {
    pub application_id: String,
    pub stage: Stage,
    pub kind: AuditKind,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn record(&mut self, application_id: impl Into<String>, stage: Stage, kind: AuditKind, detail: Option<String>) {
        self.entries.push(AuditEntry {
            application_id: application_id.into(),
            stage,
            kind,
            detail,
        });
    }

    /// Sort entries into their canonical order.
    pub fn finish(&mut self) {
        self.entries.sort();
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: AuditKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn counts_by_kind(&self) -> BTreeMap<AuditKind, usize> {
        let mut out = BTreeMap::new();
        for e in &self.entries {
            *out.entry(e.kind).or_insert(0) += 1;
        }
        out
    }

    /// Entries for one application, in canonical order once finished.
    pub fn for_application<'a>(&'a self, application_id: &'a str) -> impl Iterator<Item = &'a AuditEntry> {
        self.entries.iter().filter(move |e| e.application_id == application_id)
    }
}

/// Counters for every stage of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    pub patents_read: u64,
    pub patents_malformed: u64,
    pub patents_duplicate: u64,
    pub cpc_dropped: u64,
    pub actions_read: u64,
    pub actions_malformed: u64,
    pub actions_orphaned: u64,
    pub classified_ai: u64,
    pub classified_control: u64,
    pub classified_excluded: u64,
    pub documents_scanned: u64,
    pub documents_rejected: u64,
    pub documents_not_rejected: u64,
    pub documents_unknown: u64,
    pub firms: u64,
    pub firms_unresolved: u64,
    pub aggregate: AggregateStats,
    pub panel_rows: u64,
}

impl StageReport {
    pub fn log(&self) {
        info!(
            read = self.patents_read,
            malformed = self.patents_malformed,
            duplicate = self.patents_duplicate,
            cpc_dropped = self.cpc_dropped,
            actions = self.actions_read,
            actions_malformed = self.actions_malformed,
            actions_orphaned = self.actions_orphaned,
            "normalize"
        );
        info!(
            ai = self.classified_ai,
            control = self.classified_control,
            excluded = self.classified_excluded,
            "classify"
        );
        info!(
            scanned = self.documents_scanned,
            rejected = self.documents_rejected,
            not_rejected = self.documents_not_rejected,
            unknown = self.documents_unknown,
            "extract"
        );
        info!(firms = self.firms, unresolved = self.firms_unresolved, "resolve");
        info!(
            rows = self.panel_rows,
            counted = self.aggregate.counted,
            unknown_outcome = self.aggregate.unknown_outcome,
            no_office_action = self.aggregate.no_office_action,
            "aggregate"
        );
        if self.patents_malformed + self.actions_malformed > 0 {
            warn!(
                patents = self.patents_malformed,
                actions = self.actions_malformed,
                "malformed records skipped; see audit log"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_orders_entries() {
        let mut log = AuditLog::default();
        log.record("B", Stage::Resolve, AuditKind::UnresolvedFirm, None);
        log.record("A", Stage::Extract, AuditKind::UnknownOutcome, Some("empty".into()));
        log.record("A", Stage::Classify, AuditKind::Excluded, Some("fallthrough".into()));
        log.finish();

        let keys: Vec<(&str, AuditKind)> = log.entries().iter().map(|e| (e.application_id.as_str(), e.kind)).collect();
        assert_eq!(
            keys,
            [
                ("A", AuditKind::Excluded),
                ("A", AuditKind::UnknownOutcome),
                ("B", AuditKind::UnresolvedFirm)
            ]
        );
        assert_eq!(log.for_application("A").count(), 2);
        assert_eq!(log.count(AuditKind::UnresolvedFirm), 1);
        assert_eq!(log.counts_by_kind().len(), 3);
    }

    #[test]
    fn stages_name_the_pipeline_steps_that_record() {
        let names: Vec<_> = [Stage::Normalize, Stage::Classify, Stage::Extract, Stage::Resolve]
            .iter()
            .map(Stage::as_str)
            .collect();
        assert_eq!(names, ["normalize", "classify", "extract", "resolve"]);
    }
}
