//! Record types shared by every pipeline stage.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Mutually exclusive study group of a patent application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Group {
    Unclassified,
    #[serde(rename = "AI")]
    Ai,
    Control,
    Excluded,
}

impl Group {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unclassified => "Unclassified",
            Self::Ai => "AI",
            Self::Control => "Control",
            Self::Excluded => "Excluded",
        }
    }

    /// Groups that may appear in a panel row.
    pub fn enters_panel(&self) -> bool {
        matches!(self, Self::Ai | Self::Control)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Unclassified" => Some(Self::Unclassified),
            "AI" => Some(Self::Ai),
            "Control" => Some(Self::Control),
            "Excluded" => Some(Self::Excluded),
            _ => None,
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of scanning one office action for a subject-matter-eligibility
/// rejection. `Unknown` is kept distinct from `NotRejected` all the way to
/// aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RejectionSignal {
    Rejected,
    NotRejected,
    Unknown,
}

impl RejectionSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::NotRejected => "not_rejected",
            Self::Unknown => "unknown",
        }
    }

    /// `Some(true|false)` for a determined outcome, `None` for `Unknown`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Rejected => Some(true),
            Self::NotRejected => Some(false),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for RejectionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar quarter, ordered by year then quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quarter {
    pub year: i32,
    /// 1..=4
    pub quarter: u8,
}

impl Quarter {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: (date.month0() / 3 + 1) as u8,
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.quarter)
    }
}

/// One patent application or grant, normalised from any source shape.
#[derive(Debug, Clone, PartialEq)]
pub struct PatentRecord {
    application_id: String,
    pub filing_date: NaiveDate,
    /// Normalised CPC codes (see [`crate::normalize_cpc`]), sorted and deduplicated.
    pub cpc_codes: BTreeSet<String>,
    pub title: String,
    pub abstract_text: String,
    /// First entry is the primary assignee.
    pub raw_assignee_names: Vec<String>,
    group: Group,
}

impl PatentRecord {
    pub fn new(application_id: impl Into<String>, filing_date: NaiveDate) -> Self {
        Self {
            application_id: application_id.into(),
            filing_date,
            cpc_codes: BTreeSet::new(),
            title: String::new(),
            abstract_text: String::new(),
            raw_assignee_names: Vec::new(),
            group: Group::Unclassified,
        }
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn group(&self) -> Group {
        self.group
    }

    /// Record the classifier's decision. Succeeds once per record.
    pub fn set_group(&mut self, group: Group) -> Result<(), CoreError> {
        if group == Group::Unclassified {
            return Err(CoreError::InvalidGroup(group, self.application_id.clone()));
        }
        if self.group != Group::Unclassified {
            return Err(CoreError::GroupAlreadySet {
                application_id: self.application_id.clone(),
                current: self.group,
            });
        }
        self.group = group;
        Ok(())
    }

    pub fn primary_assignee(&self) -> Option<&str> {
        self.raw_assignee_names.first().map(String::as_str)
    }

    pub fn filing_quarter(&self) -> Quarter {
        Quarter::of(self.filing_date)
    }
}

/// One examination round for an application.
#[derive(Debug, Clone, PartialEq)]
pub struct OfficeActionEvent {
    pub application_id: String,
    pub action_date: NaiveDate,
    /// Source document identifier, when the origin provides one.
    pub document_id: Option<String>,
    pub raw_text: String,
    signal: Option<RejectionSignal>,
}

impl OfficeActionEvent {
    pub fn new(application_id: impl Into<String>, action_date: NaiveDate, raw_text: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            action_date,
            document_id: None,
            raw_text: raw_text.into(),
            signal: None,
        }
    }

    pub fn with_document_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    /// Extraction result, once computed.
    pub fn signal(&self) -> Option<RejectionSignal> {
        self.signal
    }

    /// `Some(bool)` when extraction produced a determined outcome.
    pub fn has_101_rejection(&self) -> Option<bool> {
        self.signal.and_then(|s| s.as_bool())
    }

    /// Store the extraction result. Succeeds once per event.
    pub fn set_signal(&mut self, signal: RejectionSignal) -> Result<(), CoreError> {
        if self.signal.is_some() {
            return Err(CoreError::SignalAlreadySet(self.application_id.clone()));
        }
        self.signal = Some(signal);
        Ok(())
    }

    /// Chronological ordering key with deterministic tie-breaks.
    pub fn round_key(&self) -> (NaiveDate, Option<&str>, &str) {
        (self.action_date, self.document_id.as_deref(), self.raw_text.as_str())
    }
}

/// Stable surrogate key for a canonical firm.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FirmId(String);

impl FirmId {
    const UNKNOWN: &'static str = "F_UNKNOWN";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Sentinel for names that cannot be resolved.
    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FirmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical firm entity with every raw spelling that resolved to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firm {
    pub firm_id: FirmId,
    pub canonical_name: String,
    pub alias_names: BTreeSet<String>,
}

/// One (firm, quarter, group) observation.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRow {
    pub firm_id: FirmId,
    pub year: i32,
    pub quarter: u8,
    pub group: Group,
    pub application_count: u64,
    pub rejection_count: u64,
    /// `rejection_count / application_count`; `None` when the count is zero.
    pub rejection_rate: Option<f64>,
    pub treated: bool,
    pub post: bool,
}

impl PanelRow {
    pub fn period(&self) -> Quarter {
        Quarter {
            year: self.year,
            quarter: self.quarter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn quarter_boundaries() {
        assert_eq!(Quarter::of(ymd(2024, 1, 1)), Quarter { year: 2024, quarter: 1 });
        assert_eq!(Quarter::of(ymd(2024, 3, 31)), Quarter { year: 2024, quarter: 1 });
        assert_eq!(Quarter::of(ymd(2024, 4, 1)), Quarter { year: 2024, quarter: 2 });
        assert_eq!(Quarter::of(ymd(2024, 7, 17)), Quarter { year: 2024, quarter: 3 });
        assert_eq!(Quarter::of(ymd(2024, 12, 31)), Quarter { year: 2024, quarter: 4 });
    }

    #[test]
    fn quarters_order_by_year_first() {
        let q4_2023 = Quarter { year: 2023, quarter: 4 };
        let q1_2024 = Quarter { year: 2024, quarter: 1 };
        assert!(q4_2023 < q1_2024);
        assert_eq!(q1_2024.to_string(), "2024Q1");
    }

    #[test]
    fn group_is_set_exactly_once() {
        let mut rec = PatentRecord::new("16123456", ymd(2024, 5, 1));
        assert_eq!(rec.group(), Group::Unclassified);
        rec.set_group(Group::Ai).unwrap();
        assert_eq!(rec.group(), Group::Ai);

        let err = rec.set_group(Group::Control).unwrap_err();
        assert_eq!(
            err,
            CoreError::GroupAlreadySet {
                application_id: "16123456".into(),
                current: Group::Ai
            }
        );
        assert_eq!(rec.group(), Group::Ai);
    }

    #[test]
    fn cannot_assign_unclassified() {
        let mut rec = PatentRecord::new("1", ymd(2024, 5, 1));
        assert!(rec.set_group(Group::Unclassified).is_err());
    }

    #[test]
    fn signal_is_set_exactly_once() {
        let mut ev = OfficeActionEvent::new("1", ymd(2024, 5, 1), "text");
        assert_eq!(ev.has_101_rejection(), None);
        ev.set_signal(RejectionSignal::Unknown).unwrap();
        assert_eq!(ev.signal(), Some(RejectionSignal::Unknown));
        assert_eq!(ev.has_101_rejection(), None);
        assert!(ev.set_signal(RejectionSignal::Rejected).is_err());
    }

    #[test]
    fn group_labels_round_trip() {
        for g in [Group::Unclassified, Group::Ai, Group::Control, Group::Excluded] {
            assert_eq!(Group::parse(g.as_str()), Some(g));
        }
        assert!(Group::Ai.enters_panel());
        assert!(!Group::Excluded.enters_panel());
    }

    #[test]
    fn unknown_firm_sentinel() {
        assert!(FirmId::unknown().is_unknown());
        assert!(!FirmId::new("F0123").is_unknown());
    }
}
