//! Conversion between pipeline types and Arrow `RecordBatch`es.

use std::sync::Arc;

use aipanel_core::tables::{audit_schema, decision_schema, firm_schema, panel_schema};
use aipanel_core::{Firm, FirmId, Group, PanelRow};
use aipanel_panel::{AuditEntry, RecordTrace};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float64Array, Int32Array, LargeStringArray, ListBuilder,
    StringArray, StringBuilder, StringViewArray, UInt8Array, UInt32Array, UInt64Array,
};
use arrow::datatypes::Date32Type;
use arrow::record_batch::RecordBatch;

use crate::StoreError;

// ── Writers ──

pub fn panel_batch(rows: &[PanelRow]) -> Result<RecordBatch, StoreError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.firm_id.as_str()))),
        Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
        Arc::new(UInt8Array::from_iter_values(rows.iter().map(|r| r.quarter))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.group.as_str()))),
        Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.application_count))),
        Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.rejection_count))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.rejection_rate))),
        Arc::new(BooleanArray::from_iter(rows.iter().map(|r| Some(r.treated)))),
        Arc::new(BooleanArray::from_iter(rows.iter().map(|r| Some(r.post)))),
    ];
    Ok(RecordBatch::try_new(Arc::new(panel_schema()), columns)?)
}

pub fn decision_batch(traces: &[RecordTrace]) -> Result<RecordBatch, StoreError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(traces.iter().map(|t| t.application_id.as_str()))),
        Arc::new(Date32Array::from_iter_values(
            traces.iter().map(|t| Date32Type::from_naive_date(t.filing_date)),
        )),
        Arc::new(StringArray::from_iter_values(traces.iter().map(|t| t.group.as_str()))),
        Arc::new(StringArray::from_iter_values(traces.iter().map(|t| t.rule.as_str()))),
        Arc::new(StringArray::from_iter(traces.iter().map(|t| t.evidence.as_deref()))),
        Arc::new(StringArray::from_iter(traces.iter().map(|t| t.primary_signal.map(|s| s.as_str())))),
        Arc::new(StringArray::from_iter(
            traces.iter().map(|t| t.extraction_pattern.map(|p| p.as_str())),
        )),
        Arc::new(UInt32Array::from_iter_values(traces.iter().map(|t| t.office_action_rounds))),
        Arc::new(BooleanArray::from_iter(traces.iter().map(|t| Some(t.any_round_rejected)))),
        Arc::new(StringArray::from_iter(traces.iter().map(|t| t.primary_assignee.as_deref()))),
        Arc::new(StringArray::from_iter(traces.iter().map(|t| t.firm_id.as_ref().map(FirmId::as_str)))),
    ];
    Ok(RecordBatch::try_new(Arc::new(decision_schema()), columns)?)
}

pub fn firm_batch(firms: &[Firm]) -> Result<RecordBatch, StoreError> {
    let mut aliases = ListBuilder::new(StringBuilder::new());
    for f in firms {
        for a in &f.alias_names {
            aliases.values().append_value(a);
        }
        aliases.append(true);
    }
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(firms.iter().map(|f| f.firm_id.as_str()))),
        Arc::new(StringArray::from_iter_values(firms.iter().map(|f| f.canonical_name.as_str()))),
        Arc::new(aliases.finish()),
    ];
    Ok(RecordBatch::try_new(Arc::new(firm_schema()), columns)?)
}

pub fn audit_batch(entries: &[AuditEntry]) -> Result<RecordBatch, StoreError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.application_id.as_str()))),
        Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.stage.as_str()))),
        Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.kind.as_str()))),
        Arc::new(StringArray::from_iter(entries.iter().map(|e| e.detail.as_deref()))),
    ];
    Ok(RecordBatch::try_new(Arc::new(audit_schema()), columns)?)
}

// ── Readers ──

/// Decode panel rows from batches with the panel schema.
///
/// Columns are looked up by name and string columns may use any Arrow
/// string layout, so batches read back through DuckDB still decode.
pub fn panel_rows(batches: &[RecordBatch]) -> Result<Vec<PanelRow>, StoreError> {
    let mut rows = Vec::new();
    for batch in batches {
        let firm_id = column(batch, "firm_id")?;
        let year = typed::<Int32Array>(batch, "year")?;
        let quarter = typed::<UInt8Array>(batch, "quarter")?;
        let group = column(batch, "group")?;
        let applications = typed::<UInt64Array>(batch, "application_count")?;
        let rejections = typed::<UInt64Array>(batch, "rejection_count")?;
        let rate = typed::<Float64Array>(batch, "rejection_rate")?;
        let treated = typed::<BooleanArray>(batch, "treated")?;
        let post = typed::<BooleanArray>(batch, "post")?;

        for i in 0..batch.num_rows() {
            let firm = get_string(firm_id, i).ok_or_else(|| null_in("firm_id"))?;
            let group_name = get_string(group, i).ok_or_else(|| null_in("group"))?;
            let group = Group::parse(&group_name).ok_or_else(|| StoreError::Column {
                column: "group",
                message: format!("unknown group {group_name:?}"),
            })?;
            rows.push(PanelRow {
                firm_id: FirmId::new(firm),
                year: year.value(i),
                quarter: quarter.value(i),
                group,
                application_count: applications.value(i),
                rejection_count: rejections.value(i),
                rejection_rate: (!rate.is_null(i)).then(|| rate.value(i)),
                treated: treated.value(i),
                post: post.value(i),
            });
        }
    }
    Ok(rows)
}

fn column<'a>(batch: &'a RecordBatch, name: &'static str) -> Result<&'a dyn Array, StoreError> {
    batch
        .column_by_name(name)
        .map(|c| c.as_ref())
        .ok_or_else(|| StoreError::Column {
            column: name,
            message: "missing".into(),
        })
}

fn typed<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &'static str) -> Result<&'a T, StoreError> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| StoreError::Column {
            column: name,
            message: "unexpected data type".into(),
        })
}

fn null_in(column: &'static str) -> StoreError {
    StoreError::Column {
        column,
        message: "unexpected null".into(),
    }
}

/// Extract a string value from an Arrow array (handles Utf8, LargeUtf8 and
/// Utf8View).
fn get_string(col: &dyn Array, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    let any = col.as_any();
    any.downcast_ref::<StringArray>()
        .map(|arr| arr.value(row).to_string())
        .or_else(|| any.downcast_ref::<LargeStringArray>().map(|arr| arr.value(row).to_string()))
        .or_else(|| any.downcast_ref::<StringViewArray>().map(|arr| arr.value(row).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aipanel_classify::{PatternId, RuleId};
    use aipanel_core::RejectionSignal;
    use aipanel_panel::{AuditKind, AuditLog, Stage};
    use arrow::array::ListArray;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn sample_rows() -> Vec<PanelRow> {
        vec![
            PanelRow {
                firm_id: FirmId::new("F0000000000000001"),
                year: 2024,
                quarter: 2,
                group: Group::Ai,
                application_count: 3,
                rejection_count: 1,
                rejection_rate: Some(1.0 / 3.0),
                treated: true,
                post: false,
            },
            PanelRow {
                firm_id: FirmId::new("F0000000000000002"),
                year: 2024,
                quarter: 3,
                group: Group::Control,
                application_count: 0,
                rejection_count: 0,
                rejection_rate: None,
                treated: false,
                post: true,
            },
        ]
    }

    #[test]
    fn panel_batch_decodes_back() {
        let rows = sample_rows();
        let batch = panel_batch(&rows).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.column(6).null_count(), 1);
        assert_eq!(panel_rows(&[batch]).unwrap(), rows);
    }

    #[test]
    fn missing_column_is_reported() {
        let batch = audit_batch(&[]).unwrap();
        let err = panel_rows(&[batch]).unwrap_err();
        assert!(matches!(err, StoreError::Column { column: "firm_id", .. }));
    }

    #[test]
    fn decision_batch_carries_nullable_trace_fields() {
        let traces = vec![
            RecordTrace {
                application_id: "17000001".into(),
                filing_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                group: Group::Ai,
                rule: RuleId::AiCpc,
                evidence: Some("G06N3/08".into()),
                primary_signal: Some(RejectionSignal::Rejected),
                extraction_pattern: Some(PatternId::StatuteCitation),
                office_action_rounds: 2,
                any_round_rejected: true,
                primary_assignee: Some("Acme Corp.".into()),
                firm_id: Some(FirmId::new("F0000000000000001")),
            },
            RecordTrace {
                application_id: "17000002".into(),
                filing_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
                group: Group::Excluded,
                rule: RuleId::Fallthrough,
                evidence: None,
                primary_signal: None,
                extraction_pattern: None,
                office_action_rounds: 0,
                any_round_rejected: false,
                primary_assignee: None,
                firm_id: None,
            },
        ];
        let batch = decision_batch(&traces).unwrap();
        assert_eq!(batch.num_columns(), 11);
        let rule = batch.column_by_name("rule").unwrap();
        assert_eq!(get_string(rule.as_ref(), 0).as_deref(), Some("ai_cpc"));
        let signal = batch.column_by_name("primary_signal").unwrap();
        assert_eq!(get_string(signal.as_ref(), 0).as_deref(), Some("rejected"));
        assert!(signal.is_null(1));
        let dates = typed::<Date32Array>(&batch, "filing_date").unwrap();
        assert_eq!(dates.value_as_date(0), NaiveDate::from_ymd_opt(2024, 5, 1));
    }

    #[test]
    fn firm_batch_lists_aliases() {
        let firms = vec![Firm {
            firm_id: FirmId::new("F0000000000000001"),
            canonical_name: "ACME".into(),
            alias_names: BTreeSet::from(["ACME CORPORATION".to_string(), "Acme Corp.".to_string()]),
        }];
        let batch = firm_batch(&firms).unwrap();
        let aliases = typed::<ListArray>(&batch, "alias_names").unwrap();
        assert_eq!(aliases.value(0).len(), 2);
    }

    #[test]
    fn audit_batch_uses_stable_names() {
        let mut log = AuditLog::default();
        log.record("17000001", Stage::Extract, AuditKind::UnknownOutcome, Some("garbled".into()));
        let batch = audit_batch(log.entries()).unwrap();
        let kind = batch.column_by_name("kind").unwrap();
        assert_eq!(get_string(kind.as_ref(), 0).as_deref(), Some("unknown_outcome"));
        let stage = batch.column_by_name("stage").unwrap();
        assert_eq!(get_string(stage.as_ref(), 0).as_deref(), Some("extract"));
    }
}
