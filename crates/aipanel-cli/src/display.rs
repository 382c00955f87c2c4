//! Terminal output for the CLI subcommands.

use std::collections::{BTreeMap, BTreeSet};

use aipanel_classify::{Decision, Extraction};
use aipanel_core::{Group, PanelRow};
use aipanel_panel::{Resolution, RunOutput};
use aipanel_store::WrittenFiles;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;

// ── Run ──

pub fn print_run(output: &RunOutput, files: &WrittenFiles) {
    let r = &output.report;
    println!("=== Run ===");
    println!("  {:<26} {}", "patents read", r.patents_read);
    println!("  {:<26} {}", "malformed", r.patents_malformed);
    println!("  {:<26} {}", "duplicates", r.patents_duplicate);
    println!("  {:<26} {}", "office actions read", r.actions_read);
    println!(
        "  {:<26} ai {} / control {} / excluded {}",
        "classified", r.classified_ai, r.classified_control, r.classified_excluded
    );
    println!(
        "  {:<26} rejected {} / not rejected {} / unknown {}",
        "documents scanned", r.documents_rejected, r.documents_not_rejected, r.documents_unknown
    );
    println!("  {:<26} {} ({} unresolved)", "firms", r.firms, r.firms_unresolved);
    println!("  {:<26} {}", "panel rows", r.panel_rows);
    println!();

    let counts = output.audit.counts_by_kind();
    if !counts.is_empty() {
        println!("Audit");
        for (kind, n) in counts {
            println!("  {:<26} {n}", kind.as_str());
        }
        println!();
    }

    println!("Files");
    for path in [&files.panel, &files.decisions, &files.firms, &files.audit] {
        println!("  {}", path.display());
    }
}

// ── Single-record commands ──

pub fn print_decisions(decisions: &[(String, Decision)]) {
    println!("{:<16} {:<10} {:<24} evidence", "application", "group", "rule");
    for (id, d) in decisions {
        println!(
            "{:<16} {:<10} {:<24} {}",
            id,
            d.group.as_str(),
            d.rule.as_str(),
            d.evidence.as_deref().unwrap_or("-")
        );
    }
}

pub fn print_extraction(extraction: &Extraction) {
    println!("  {:<12} {}", "signal", extraction.signal);
    if let Some(pattern) = extraction.pattern {
        println!("  {:<12} {}", "pattern", pattern.as_str());
    }
    if let Some(evidence) = &extraction.evidence {
        println!("  {:<12} {evidence}", "evidence");
    }
    if let Some(cause) = extraction.cause {
        println!("  {:<12} {}", "cause", cause.as_str());
    }
}

pub fn print_resolutions(resolutions: &[(String, Resolution)]) {
    for (raw, r) in resolutions {
        let canonical = if r.canonical_name.is_empty() { "-" } else { r.canonical_name.as_str() };
        println!("{:<18} {:<32} {raw}", r.firm_id.as_str(), canonical);
    }
}

// ── Summary ──

/// Totals of one group across every firm-quarter.
#[derive(Debug, Default, PartialEq, Eq)]
struct GroupTotals {
    rows: usize,
    firms: usize,
    applications: u64,
    rejections: u64,
}

fn group_totals(rows: &[PanelRow]) -> BTreeMap<Group, GroupTotals> {
    let mut firms: BTreeMap<Group, BTreeSet<&str>> = BTreeMap::new();
    let mut out: BTreeMap<Group, GroupTotals> = BTreeMap::new();
    for row in rows {
        let t = out.entry(row.group).or_default();
        t.rows += 1;
        t.applications += row.application_count;
        t.rejections += row.rejection_count;
        firms.entry(row.group).or_default().insert(row.firm_id.as_str());
    }
    for (group, set) in firms {
        if let Some(t) = out.get_mut(&group) {
            t.firms = set.len();
        }
    }
    out
}

/// Print group totals followed by the panel table itself.
pub fn print_panel_summary(batches: &[RecordBatch], rows: &[PanelRow]) -> anyhow::Result<()> {
    let periods: BTreeSet<_> = rows.iter().map(PanelRow::period).collect();
    println!("=== Panel ===");
    if let (Some(first), Some(last)) = (periods.first(), periods.last()) {
        println!("  {:<26} {first} .. {last}", "periods");
    }
    for (group, t) in group_totals(rows) {
        let rate = if t.applications == 0 {
            "-".to_string()
        } else {
            format!("{:.4}", t.rejections as f64 / t.applications as f64)
        };
        println!(
            "  {:<26} rows {} / firms {} / applications {} / rejections {} / rate {rate}",
            group.as_str(),
            t.rows,
            t.firms,
            t.applications,
            t.rejections
        );
    }
    println!();
    print_batches(batches)
}

pub fn print_batches(batches: &[RecordBatch]) -> anyhow::Result<()> {
    if batches.iter().all(|b| b.num_rows() == 0) {
        println!("(no rows)");
        return Ok(());
    }
    println!("{}", pretty_format_batches(batches)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aipanel_core::FirmId;

    fn row(firm: &str, quarter: u8, group: Group, apps: u64, rejected: u64) -> PanelRow {
        PanelRow {
            firm_id: FirmId::new(firm),
            year: 2024,
            quarter,
            group,
            application_count: apps,
            rejection_count: rejected,
            rejection_rate: (apps > 0).then(|| rejected as f64 / apps as f64),
            treated: group == Group::Ai,
            post: quarter >= 3,
        }
    }

    #[test]
    fn totals_count_distinct_firms() {
        let rows = vec![
            row("FA", 2, Group::Ai, 3, 1),
            row("FA", 3, Group::Ai, 2, 0),
            row("FB", 3, Group::Ai, 1, 1),
            row("FA", 3, Group::Control, 0, 0),
        ];
        let totals = group_totals(&rows);
        assert_eq!(
            totals[&Group::Ai],
            GroupTotals {
                rows: 3,
                firms: 2,
                applications: 6,
                rejections: 2
            }
        );
        assert_eq!(totals[&Group::Control].firms, 1);
    }
}
