use aipanel_core::{Group, PipelineConfig, RejectionSignal};
use aipanel_ingest::{RawOfficeAction, RawPatent, SourceRef};
use aipanel_panel::{AuditKind, Pipeline, RunOutput};

const CONFIG: &str = r#"
[classifier]
ai_cpc_prefixes = ["G06N*", "G06V10/82"]
control_cpc_prefixes = ["G06F9", "G06F16", "H04L29"]
ai_keywords = ["machine learning", "neural network"]
exclusion_keywords = ["neural tube"]

[panel]
policy_effective_date = "2024-07-17"

[aliases]
"Facebook" = "Meta Platforms"
"#;

const REJECTION: &str = "Claims 1-20 are rejected under 35 U.S.C. § 101 as directed to an abstract idea.";
const ALLOWANCE: &str = "The claims are allowed. Reasons for allowance follow below in this notice.";

fn config() -> PipelineConfig {
    PipelineConfig::from_toml_str(CONFIG).unwrap()
}

fn patent(ordinal: usize, id: &str, date: &str, cpc: &[&str], assignee: &str) -> RawPatent {
    RawPatent {
        application_id: Some(id.into()),
        filing_date: Some(date.into()),
        cpc: cpc.iter().map(|c| c.to_string()).collect(),
        title: Some("Widget".into()),
        abstract_text: Some("A widget.".into()),
        assignees: if assignee.is_empty() { vec![] } else { vec![assignee.into()] },
        source: SourceRef::new("grants.jsonl", ordinal),
        unreadable: None,
    }
}

fn action(ordinal: usize, id: &str, date: &str, text: &str) -> RawOfficeAction {
    RawOfficeAction {
        application_id: Some(id.into()),
        action_date: Some(date.into()),
        document_id: None,
        raw_text: Some(text.into()),
        source: SourceRef::new("actions.jsonl", ordinal),
        unreadable: None,
    }
}

fn inputs() -> (Vec<RawPatent>, Vec<RawOfficeAction>) {
    let patents = vec![
        patent(1, "100", "2024-04-02", &["G06N 3/08"], "X Corp."),
        patent(2, "101", "20240515", &["G06N20/00", "H04L29/06"], "X Corporation"),
        patent(3, "102", "2024-06-30", &["G06V10/82"], "x corp"),
        patent(4, "200", "2024-08-01", &["G06F16/245"], "Facebook, Inc."),
        patent(5, "201", "2024-08-02", &["G06F9/445"], "Meta Platforms Inc"),
        patent(6, "300", "2024-08-03", &["B65D1/00"], "Box Co"),
        patent(7, "400", "2024-09-01", &["G06N3"], ""),
        RawPatent {
            application_id: None,
            filing_date: Some("20240101".into()),
            source: SourceRef::new("grants.jsonl", 8),
            ..Default::default()
        },
        patent(9, "500", "2024/01/01", &["G06N3"], "Bad Date LLC"),
    ];
    let actions = vec![
        action(1, "100", "2024-10-01", REJECTION),
        action(2, "101", "2024-10-02", ALLOWANCE),
        action(3, "102", "2024-10-03", ALLOWANCE),
        // Later round for 102; the primary stays the allowance.
        action(4, "102", "2025-01-03", REJECTION),
        action(5, "200", "2024-11-01", ""),
        action(6, "201", "2024-11-02", REJECTION),
        action(7, "999", "2024-11-03", REJECTION),
    ];
    (patents, actions)
}

fn run() -> RunOutput {
    let (patents, actions) = inputs();
    Pipeline::new(&config()).unwrap().run(patents, actions)
}

#[test]
fn firm_with_three_ai_filings_and_one_rejection() {
    let out = run();
    let ai: Vec<_> = out.panel.iter().filter(|r| r.group == Group::Ai).collect();
    assert_eq!(ai.len(), 1);
    let row = ai[0];
    assert_eq!((row.year, row.quarter), (2024, 2));
    assert_eq!(row.application_count, 3);
    assert_eq!(row.rejection_count, 1);
    assert!((row.rejection_rate.unwrap() - 1.0 / 3.0).abs() < 1e-12);
    assert!(row.treated);
    assert!(!row.post);
}

#[test]
fn aliases_merge_and_unknown_outcomes_drop_out() {
    let out = run();
    let control: Vec<_> = out.panel.iter().filter(|r| r.group == Group::Control).collect();
    // 200 (Facebook) and 201 (Meta) share one firm; 200's only action is empty.
    assert_eq!(control.len(), 1);
    assert_eq!(control[0].application_count, 1);
    assert_eq!(control[0].rejection_count, 1);
    assert!(control[0].post);
    assert!(!control[0].treated);
    assert_eq!(out.audit.count(AuditKind::UnknownOutcome), 1);
}

#[test]
fn every_skip_is_audited() {
    let out = run();
    assert_eq!(out.report.patents_read, 9);
    assert_eq!(out.report.patents_malformed, 2);
    assert_eq!(out.audit.count(AuditKind::Malformed), 2);
    assert!(out.audit.for_application("grants.jsonl#8").any(|e| e.kind == AuditKind::Malformed));
    assert!(out.audit.for_application("500").any(|e| e.kind == AuditKind::Malformed));

    assert_eq!(out.audit.count(AuditKind::Excluded), 1);
    assert_eq!(out.audit.count(AuditKind::OrphanOfficeAction), 1);
    assert_eq!(out.audit.count(AuditKind::UnresolvedFirm), 1);
    assert!(out.audit.for_application("400").any(|e| e.kind == AuditKind::NoOfficeAction));

    let entries = out.audit.entries();
    assert!(entries.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn traces_cover_every_normalised_record() {
    let out = run();
    assert_eq!(out.traces.len(), 7);
    assert_eq!(out.records.len(), 7);

    let t101 = out.traces.iter().find(|t| t.application_id == "101").unwrap();
    assert_eq!(t101.group, Group::Ai);
    assert_eq!(t101.evidence.as_deref(), Some("G06N20/00"));
    assert_eq!(t101.primary_signal, Some(RejectionSignal::NotRejected));

    let t102 = out.traces.iter().find(|t| t.application_id == "102").unwrap();
    assert_eq!(t102.office_action_rounds, 2);
    assert!(t102.any_round_rejected);
    assert_eq!(t102.primary_signal, Some(RejectionSignal::NotRejected));

    let t300 = out.traces.iter().find(|t| t.application_id == "300").unwrap();
    assert_eq!(t300.group, Group::Excluded);
    assert_eq!(t300.firm_id, None);

    assert!(out.records.iter().all(|r| r.group() != Group::Unclassified));
}

#[test]
fn firms_list_merged_aliases() {
    let out = run();
    let meta = out
        .firms
        .iter()
        .find(|f| f.canonical_name == "META PLATFORMS")
        .unwrap();
    assert!(meta.alias_names.contains("Facebook, Inc."));
    assert!(meta.alias_names.contains("Meta Platforms Inc"));
    let x = out.firms.iter().find(|f| f.canonical_name == "X").unwrap();
    assert_eq!(x.alias_names.len(), 3);
}

#[test]
fn duplicate_ids_keep_the_first_source() {
    let (mut patents, actions) = inputs();
    let mut dup = patent(10, "100", "2024-04-02", &["G06F16"], "Other Corp");
    dup.title = Some("Duplicate".into());
    patents.insert(0, dup);
    let out = Pipeline::new(&config()).unwrap().run(patents, actions);
    assert_eq!(out.report.patents_duplicate, 1);
    let r = out.records.iter().find(|r| r.application_id() == "100").unwrap();
    assert_eq!(r.title, "Widget");
}

#[test]
fn reruns_and_shuffles_are_identical() {
    let first = run();
    let second = run();
    assert_eq!(first.panel, second.panel);

    let (mut patents, mut actions) = inputs();
    patents.reverse();
    actions.reverse();
    patents.swap(0, 3);
    let shuffled = Pipeline::new(&config()).unwrap().run(patents, actions);
    assert_eq!(first.panel, shuffled.panel);
    assert_eq!(first.traces, shuffled.traces);
    assert_eq!(first.firms, shuffled.firms);
    assert_eq!(first.audit, shuffled.audit);
}
