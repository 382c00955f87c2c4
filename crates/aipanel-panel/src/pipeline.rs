//! End-to-end run: normalise → classify → extract → resolve → aggregate.

use std::collections::{BTreeMap, BTreeSet};

use aipanel_classify::{
    ApplicationOutcome, Classifier, Decision, Extraction, PatternId, RejectionExtractor, RuleId, UnknownCause,
    primary_outcomes,
};
use aipanel_core::{
    ConfigError, Firm, FirmId, Group, OfficeActionEvent, PanelRow, PatentRecord, PipelineConfig,
    RejectionSignal,
};
use aipanel_ingest::{RawOfficeAction, RawPatent, SourceRef, normalize, normalize_office_action};
use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::audit::{AuditKind, AuditLog, Stage, StageReport};
use crate::{AliasTable, FirmRegistry, FirmResolver, Observation, aggregate};

/// Compiled stages plus the firm memo for a single invocation.
///
/// Built fresh for every run and consumed by it; nothing is cached across
/// runs.
pub struct RunContext {
    classifier: Classifier,
    extractor: RejectionExtractor,
    resolver: FirmResolver,
    registry: FirmRegistry,
    policy_effective_date: NaiveDate,
}

impl RunContext {
    pub fn new(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let aliases = AliasTable::from_config(&config.aliases)?;
        info!(aliases = aliases.len(), "compiled alias table");
        Ok(Self {
            classifier: Classifier::from_tables(&config.classifier),
            extractor: RejectionExtractor::new(&config.extractor),
            resolver: FirmResolver::new(aliases),
            registry: FirmRegistry::default(),
            policy_effective_date: config.panel.policy_effective_date,
        })
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn extractor(&self) -> &RejectionExtractor {
        &self.extractor
    }

    pub fn resolver(&self) -> &FirmResolver {
        &self.resolver
    }

    pub fn policy_effective_date(&self) -> NaiveDate {
        self.policy_effective_date
    }
}

/// Everything traced for one normalised record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTrace {
    pub application_id: String,
    pub filing_date: NaiveDate,
    pub group: Group,
    pub rule: RuleId,
    pub evidence: Option<String>,
    pub primary_signal: Option<RejectionSignal>,
    pub extraction_pattern: Option<PatternId>,
    pub office_action_rounds: u32,
    pub any_round_rejected: bool,
    pub primary_assignee: Option<String>,
    pub firm_id: Option<FirmId>,
}

#[derive(Debug)]
pub struct RunOutput {
    /// Classified records, ordered by application id.
    pub records: Vec<PatentRecord>,
    /// One trace per record, same order.
    pub traces: Vec<RecordTrace>,
    pub firms: Vec<Firm>,
    pub panel: Vec<PanelRow>,
    pub audit: AuditLog,
    pub report: StageReport,
}

pub struct Pipeline {
    ctx: RunContext,
    audit: AuditLog,
    report: StageReport,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_context(RunContext::new(config)?))
    }

    pub fn with_context(ctx: RunContext) -> Self {
        Self {
            ctx,
            audit: AuditLog::default(),
            report: StageReport::default(),
        }
    }

    /// Run every stage over the given inputs. No record-level problem is
    /// fatal; each one lands in the audit log and the report.
    pub fn run(mut self, patents: Vec<RawPatent>, office_actions: Vec<RawOfficeAction>) -> RunOutput {
        let mut records = self.normalize_patents(patents);
        let events = self.normalize_actions(office_actions, &records);

        let decisions = self.classify(&mut records);
        let (outcomes, primary_extractions) = self.extract(&records, events);
        let firm_ids = self.resolve(&records);

        let observations: Vec<Observation> = records
            .iter()
            .zip(&firm_ids)
            .filter_map(|(r, firm)| {
                Some(Observation {
                    firm_id: firm.clone()?,
                    filing_quarter: r.filing_quarter(),
                    group: r.group(),
                    signal: outcomes.get(r.application_id()).map(|o| o.signal),
                })
            })
            .collect();
        let (panel, stats) = aggregate(&observations, self.ctx.policy_effective_date);
        self.report.aggregate = stats;
        self.report.panel_rows = panel.len() as u64;

        let traces = records
            .iter()
            .zip(decisions)
            .zip(firm_ids)
            .map(|((r, d), firm_id)| {
                let outcome = outcomes.get(r.application_id());
                RecordTrace {
                    application_id: r.application_id().to_string(),
                    filing_date: r.filing_date,
                    group: d.group,
                    rule: d.rule,
                    evidence: d.evidence,
                    primary_signal: outcome.map(|o| o.signal),
                    extraction_pattern: primary_extractions.get(r.application_id()).and_then(|e| e.pattern),
                    office_action_rounds: outcome.map_or(0, |o| o.rounds),
                    any_round_rejected: outcome.is_some_and(|o| o.any_round_rejected),
                    primary_assignee: r.primary_assignee().map(str::to_string),
                    firm_id,
                }
            })
            .collect();

        self.audit.finish();
        self.report.log();
        RunOutput {
            records,
            traces,
            firms: self.ctx.registry.into_firms(),
            panel,
            audit: self.audit,
            report: self.report,
        }
    }

    // ── Stages ──

    fn normalize_patents(&mut self, patents: Vec<RawPatent>) -> Vec<PatentRecord> {
        self.report.patents_read = patents.len() as u64;

        let results: Vec<_> = patents
            .into_par_iter()
            .map(|raw| {
                let source = raw.source.clone();
                (source, normalize(raw))
            })
            .collect();

        let mut ok: Vec<(SourceRef, PatentRecord)> = Vec::with_capacity(results.len());
        for (source, result) in results {
            match result {
                Ok(n) => {
                    for code in n.dropped_cpc {
                        self.report.cpc_dropped += 1;
                        self.audit.record(
                            n.record.application_id(),
                            Stage::Normalize,
                            AuditKind::DroppedCpc,
                            Some(code),
                        );
                    }
                    ok.push((source, n.record));
                }
                Err(e) => {
                    warn!(error = %e, "skipping malformed patent record");
                    self.report.patents_malformed += 1;
                    self.audit
                        .record(e.audit_key(), Stage::Normalize, AuditKind::Malformed, Some(e.to_string()));
                }
            }
        }

        // One record per application id; the earliest source position wins.
        ok.sort_by(|(sa, a), (sb, b)| a.application_id().cmp(b.application_id()).then_with(|| sa.cmp(sb)));
        let mut records: Vec<PatentRecord> = Vec::with_capacity(ok.len());
        for (source, record) in ok {
            if records
                .last()
                .is_some_and(|last| last.application_id() == record.application_id())
            {
                self.report.patents_duplicate += 1;
                self.audit.record(
                    record.application_id(),
                    Stage::Normalize,
                    AuditKind::Duplicate,
                    Some(source.to_string()),
                );
                continue;
            }
            records.push(record);
        }
        records
    }

    fn normalize_actions(&mut self, actions: Vec<RawOfficeAction>, records: &[PatentRecord]) -> Vec<OfficeActionEvent> {
        self.report.actions_read = actions.len() as u64;
        let known: BTreeSet<&str> = records.iter().map(PatentRecord::application_id).collect();

        let results: Vec<_> = actions.into_par_iter().map(normalize_office_action).collect();
        let mut events = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(event) if known.contains(event.application_id.as_str()) => events.push(event),
                Ok(event) => {
                    self.report.actions_orphaned += 1;
                    self.audit.record(
                        event.application_id,
                        Stage::Normalize,
                        AuditKind::OrphanOfficeAction,
                        Some(event.action_date.to_string()),
                    );
                }
                Err(e) => {
                    warn!(error = %e, "skipping malformed office action");
                    self.report.actions_malformed += 1;
                    self.audit
                        .record(e.audit_key(), Stage::Normalize, AuditKind::Malformed, Some(e.to_string()));
                }
            }
        }
        events
    }

    fn classify(&mut self, records: &mut [PatentRecord]) -> Vec<Decision> {
        let decisions = self.ctx.classifier.classify_batch(records);
        for (record, decision) in records.iter_mut().zip(&decisions) {
            if let Err(e) = record.set_group(decision.group) {
                warn!(error = %e, "group already assigned");
            }
            match decision.group {
                Group::Ai => self.report.classified_ai += 1,
                Group::Control => self.report.classified_control += 1,
                _ => {
                    self.report.classified_excluded += 1;
                    self.audit.record(
                        record.application_id(),
                        Stage::Classify,
                        AuditKind::Excluded,
                        Some(decision.rule.as_str().to_string()),
                    );
                }
            }
        }
        decisions
    }

    /// Scan office actions of panel-eligible records and pick each
    /// application's primary round.
    fn extract(
        &mut self,
        records: &[PatentRecord],
        events: Vec<OfficeActionEvent>,
    ) -> (BTreeMap<String, ApplicationOutcome>, BTreeMap<String, Extraction>) {
        let eligible: BTreeSet<&str> = records
            .iter()
            .filter(|r| r.group().enters_panel())
            .map(PatentRecord::application_id)
            .collect();
        let mut events: Vec<OfficeActionEvent> = events
            .into_iter()
            .filter(|e| eligible.contains(e.application_id.as_str()))
            .collect();

        let extractions = self.ctx.extractor.extract_batch(&events);
        for (event, extraction) in events.iter_mut().zip(&extractions) {
            self.report.documents_scanned += 1;
            match extraction.signal {
                RejectionSignal::Rejected => self.report.documents_rejected += 1,
                RejectionSignal::NotRejected => self.report.documents_not_rejected += 1,
                RejectionSignal::Unknown => self.report.documents_unknown += 1,
            }
            if extraction.cause == Some(UnknownCause::Ambiguous) {
                self.audit.record(
                    event.application_id.as_str(),
                    Stage::Extract,
                    AuditKind::AmbiguousRejection,
                    Some(round_label(event)),
                );
            }
            if let Err(e) = event.set_signal(extraction.signal) {
                warn!(error = %e, "rejection signal already set");
            }
        }

        let outcomes = primary_outcomes(&events);
        let mut primary_extractions = BTreeMap::new();
        for (application_id, outcome) in &outcomes {
            let extraction = &extractions[outcome.primary];
            if outcome.signal == RejectionSignal::Unknown {
                self.audit.record(
                    application_id.as_str(),
                    Stage::Extract,
                    AuditKind::UnknownOutcome,
                    extraction.cause.map(|c| c.as_str().to_string()),
                );
            }
            primary_extractions.insert(application_id.clone(), extraction.clone());
        }

        for id in eligible {
            if !outcomes.contains_key(id) {
                self.audit.record(id, Stage::Extract, AuditKind::NoOfficeAction, None);
            }
        }

        (outcomes, primary_extractions)
    }

    /// Resolve the primary assignee of every panel-eligible record.
    /// Excluded records get `None`.
    fn resolve(&mut self, records: &[PatentRecord]) -> Vec<Option<FirmId>> {
        let ids: Vec<Option<FirmId>> = records
            .iter()
            .map(|r| {
                if !r.group().enters_panel() {
                    return None;
                }
                let name = r.primary_assignee().unwrap_or("");
                let id = self.ctx.registry.resolve(&self.ctx.resolver, name);
                if id.is_unknown() {
                    self.report.firms_unresolved += 1;
                    self.audit.record(
                        r.application_id(),
                        Stage::Resolve,
                        AuditKind::UnresolvedFirm,
                        r.primary_assignee().map(str::to_string),
                    );
                }
                Some(id)
            })
            .collect();
        self.report.firms = self.ctx.registry.len() as u64;
        ids
    }
}

fn round_label(event: &OfficeActionEvent) -> String {
    match &event.document_id {
        Some(doc) => format!("{} {doc}", event.action_date),
        None => event.action_date.to_string(),
    }
}
