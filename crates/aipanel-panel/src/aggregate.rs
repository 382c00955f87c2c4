//! Firm × quarter × group aggregation.
//!
//! Partial counts are built per rayon shard and merged by summation, so the
//! result is independent of input order and thread count. Empty quarters are
//! not synthesised; the panel is unbalanced.

use std::collections::BTreeMap;

use aipanel_core::{FirmId, Group, PanelRow, Quarter, RejectionSignal};
use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::info;

/// One classified, resolved record ready for bucketing.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub firm_id: FirmId,
    pub filing_quarter: Quarter,
    pub group: Group,
    /// Primary-round outcome; `None` when the application has no office action.
    pub signal: Option<RejectionSignal>,
}

type BucketKey = (FirmId, i32, u8, Group);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    applications: u64,
    rejections: u64,
}

/// Records that did not reach a panel count, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub counted: u64,
    pub excluded_group: u64,
    pub unresolved_firm: u64,
    pub unknown_outcome: u64,
    pub no_office_action: u64,
}

impl AggregateStats {
    fn merge(mut self, other: Self) -> Self {
        self.counted += other.counted;
        self.excluded_group += other.excluded_group;
        self.unresolved_firm += other.unresolved_firm;
        self.unknown_outcome += other.unknown_outcome;
        self.no_office_action += other.no_office_action;
        self
    }
}

#[derive(Default)]
struct Partial {
    buckets: BTreeMap<BucketKey, Counts>,
    stats: AggregateStats,
}

impl Partial {
    fn add(mut self, obs: &Observation) -> Self {
        if !obs.group.enters_panel() {
            self.stats.excluded_group += 1;
            return self;
        }
        if obs.firm_id.is_unknown() {
            self.stats.unresolved_firm += 1;
            return self;
        }

        let key = (
            obs.firm_id.clone(),
            obs.filing_quarter.year,
            obs.filing_quarter.quarter,
            obs.group,
        );
        let counts = self.buckets.entry(key).or_default();
        match obs.signal {
            Some(RejectionSignal::Rejected) => {
                counts.applications += 1;
                counts.rejections += 1;
                self.stats.counted += 1;
            }
            Some(RejectionSignal::NotRejected) => {
                counts.applications += 1;
                self.stats.counted += 1;
            }
            Some(RejectionSignal::Unknown) => self.stats.unknown_outcome += 1,
            None => self.stats.no_office_action += 1,
        }
        self
    }

    fn merge(mut self, other: Self) -> Self {
        for (key, c) in other.buckets {
            let counts = self.buckets.entry(key).or_default();
            counts.applications += c.applications;
            counts.rejections += c.rejections;
        }
        self.stats = self.stats.merge(other.stats);
        self
    }
}

/// Build the panel. Rows come out sorted by `(firm_id, year, quarter, group)`.
///
/// `post` compares each row's filing quarter with the quarter containing
/// `policy_effective_date`.
pub fn aggregate(observations: &[Observation], policy_effective_date: NaiveDate) -> (Vec<PanelRow>, AggregateStats) {
    let policy_quarter = Quarter::of(policy_effective_date);

    let Partial { buckets, stats } = observations
        .par_iter()
        .fold(Partial::default, Partial::add)
        .reduce(Partial::default, Partial::merge);

    let rows: Vec<PanelRow> = buckets
        .into_iter()
        .map(|((firm_id, year, quarter, group), c)| {
            let period = Quarter { year, quarter };
            PanelRow {
                firm_id,
                year,
                quarter,
                group,
                application_count: c.applications,
                rejection_count: c.rejections,
                rejection_rate: (c.applications > 0).then(|| c.rejections as f64 / c.applications as f64),
                treated: group == Group::Ai,
                post: period >= policy_quarter,
            }
        })
        .collect();

    info!(
        rows = rows.len(),
        counted = stats.counted,
        unknown_outcome = stats.unknown_outcome,
        no_office_action = stats.no_office_action,
        unresolved_firm = stats.unresolved_firm,
        "aggregated panel"
    );
    (rows, stats)
}
