//! Subject-matter-eligibility (35 U.S.C. § 101) rejection extraction from
//! office-action text.
//!
//! The extractor is conservative: a document without a § 101 citation is
//! never `Rejected`, and empty, garbled or self-contradicting documents are
//! `Unknown` rather than `NotRejected`.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::LazyLock;

use aipanel_core::{ExtractorOptions, OfficeActionEvent, RejectionSignal};
use chrono::NaiveDate;
use rayon::prelude::*;
use regex::Regex;
use tracing::debug;

// ── Patterns ──

/// Section-number list following a statute marker: `101`, `101 and 103`,
/// `102(a)(1), 103`.
const SECTION_LIST: &str =
    r"(?P<nums>\d+[a-z]?(?:\([a-z0-9]+\))*(?:\s*(?:,|&|\band\b|\bor\b)\s*\d+[a-z]?(?:\([a-z0-9]+\))*)*)";

static USC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b35\s*u\.?\s*s\.?\s*c\.?\s*(?:§+\s*)?{SECTION_LIST}")).unwrap()
});
static SECTION_SYMBOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)§§?\s*{SECTION_LIST}")).unwrap());
static SECTION_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)\b(?:sec\.|section)\s*{SECTION_LIST}")).unwrap());
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

static WITHDRAWAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:withdrawn|overcome|no longer|not rejected|moot)\b").unwrap());
static REJECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\breject(?:s|ed|ing|ion|ions)?\b").unwrap());
/// Verb forms only; "the rejection ... is withdrawn" names the noun.
static ACTIVE_REJECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\breject(?:s|ed|ing)?\b").unwrap());
/// Sentence end (a period followed by a capitalised word or `§`) or a
/// semicolon. Periods inside `U.S.C. 101` or `sec. 101` are not followed by
/// a capital.
static CLAUSE_END_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]\s+[A-Z§]|;").unwrap());

/// Which citation form matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PatternId {
    /// `35 U.S.C. 101`, `35 USC § 101`
    StatuteCitation,
    /// `§ 101`, `§§ 101 and 103`
    SectionSymbol,
    /// `section 101`, `sec. 101`
    SectionWord,
}

impl PatternId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatuteCitation => "statute_citation",
            Self::SectionSymbol => "section_symbol",
            Self::SectionWord => "section_word",
        }
    }

    fn regex(&self) -> &'static Regex {
        match self {
            Self::StatuteCitation => &USC_RE,
            Self::SectionSymbol => &SECTION_SYMBOL_RE,
            Self::SectionWord => &SECTION_WORD_RE,
        }
    }
}

/// Evaluation order; a later pattern never claims text an earlier one
/// already matched.
const PATTERNS: [PatternId; 3] = [
    PatternId::StatuteCitation,
    PatternId::SectionSymbol,
    PatternId::SectionWord,
];

/// Why a document yielded `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownCause {
    Empty,
    Garbled,
    /// Both a rejection and a withdrawal cue near § 101 citations.
    Ambiguous,
}

impl UnknownCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Garbled => "garbled",
            Self::Ambiguous => "ambiguous",
        }
    }
}

/// Result of scanning one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub signal: RejectionSignal,
    /// Set only when `signal` is `Unknown`.
    pub cause: Option<UnknownCause>,
    /// Citation form behind a `Rejected` (or ambiguous) result.
    pub pattern: Option<PatternId>,
    /// Matched citation text.
    pub evidence: Option<String>,
}

impl Extraction {
    fn unknown(cause: UnknownCause) -> Self {
        Self {
            signal: RejectionSignal::Unknown,
            cause: Some(cause),
            pattern: None,
            evidence: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CitationRole {
    Rejection,
    Withdrawal,
    /// Rejection verb and withdrawal cue in the same clause.
    Conflicting,
    Neutral,
}

struct Citation {
    pattern: PatternId,
    span: Range<usize>,
}

/// Compiled extractor with run options.
#[derive(Debug, Clone)]
pub struct RejectionExtractor {
    options: ExtractorOptions,
}

impl RejectionExtractor {
    pub fn new(options: &ExtractorOptions) -> Self {
        Self {
            options: *options,
        }
    }

    pub fn extract(&self, text: &str) -> Extraction {
        if text.trim().is_empty() {
            return Extraction::unknown(UnknownCause::Empty);
        }
        if self.is_garbled(text) {
            return Extraction::unknown(UnknownCause::Garbled);
        }

        let tokens = token_spans(text);
        let citations = section_101_citations(text);
        let mut rejection: Option<&Citation> = None;
        let mut withdrawal: Option<&Citation> = None;
        let mut conflict: Option<&Citation> = None;
        for citation in &citations {
            match self.role(text, &tokens, &citation.span) {
                CitationRole::Rejection => {
                    rejection.get_or_insert(citation);
                }
                CitationRole::Withdrawal => {
                    withdrawal.get_or_insert(citation);
                }
                CitationRole::Conflicting => {
                    conflict.get_or_insert(citation);
                }
                CitationRole::Neutral => {}
            }
        }

        let evidence = |c: &Citation| Some(text[c.span.clone()].to_string());
        if let Some(c) = conflict.or(rejection.filter(|_| withdrawal.is_some())) {
            return Extraction {
                pattern: Some(c.pattern),
                evidence: evidence(c),
                ..Extraction::unknown(UnknownCause::Ambiguous)
            };
        }
        match (rejection, withdrawal) {
            (Some(r), _) => Extraction {
                signal: RejectionSignal::Rejected,
                cause: None,
                pattern: Some(r.pattern),
                evidence: evidence(r),
            },
            (None, w) => Extraction {
                signal: RejectionSignal::NotRejected,
                cause: None,
                pattern: None,
                evidence: w.and_then(evidence),
            },
        }
    }

    /// Extract every event's text in parallel. Output order matches input.
    pub fn extract_batch(&self, events: &[OfficeActionEvent]) -> Vec<Extraction> {
        events.par_iter().map(|e| self.extract(&e.raw_text)).collect()
    }

    fn is_garbled(&self, text: &str) -> bool {
        let total = text.chars().count();
        let replacement = text.chars().filter(|&c| c == '\u{FFFD}').count();
        if replacement * 100 > total {
            return true;
        }

        let visible = text.chars().filter(|c| !c.is_whitespace()).count();
        let alpha = text.chars().filter(|c| c.is_alphabetic()).count();
        if visible == 0 || (alpha as f64) / (visible as f64) < self.options.min_alpha_ratio {
            return true;
        }

        let words = text
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|t| !t.is_empty() && t.chars().all(char::is_alphabetic))
            .count();
        words < self.options.min_words
    }

    /// Classify one citation by the cues in its token window, clipped to
    /// the clause that contains the citation.
    fn role(&self, text: &str, tokens: &[Range<usize>], span: &Range<usize>) -> CitationRole {
        let first = tokens.partition_point(|t| t.end <= span.start);
        let last = tokens.partition_point(|t| t.start < span.end).max(first + 1);
        let lo = first.saturating_sub(self.options.window_tokens);
        let hi = (last + self.options.window_tokens).min(tokens.len());
        if lo >= hi {
            return CitationRole::Neutral;
        }

        let clause = clause_bounds(text, span);
        let start = tokens[lo].start.max(clause.start);
        let end = tokens[hi - 1].end.min(clause.end);
        if start >= end {
            return CitationRole::Neutral;
        }
        let window = text[start..end]
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ");

        if WITHDRAWAL_RE.is_match(&window) {
            // "not rejected" is itself a withdrawal cue.
            let rest = WITHDRAWAL_RE.replace_all(&window, " ");
            if ACTIVE_REJECTION_RE.is_match(&rest) {
                CitationRole::Conflicting
            } else {
                CitationRole::Withdrawal
            }
        } else if REJECTION_RE.is_match(&window) {
            CitationRole::Rejection
        } else {
            CitationRole::Neutral
        }
    }
}

/// Byte range of the sentence or `;`-clause holding `span`.
fn clause_bounds(text: &str, span: &Range<usize>) -> Range<usize> {
    // Include the citation's first character so a sentence that opens with
    // the citation still ends the previous one.
    let head = span.start + text[span.start..].chars().next().map_or(0, char::len_utf8);
    let start = CLAUSE_END_RE
        .find_iter(&text[..head])
        .last()
        .map_or(0, |m| m.start() + 1);
    let end = CLAUSE_END_RE
        .find(&text[span.end..])
        .map_or(text.len(), |m| span.end + m.start());
    start..end
}

/// Byte ranges of whitespace-separated tokens.
fn token_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push(s..i);
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(s..text.len());
    }
    spans
}

/// Non-overlapping citations whose section list names § 101, in text order.
fn section_101_citations(text: &str) -> Vec<Citation> {
    let mut found: Vec<Citation> = Vec::new();
    for pattern in PATTERNS {
        for caps in pattern.regex().captures_iter(text) {
            let (Some(whole), Some(nums)) = (caps.get(0), caps.name("nums")) else {
                continue;
            };
            let span = whole.range();
            if found
                .iter()
                .any(|c| c.span.start < span.end && span.start < c.span.end)
            {
                continue;
            }
            if NUMBER_RE.find_iter(nums.as_str()).any(|n| n.as_str() == "101") {
                found.push(Citation { pattern, span });
            }
        }
    }
    found.sort_by_key(|c| c.span.start);
    found
}

// ── Round selection ──

/// Primary (first-round) outcome of one application.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationOutcome {
    /// Index of the primary event in the input slice.
    pub primary: usize,
    pub action_date: NaiveDate,
    pub signal: RejectionSignal,
    pub rounds: u32,
    /// Whether any round, not only the first, was a rejection.
    pub any_round_rejected: bool,
}

/// Pick the earliest event per application.
///
/// Ties on `action_date` break on document id, then text, so the choice
/// does not depend on input order. Events whose signal has not been set
/// count as `Unknown`.
pub fn primary_outcomes(events: &[OfficeActionEvent]) -> BTreeMap<String, ApplicationOutcome> {
    let mut out: BTreeMap<String, ApplicationOutcome> = BTreeMap::new();

    for (i, event) in events.iter().enumerate() {
        let signal = event.signal().unwrap_or(RejectionSignal::Unknown);
        let rejected = signal == RejectionSignal::Rejected;

        match out.get_mut(&event.application_id) {
            None => {
                out.insert(
                    event.application_id.clone(),
                    ApplicationOutcome {
                        primary: i,
                        action_date: event.action_date,
                        signal,
                        rounds: 1,
                        any_round_rejected: rejected,
                    },
                );
            }
            Some(current) => {
                current.rounds += 1;
                current.any_round_rejected |= rejected;
                if event.round_key() < events[current.primary].round_key() {
                    current.primary = i;
                    current.action_date = event.action_date;
                    current.signal = signal;
                }
            }
        }
    }

    debug!(applications = out.len(), events = events.len(), "selected primary rounds");
    out
}
