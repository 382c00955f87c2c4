//! Ordered rule engine assigning each patent record to a study group.
//!
//! Rules are evaluated in a fixed sequence and the first match wins. CPC
//! evidence is checked before free text; the terminal rule always matches,
//! so classification is total and never ambiguous.

use aipanel_core::config::normalize_keyword;
use aipanel_core::cpc::first_match;
use aipanel_core::{ClassifierTables, CpcPrefix, Group, PatentRecord};
use rayon::prelude::*;
use tracing::debug;

/// Identity of the rule that decided a record, for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleId {
    MissingAbstract,
    ForcedControlCpc,
    ExcludedCpc,
    AiCpc,
    AdjacentCpcKeyword,
    ControlCpc,
    AiKeyword,
    Fallthrough,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingAbstract => "missing_abstract",
            Self::ForcedControlCpc => "forced_control_cpc",
            Self::ExcludedCpc => "excluded_cpc",
            Self::AiCpc => "ai_cpc",
            Self::AdjacentCpcKeyword => "adjacent_cpc_keyword",
            Self::ControlCpc => "control_cpc",
            Self::AiKeyword => "ai_keyword",
            Self::Fallthrough => "fallthrough",
        }
    }
}

/// Result of classifying one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub group: Group,
    pub rule: RuleId,
    /// The CPC code or keyword that fired, when the rule has one.
    pub evidence: Option<String>,
}

enum Predicate {
    EmptyAbstract,
    AnyCpc(Vec<CpcPrefix>),
    Keyword {
        keywords: Vec<String>,
        exclusions: Vec<String>,
    },
    CpcAndKeyword {
        prefixes: Vec<CpcPrefix>,
        keywords: Vec<String>,
    },
    Always,
}

/// A predicate match. The inner value is the evidence, if any.
struct Hit(Option<String>);

impl Predicate {
    fn evaluate(&self, record: &PatentRecord, text: &str) -> Option<Hit> {
        match self {
            Self::EmptyAbstract => record.abstract_text.trim().is_empty().then_some(Hit(None)),
            Self::AnyCpc(prefixes) => {
                first_match(prefixes, &record.cpc_codes).map(|code| Hit(Some(code.to_string())))
            }
            Self::Keyword {
                keywords,
                exclusions,
            } => {
                if exclusions.iter().any(|x| text.contains(x.as_str())) {
                    return None;
                }
                first_keyword(keywords, text).map(|k| Hit(Some(k.to_string())))
            }
            Self::CpcAndKeyword { prefixes, keywords } => {
                let code = first_match(prefixes, &record.cpc_codes)?;
                let keyword = first_keyword(keywords, text)?;
                Some(Hit(Some(format!("{code}+{keyword}"))))
            }
            Self::Always => Some(Hit(None)),
        }
    }
}

fn first_keyword<'a>(keywords: &'a [String], text: &str) -> Option<&'a str> {
    keywords
        .iter()
        .map(String::as_str)
        .find(|k| text.contains(k))
}

struct Rule {
    id: RuleId,
    predicate: Predicate,
    group: Group,
}

/// Compiled rule list.
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    /// Build the rule list from configuration tables.
    ///
    /// Rules whose table is empty (or whose flag is off) are left out, so
    /// a config with only the AI, control and keyword tables yields exactly
    /// `AiCpc`, `ControlCpc`, `AiKeyword`, `Fallthrough`.
    pub fn from_tables(tables: &ClassifierTables) -> Self {
        let mut rules = Vec::new();

        if tables.require_abstract {
            rules.push(Rule {
                id: RuleId::MissingAbstract,
                predicate: Predicate::EmptyAbstract,
                group: Group::Excluded,
            });
        }
        if !tables.forced_control_cpc_prefixes.is_empty() {
            rules.push(Rule {
                id: RuleId::ForcedControlCpc,
                predicate: Predicate::AnyCpc(tables.forced_control_cpc_prefixes.clone()),
                group: Group::Control,
            });
        }
        if !tables.excluded_cpc_prefixes.is_empty() {
            rules.push(Rule {
                id: RuleId::ExcludedCpc,
                predicate: Predicate::AnyCpc(tables.excluded_cpc_prefixes.clone()),
                group: Group::Excluded,
            });
        }
        rules.push(Rule {
            id: RuleId::AiCpc,
            predicate: Predicate::AnyCpc(tables.ai_cpc_prefixes.clone()),
            group: Group::Ai,
        });
        if !tables.adjacent_cpc_prefixes.is_empty() {
            rules.push(Rule {
                id: RuleId::AdjacentCpcKeyword,
                predicate: Predicate::CpcAndKeyword {
                    prefixes: tables.adjacent_cpc_prefixes.clone(),
                    keywords: tables.ai_keywords.clone(),
                },
                group: Group::Ai,
            });
        }
        rules.push(Rule {
            id: RuleId::ControlCpc,
            predicate: Predicate::AnyCpc(tables.control_cpc_prefixes.clone()),
            group: Group::Control,
        });
        if tables.keyword_fallback {
            rules.push(Rule {
                id: RuleId::AiKeyword,
                predicate: Predicate::Keyword {
                    keywords: tables.ai_keywords.clone(),
                    exclusions: tables.exclusion_keywords.clone(),
                },
                group: Group::Ai,
            });
        }
        rules.push(Rule {
            id: RuleId::Fallthrough,
            predicate: Predicate::Always,
            group: Group::Excluded,
        });

        Self { rules }
    }

    /// Rule identifiers in evaluation order.
    pub fn rule_order(&self) -> Vec<RuleId> {
        self.rules.iter().map(|r| r.id).collect()
    }

    /// Classify one record. Does not mutate it; the caller stores the group
    /// with [`PatentRecord::set_group`].
    pub fn classify(&self, record: &PatentRecord) -> Decision {
        let text = normalize_keyword(&format!("{} {}", record.title, record.abstract_text));

        for rule in &self.rules {
            if let Some(Hit(evidence)) = rule.predicate.evaluate(record, &text) {
                debug!(
                    application_id = record.application_id(),
                    rule = rule.id.as_str(),
                    group = rule.group.as_str(),
                    "classified"
                );
                return Decision {
                    group: rule.group,
                    rule: rule.id,
                    evidence,
                };
            }
        }

        // The list always ends with `Always`; this is only reached for an
        // engine built by hand without it.
        Decision {
            group: Group::Excluded,
            rule: RuleId::Fallthrough,
            evidence: None,
        }
    }

    /// Classify a batch in parallel. Output order matches input order.
    pub fn classify_batch(&self, records: &[PatentRecord]) -> Vec<Decision> {
        records.par_iter().map(|r| self.classify(r)).collect()
    }
}
