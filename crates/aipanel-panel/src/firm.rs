//! Assignee name normalisation and firm identity.

use std::collections::{BTreeMap, BTreeSet};

use aipanel_core::{ConfigError, Firm, FirmId};
use tracing::debug;

/// Trailing corporate-form tokens, longest first so multi-token forms win.
const SUFFIXES: &[&[&str]] = &[
    &["KABUSHIKI", "KAISHA"],
    &["CO", "LTD"],
    &["INCORPORATED"],
    &["CORPORATION"],
    &["COMPANY"],
    &["LIMITED"],
    &["GMBH"],
    &["CORP"],
    &["INC"],
    &["LLC"],
    &["LLP"],
    &["LTD"],
    &["PLC"],
    &["PTY"],
    &["PTE"],
    &["SPA"],
    &["SRL"],
    &["SAS"],
    &["CO"],
    &["LP"],
    &["AG"],
    &["SA"],
    &["NV"],
    &["BV"],
    &["KK"],
    &["AB"],
    &["OY"],
];

/// Canonical comparison key for a raw assignee name.
///
/// "Acme Corp." and "ACME CORPORATION" both become `ACME`. Returns an
/// empty string when nothing but punctuation was given.
pub fn normalize_firm_name(raw: &str) -> String {
    let cleaned: String = raw
        .to_uppercase()
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}' | '.'))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();

    while tokens.len() > 1 && tokens[0] == "THE" {
        tokens.remove(0);
    }

    'strip: loop {
        for suffix in SUFFIXES {
            if tokens.len() > suffix.len() && tokens.ends_with(suffix) {
                tokens.truncate(tokens.len() - suffix.len());
                continue 'strip;
            }
        }
        break;
    }

    tokens.join(" ")
}

/// Stable id for a canonical key: `F` plus 16 hex characters of its digest.
pub fn firm_id_for(canonical_key: &str) -> FirmId {
    let hex = blake3::hash(canonical_key.as_bytes()).to_hex();
    FirmId::new(format!("F{}", &hex[..16]))
}

/// Alias → canonical mapping with chains collapsed to their terminal name.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    terminal: BTreeMap<String, String>,
}

impl AliasTable {
    /// Build from raw config entries. Keys and targets are normalised; an
    /// entry that normalises to nothing, conflicting targets for one key, or
    /// a cycle is a config error.
    pub fn from_config(raw: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut direct: BTreeMap<String, String> = BTreeMap::new();
        for (alias, target) in raw {
            let from = normalize_firm_name(alias);
            if from.is_empty() {
                return Err(ConfigError::EmptyAlias(alias.clone()));
            }
            let to = normalize_firm_name(target);
            if to.is_empty() {
                return Err(ConfigError::EmptyAlias(target.clone()));
            }
            if from == to {
                continue;
            }
            if let Some(existing) = direct.get(&from)
                && *existing != to
            {
                return Err(ConfigError::InvalidOption {
                    field: "aliases",
                    message: format!("{from:?} maps to both {existing:?} and {to:?}"),
                });
            }
            direct.insert(from, to);
        }

        let mut terminal = BTreeMap::new();
        for start in direct.keys() {
            let mut seen = BTreeSet::from([start.as_str()]);
            let mut current = start.as_str();
            while let Some(next) = direct.get(current) {
                if !seen.insert(next.as_str()) {
                    return Err(ConfigError::AliasCycle(start.clone()));
                }
                current = next.as_str();
            }
            terminal.insert(start.clone(), current.to_string());
        }

        Ok(Self { terminal })
    }

    /// Terminal canonical key for an already-normalised name.
    pub fn canonical<'a>(&'a self, key: &'a str) -> &'a str {
        self.terminal.get(key).map(String::as_str).unwrap_or(key)
    }

    pub fn len(&self) -> usize {
        self.terminal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terminal.is_empty()
    }
}

/// A resolved name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub firm_id: FirmId,
    /// Terminal canonical key; empty for the unknown sentinel.
    pub canonical_name: String,
}

/// Pure name → firm function over a fixed alias table.
#[derive(Debug, Clone, Default)]
pub struct FirmResolver {
    aliases: AliasTable,
}

impl FirmResolver {
    pub fn new(aliases: AliasTable) -> Self {
        Self { aliases }
    }

    pub fn resolve(&self, raw_name: &str) -> Resolution {
        let key = normalize_firm_name(raw_name);
        if key.is_empty() {
            return Resolution {
                firm_id: FirmId::unknown(),
                canonical_name: String::new(),
            };
        }
        let canonical = self.aliases.canonical(&key).to_string();
        Resolution {
            firm_id: firm_id_for(&canonical),
            canonical_name: canonical,
        }
    }
}

/// Per-run memo of resolved names and the firms they produced.
#[derive(Debug, Default)]
pub struct FirmRegistry {
    by_name: BTreeMap<String, FirmId>,
    firms: BTreeMap<FirmId, Firm>,
}

impl FirmRegistry {
    /// Resolve `raw_name`, remembering it as an alias of the resulting firm.
    /// Unknown names are memoised but never registered as firms.
    pub fn resolve(&mut self, resolver: &FirmResolver, raw_name: &str) -> FirmId {
        if let Some(id) = self.by_name.get(raw_name) {
            return id.clone();
        }

        let Resolution {
            firm_id,
            canonical_name,
        } = resolver.resolve(raw_name);
        debug!(raw_name, firm_id = %firm_id, "resolved firm");

        if !firm_id.is_unknown() {
            self.firms
                .entry(firm_id.clone())
                .or_insert_with(|| Firm {
                    firm_id: firm_id.clone(),
                    canonical_name,
                    alias_names: BTreeSet::new(),
                })
                .alias_names
                .insert(raw_name.to_string());
        }
        self.by_name.insert(raw_name.to_string(), firm_id.clone());
        firm_id
    }

    pub fn len(&self) -> usize {
        self.firms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.firms.is_empty()
    }

    /// Firms ordered by id.
    pub fn into_firms(self) -> Vec<Firm> {
        self.firms.into_values().collect()
    }
}
