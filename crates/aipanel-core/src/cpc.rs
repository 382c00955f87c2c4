//! Cooperative Patent Classification code normalisation and prefix matching.
//!
//! Bulk records carry CPC codes in several spellings ("G06F 16/245",
//! "g06f16/245", "G06F  16/245 "). Everything downstream compares the
//! compact upper-case form produced by [`normalize_cpc`].
//!
//! # CPC hierarchy
//!
//! - Section: one letter, A–H or Y (`G`)
//! - Class: two digits (`G06`)
//! - Subclass: one letter (`G06F`)
//! - Main group: 1–4 digits (`G06F16`)
//! - Subgroup: `/` then 1–6 digits (`G06F16/245`)
//!
//! A well-formed code reaches at least the subclass level. Configured
//! prefixes may stop at any level, including a bare section (`A`) or a
//! trailing slash (`G06F9/`).

use std::fmt;

use crate::ConfigError;

/// Deepest hierarchy level a code reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Section,
    Class,
    Subclass,
    MainGroup,
    Slash,
    Subgroup,
}

/// Normalise a raw CPC string into its compact form.
///
/// Removes all whitespace and upper-cases. Returns `None` when the result is
/// not a well-formed code (see module docs); callers drop those codes
/// individually.
///
/// "G06F 16/245" → `Some("G06F16/245")`, "g06n3" → `Some("G06N3")`,
/// "G06" → `None`.
pub fn normalize_cpc(raw: &str) -> Option<String> {
    let compact = compact(raw);
    match deepest_level(compact.as_bytes()) {
        Some(Level::Subclass | Level::MainGroup | Level::Subgroup) => Some(compact),
        _ => None,
    }
}

/// A configured CPC prefix, e.g. `G06N`, `G06F16`, `G06F9/` or `A`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpcPrefix(String);

impl CpcPrefix {
    /// Parse a prefix from a config table entry.
    ///
    /// Whitespace is removed, letters upper-cased, and one trailing `*`
    /// wildcard is accepted and dropped (`G06N*` ≡ `G06N`).
    pub fn parse(table: &'static str, raw: &str) -> Result<Self, ConfigError> {
        let compact = compact(raw);
        let trimmed = compact.strip_suffix('*').unwrap_or(&compact);
        if deepest_level(trimmed.as_bytes()).is_none() {
            return Err(ConfigError::InvalidCpcPrefix {
                table,
                value: raw.to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Whether a normalised code falls under this prefix.
    ///
    /// Matching respects group boundaries: when the prefix ends in a digit
    /// the code must not continue with another digit, so `G06F9` covers
    /// `G06F9/445` but not `G06F90/00`.
    pub fn matches(&self, code: &str) -> bool {
        let Some(rest) = code.strip_prefix(self.0.as_str()) else {
            return false;
        };
        let prefix_ends_in_digit = self.0.as_bytes().last().is_some_and(u8::is_ascii_digit);
        !(prefix_ends_in_digit && rest.as_bytes().first().is_some_and(u8::is_ascii_digit))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CpcPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// First code in `codes` matched by any prefix in `prefixes`.
pub fn first_match<'a, I>(prefixes: &[CpcPrefix], codes: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    codes
        .into_iter()
        .map(String::as_str)
        .find(|code| prefixes.iter().any(|p| p.matches(code)))
}

fn compact(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn digit_run(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(bytes.len())
}

/// Walk `code` through the hierarchy and return the deepest level it
/// reaches, or `None` if a byte does not fit.
fn deepest_level(code: &[u8]) -> Option<Level> {
    let (&section, mut rest) = code.split_first()?;
    if !matches!(section, b'A'..=b'H' | b'Y') {
        return None;
    }
    if rest.is_empty() {
        return Some(Level::Section);
    }

    if digit_run(rest) != 2 {
        return None;
    }
    rest = &rest[2..];
    if rest.is_empty() {
        return Some(Level::Class);
    }

    if !rest[0].is_ascii_uppercase() {
        return None;
    }
    rest = &rest[1..];
    if rest.is_empty() {
        return Some(Level::Subclass);
    }

    let group = digit_run(rest);
    if !(1..=4).contains(&group) {
        return None;
    }
    rest = &rest[group..];
    if rest.is_empty() {
        return Some(Level::MainGroup);
    }

    if rest[0] != b'/' {
        return None;
    }
    rest = &rest[1..];
    if rest.is_empty() {
        return Some(Level::Slash);
    }

    let subgroup = digit_run(rest);
    if !(1..=6).contains(&subgroup) || subgroup != rest.len() {
        return None;
    }
    Some(Level::Subgroup)
}
