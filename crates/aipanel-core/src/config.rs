//! Run configuration: classifier tables, extractor options, firm aliases and
//! the policy date.
//!
//! Everything the rules depend on is loaded from one TOML file so a
//! sensitivity run only needs a different file. Any problem with the file is
//! fatal: the pipeline never falls back to built-in tables.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use crate::cpc::CpcPrefix;
use crate::{ConfigError, parse_date};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    classifier: RawClassifier,
    #[serde(default)]
    extractor: RawExtractor,
    panel: RawPanel,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawClassifier {
    ai_cpc_prefixes: Vec<String>,
    control_cpc_prefixes: Vec<String>,
    ai_keywords: Vec<String>,
    #[serde(default)]
    exclusion_keywords: Vec<String>,
    #[serde(default)]
    forced_control_cpc_prefixes: Vec<String>,
    #[serde(default)]
    excluded_cpc_prefixes: Vec<String>,
    #[serde(default)]
    adjacent_cpc_prefixes: Vec<String>,
    #[serde(default)]
    require_abstract: bool,
    #[serde(default = "enabled")]
    keyword_fallback: bool,
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawExtractor {
    window_tokens: usize,
    min_words: usize,
    min_alpha_ratio: f64,
}

impl Default for RawExtractor {
    fn default() -> Self {
        let d = ExtractorOptions::default();
        Self {
            window_tokens: d.window_tokens,
            min_words: d.min_words,
            min_alpha_ratio: d.min_alpha_ratio,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPanel {
    policy_effective_date: String,
}

/// Classifier lookup tables, validated and normalised.
///
/// Keywords are lower-cased with whitespace collapsed; prefixes are parsed
/// [`CpcPrefix`]es. Optional tables that are left empty disable their rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierTables {
    pub ai_cpc_prefixes: Vec<CpcPrefix>,
    pub control_cpc_prefixes: Vec<CpcPrefix>,
    pub ai_keywords: Vec<String>,
    pub exclusion_keywords: Vec<String>,
    pub forced_control_cpc_prefixes: Vec<CpcPrefix>,
    pub excluded_cpc_prefixes: Vec<CpcPrefix>,
    pub adjacent_cpc_prefixes: Vec<CpcPrefix>,
    pub require_abstract: bool,
    /// Keyword-only AI rule for records no CPC rule claimed.
    pub keyword_fallback: bool,
}

/// Knobs for the office-action text scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractorOptions {
    /// Tokens searched on each side of a statute citation.
    pub window_tokens: usize,
    /// Fewer alphabetic words than this makes a document garbled.
    pub min_words: usize,
    /// Minimum share of alphabetic characters among non-space characters.
    pub min_alpha_ratio: f64,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            window_tokens: 12,
            min_words: 3,
            min_alpha_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelOptions {
    pub policy_effective_date: NaiveDate,
}

/// Fully validated configuration for one pipeline invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub classifier: ClassifierTables,
    pub extractor: ExtractorOptions,
    pub panel: PanelOptions,
    /// Raw alias → raw canonical name, exactly as written in the file.
    pub aliases: BTreeMap<String, String>,
}

impl PipelineConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        info!(
            path = %path.display(),
            ai_prefixes = config.classifier.ai_cpc_prefixes.len(),
            control_prefixes = config.classifier.control_cpc_prefixes.len(),
            keywords = config.classifier.ai_keywords.len(),
            aliases = config.aliases.len(),
            policy_date = %config.panel.policy_effective_date,
            "loaded pipeline config"
        );
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;
        let c = raw.classifier;

        let classifier = ClassifierTables {
            ai_cpc_prefixes: required_prefixes("ai_cpc_prefixes", &c.ai_cpc_prefixes)?,
            control_cpc_prefixes: required_prefixes("control_cpc_prefixes", &c.control_cpc_prefixes)?,
            ai_keywords: required_keywords("ai_keywords", &c.ai_keywords)?,
            exclusion_keywords: keywords(&c.exclusion_keywords),
            forced_control_cpc_prefixes: prefixes("forced_control_cpc_prefixes", &c.forced_control_cpc_prefixes)?,
            excluded_cpc_prefixes: prefixes("excluded_cpc_prefixes", &c.excluded_cpc_prefixes)?,
            adjacent_cpc_prefixes: prefixes("adjacent_cpc_prefixes", &c.adjacent_cpc_prefixes)?,
            require_abstract: c.require_abstract,
            keyword_fallback: c.keyword_fallback,
        };

        let e = raw.extractor;
        if e.window_tokens == 0 {
            return Err(ConfigError::InvalidOption {
                field: "extractor.window_tokens",
                message: "must be at least 1".into(),
            });
        }
        if !(0.0..=1.0).contains(&e.min_alpha_ratio) {
            return Err(ConfigError::InvalidOption {
                field: "extractor.min_alpha_ratio",
                message: format!("{} is outside 0..=1", e.min_alpha_ratio),
            });
        }
        let extractor = ExtractorOptions {
            window_tokens: e.window_tokens,
            min_words: e.min_words,
            min_alpha_ratio: e.min_alpha_ratio,
        };

        let policy_effective_date =
            parse_date(&raw.panel.policy_effective_date).ok_or_else(|| ConfigError::InvalidDate {
                field: "panel.policy_effective_date",
                value: raw.panel.policy_effective_date.clone(),
            })?;

        Ok(Self {
            classifier,
            extractor,
            panel: PanelOptions {
                policy_effective_date,
            },
            aliases: raw.aliases,
        })
    }
}

fn prefixes(table: &'static str, raw: &[String]) -> Result<Vec<CpcPrefix>, ConfigError> {
    let mut out: Vec<CpcPrefix> = raw
        .iter()
        .map(|s| CpcPrefix::parse(table, s))
        .collect::<Result<_, _>>()?;
    out.sort();
    out.dedup();
    Ok(out)
}

fn required_prefixes(table: &'static str, raw: &[String]) -> Result<Vec<CpcPrefix>, ConfigError> {
    let out = prefixes(table, raw)?;
    if out.is_empty() {
        return Err(ConfigError::EmptyTable(table));
    }
    Ok(out)
}

/// Lower-case and collapse whitespace so keywords compare against
/// normalised record text.
pub fn normalize_keyword(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn keywords(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = raw
        .iter()
        .map(|k| normalize_keyword(k))
        .filter(|k| !k.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn required_keywords(table: &'static str, raw: &[String]) -> Result<Vec<String>, ConfigError> {
    let out = keywords(raw);
    if out.is_empty() {
        return Err(ConfigError::EmptyTable(table));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [classifier]
        ai_cpc_prefixes = ["G06N*"]
        control_cpc_prefixes = ["G06F16", "H04L29"]
        ai_keywords = ["Machine  Learning", "neural network"]

        [panel]
        policy_effective_date = "2024-07-17"
    "#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = PipelineConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(cfg.classifier.ai_cpc_prefixes[0].as_str(), "G06N");
        assert_eq!(cfg.classifier.ai_keywords, vec!["machine learning", "neural network"]);
        assert!(cfg.classifier.exclusion_keywords.is_empty());
        assert!(cfg.classifier.forced_control_cpc_prefixes.is_empty());
        assert!(!cfg.classifier.require_abstract);
        assert!(cfg.classifier.keyword_fallback);
        assert_eq!(cfg.extractor, ExtractorOptions::default());
        assert_eq!(
            cfg.panel.policy_effective_date,
            NaiveDate::from_ymd_opt(2024, 7, 17).unwrap()
        );
        assert!(cfg.aliases.is_empty());
    }

    #[test]
    fn empty_required_table_is_fatal() {
        let text = MINIMAL.replace(r#"ai_keywords = ["Machine  Learning", "neural network"]"#, "ai_keywords = []");
        let err = PipelineConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyTable("ai_keywords")));
    }

    #[test]
    fn missing_table_is_fatal() {
        let text = MINIMAL.replace(r#"control_cpc_prefixes = ["G06F16", "H04L29"]"#, "");
        assert!(matches!(
            PipelineConfig::from_toml_str(&text),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn malformed_prefix_is_fatal() {
        let text = MINIMAL.replace(r#"["G06N*"]"#, r#"["G06N", "not-a-code"]"#);
        let err = PipelineConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidCpcPrefix {
                table: "ai_cpc_prefixes",
                ..
            }
        ));
    }

    #[test]
    fn malformed_policy_date_is_fatal() {
        let text = MINIMAL.replace("2024-07-17", "July 2024");
        assert!(matches!(
            PipelineConfig::from_toml_str(&text),
            Err(ConfigError::InvalidDate { .. })
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let text = format!("{MINIMAL}\n[extractor]\nwindow = 4\n");
        assert!(PipelineConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn zero_window_is_rejected() {
        let text = format!("{MINIMAL}\n[extractor]\nwindow_tokens = 0\n");
        assert!(matches!(
            PipelineConfig::from_toml_str(&text),
            Err(ConfigError::InvalidOption { .. })
        ));
    }

    #[test]
    fn aliases_and_optional_tables_load() {
        let text = format!(
            "{MINIMAL}\n[aliases]\n\"Facebook, Inc.\" = \"Meta Platforms\"\n"
        )
        .replace(
            "ai_keywords =",
            "excluded_cpc_prefixes = [\"A\", \"C\"]\nforced_control_cpc_prefixes = [\"G06F8\", \"G06F40\"]\nai_keywords =",
        );
        let cfg = PipelineConfig::from_toml_str(&text).unwrap();
        assert_eq!(cfg.aliases["Facebook, Inc."], "Meta Platforms");
        assert_eq!(cfg.classifier.excluded_cpc_prefixes.len(), 2);
        assert_eq!(cfg.classifier.forced_control_cpc_prefixes.len(), 2);
    }

    #[test]
    fn load_missing_file_errors() {
        let err = PipelineConfig::load(Path::new("/nonexistent/panel.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let cfg = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(cfg.classifier.control_cpc_prefixes.len(), 2);
    }

    #[test]
    fn shipped_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("config")
            .join("panel.toml");
        let cfg = PipelineConfig::load(&path).unwrap();
        assert!(!cfg.classifier.ai_cpc_prefixes.is_empty());
        assert!(!cfg.aliases.is_empty());
    }

    #[test]
    fn strict_profile_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("config")
            .join("panel-strict.toml");
        let cfg = PipelineConfig::load(&path).unwrap();
        assert!(cfg.classifier.require_abstract);
        assert!(!cfg.classifier.keyword_fallback);
        assert_eq!(cfg.classifier.excluded_cpc_prefixes.len(), 2);
    }
}
