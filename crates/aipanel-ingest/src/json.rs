//! API JSON decoding.
//!
//! Patent objects come from several APIs with different key spellings and
//! nesting, so they are read from a [`serde_json::Value`] by trying known
//! keys in order. Office actions have a flatter shape and deserialise
//! directly.

use std::io::BufRead;

use serde::Deserialize;
use serde_json::Value;

use crate::{IngestError, RawOfficeAction, RawPatent, SourceRef};

const ID_KEYS: &[&str] = &[
    "application_id",
    "applicationNumberText",
    "applicationNumber",
    "application_number",
    "patent_application_number",
];

const FILING_DATE_KEYS: &[&str] = &[
    "filing_date",
    "filingDate",
    "application_date",
    "appl_filing_date",
];

const CPC_KEYS: &[&str] = &[
    "cpc_codes",
    "cpcClassifications",
    "cpcClassificationBag",
    "cpc_current",
    "cpc",
];

const TITLE_KEYS: &[&str] = &["title", "inventionTitle", "invention_title", "patent_title"];

const ABSTRACT_KEYS: &[&str] = &["abstract", "abstractText", "patent_abstract"];

const ASSIGNEE_KEYS: &[&str] = &[
    "raw_assignee_names",
    "assignees",
    "assigneeBag",
    "assignee",
    "assignee_organization",
];

/// Keys holding the name inside object-valued list entries, e.g.
/// `{"assignee_organization": "Acme"}` or `{"cpc_group_id": "G06N3/08"}`.
const ENTRY_NAME_KEYS: &[&str] = &[
    "assignee_organization",
    "assigneeNameText",
    "organization",
    "orgname",
    "name",
    "cpc_group_id",
    "cpc_subgroup_id",
    "cpc_group",
    "code",
];

/// Objects some APIs nest the bibliographic fields under.
const NESTED_KEYS: &[&str] = &["applicationMetaData", "application"];

/// Array-valued keys an API page may wrap its records in.
const PAGE_KEYS: &[&str] = &["patents", "results", "patentFileWrapperDataBag", "data"];

/// Decode one API patent object.
pub fn raw_patent_from_json(value: &Value, source: SourceRef) -> RawPatent {
    RawPatent {
        application_id: lookup(value, ID_KEYS).and_then(scalar_string),
        filing_date: lookup(value, FILING_DATE_KEYS).and_then(scalar_string),
        cpc: lookup(value, CPC_KEYS).map(|v| string_list(v, true)).unwrap_or_default(),
        title: lookup(value, TITLE_KEYS).and_then(scalar_string),
        abstract_text: lookup(value, ABSTRACT_KEYS).and_then(scalar_string),
        assignees: lookup(value, ASSIGNEE_KEYS).map(|v| string_list(v, false)).unwrap_or_default(),
        source,
        unreadable: None,
    }
}

/// Decode a whole API response: a bare array, an object wrapping an array
/// under a known page key, or a single patent object.
pub fn patents_from_json_document(value: &Value, origin: &str) -> Vec<RawPatent> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match PAGE_KEYS.iter().find_map(|k| map.get(*k)?.as_array()) {
            Some(items) => items.iter().collect(),
            None => vec![value],
        },
        _ => vec![value],
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, v)| raw_patent_from_json(v, SourceRef::new(origin, i + 1)))
        .collect()
}

/// Read newline-delimited patent objects. A line that is not valid JSON
/// becomes an unreadable record so it is audited rather than lost.
pub fn patents_from_json_lines<R: BufRead>(reader: R, origin: &str) -> Result<Vec<RawPatent>, IngestError> {
    let mut out = Vec::new();
    for_each_json_line(reader, origin, |parsed, source| {
        out.push(match parsed {
            Ok(v) => raw_patent_from_json(&v, source),
            Err(message) => RawPatent {
                source,
                unreadable: Some(message),
                ..Default::default()
            },
        });
    })?;
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct OfficeActionJson {
    #[serde(alias = "patentApplicationNumber", alias = "applicationNumberText", alias = "application_number")]
    application_id: Option<Scalar>,
    #[serde(alias = "submissionDate", alias = "mailDate", alias = "mail_date", alias = "officeActionDate")]
    action_date: Option<Scalar>,
    #[serde(alias = "documentIdentifier", alias = "obsoleteDocumentIdentifier", alias = "id")]
    document_id: Option<Scalar>,
    #[serde(alias = "bodyText", alias = "body_text", alias = "documentText", alias = "text")]
    raw_text: Option<TextBody>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
    List(Vec<String>),
}

impl Scalar {
    fn into_string(self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(n) => Some(n.to_string()),
            Self::List(v) => v.into_iter().next(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextBody {
    One(String),
    Many(Vec<String>),
}

/// Decode one office-action object.
pub fn raw_office_action_from_json(value: Value, source: SourceRef) -> RawOfficeAction {
    match serde_json::from_value::<OfficeActionJson>(value) {
        Ok(oa) => RawOfficeAction {
            application_id: oa.application_id.and_then(Scalar::into_string),
            action_date: oa.action_date.and_then(Scalar::into_string),
            document_id: oa.document_id.and_then(Scalar::into_string),
            raw_text: oa.raw_text.map(|t| match t {
                TextBody::One(s) => s,
                TextBody::Many(parts) => parts.join("\n"),
            }),
            source,
            unreadable: None,
        },
        Err(e) => RawOfficeAction {
            source,
            unreadable: Some(e.to_string()),
            ..Default::default()
        },
    }
}

/// Read newline-delimited office-action objects.
pub fn office_actions_from_json_lines<R: BufRead>(
    reader: R,
    origin: &str,
) -> Result<Vec<RawOfficeAction>, IngestError> {
    let mut out = Vec::new();
    for_each_json_line(reader, origin, |parsed, source| {
        out.push(match parsed {
            Ok(v) => raw_office_action_from_json(v, source),
            Err(message) => RawOfficeAction {
                source,
                unreadable: Some(message),
                ..Default::default()
            },
        });
    })?;
    Ok(out)
}

/// Call `f` with the parsed JSON of every non-blank line and its 1-based
/// line number. A line that is not UTF-8 or not JSON reaches `f` as an error
/// message; only a failing reader ends the file.
fn for_each_json_line<R: BufRead>(
    mut reader: R,
    origin: &str,
    mut f: impl FnMut(Result<Value, String>, SourceRef),
) -> Result<(), IngestError> {
    let mut buf = Vec::new();
    let mut line_no = 0;
    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).map_err(|source| IngestError::Io {
            origin: origin.to_string(),
            source,
        })?;
        if read == 0 {
            return Ok(());
        }
        line_no += 1;
        let source = SourceRef::new(origin, line_no);
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                f(Err(format!("line is not valid UTF-8: {e}")), source);
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        f(serde_json::from_str::<Value>(line).map_err(|e| e.to_string()), source);
    }
}

// ── Value helpers ──

/// First present, non-null key, checking nested metadata objects after the
/// top level.
fn lookup<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let obj = value.as_object()?;
    keys.iter()
        .find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
        .or_else(|| {
            NESTED_KEYS
                .iter()
                .filter_map(|n| obj.get(*n))
                .find_map(|nested| lookup(nested, keys))
        })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.iter().find_map(scalar_string),
        _ => None,
    }
}

/// Flatten a list-ish field: an array of strings or named objects, or a
/// single string. The string is split on commas only when
/// `comma_separated`; assignee names such as "Facebook, Inc." contain them.
fn string_list(value: &Value, comma_separated: bool) -> Vec<String> {
    match value {
        Value::String(s) if comma_separated => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Value::String(s) => match s.trim() {
            "" => Vec::new(),
            name => vec![name.to_string()],
        },
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(map) => ENTRY_NAME_KEYS
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))
                    .map(|s| s.trim().to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::Object(map) => ENTRY_NAME_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(|s| vec![s.trim().to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
