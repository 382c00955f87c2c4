//! Record normalizer: turns bulk-grant XML documents and API JSON objects
//! into [`PatentRecord`](aipanel_core::PatentRecord)s and
//! [`OfficeActionEvent`](aipanel_core::OfficeActionEvent)s.

mod error;
pub mod json;
pub mod raw;
pub mod xml;

pub use error::{IngestError, MalformedRecordError};
pub use json::{
    office_actions_from_json_lines, patents_from_json_document, patents_from_json_lines,
    raw_office_action_from_json, raw_patent_from_json,
};
pub use raw::{
    NormalizedPatent, RawOfficeAction, RawPatent, SourceRef, normalize, normalize_office_action,
};
pub use xml::{GrantXmlReader, patents_from_xml};
