//! Streaming reader for USPTO bulk full-text XML.
//!
//! A weekly bulk file is many complete XML documents concatenated, each with
//! its own `<?xml?>` declaration and DOCTYPE. The reader walks the event
//! stream once and yields one [`RawPatent`] per `us-patent-grant` (or
//! `us-patent-application`) root, so memory stays flat regardless of file
//! size.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use crate::{IngestError, RawPatent, SourceRef};

const ROOTS: &[&str] = &["us-patent-grant", "us-patent-application"];

/// Elements whose text content is captured on close.
const CAPTURED: &[&str] = &[
    "doc-number",
    "date",
    "invention-title",
    "classification-cpc-text",
    "orgname",
    "section",
    "class",
    "subclass",
    "main-group",
    "subgroup",
];

/// Iterator over the patent documents in a bulk XML stream.
///
/// A syntax error ends iteration after yielding the error; documents read
/// before it are unaffected.
pub struct GrantXmlReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    origin: String,
    ordinal: usize,
    done: bool,
}

impl<R: BufRead> GrantXmlReader<R> {
    pub fn new(input: R, origin: impl Into<String>) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            origin: origin.into(),
            ordinal: 0,
            done: false,
        }
    }

    /// Advance to the next root element and collect it.
    fn next_document(&mut self) -> Result<Option<RawPatent>, IngestError> {
        let mut doc: Option<DocumentBuilder> = None;

        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(ev) => ev,
                Err(source) => {
                    return Err(IngestError::Xml {
                        origin: self.origin.clone(),
                        position: self.reader.buffer_position(),
                        source,
                    });
                }
            };

            match event {
                Event::Start(e) => {
                    let name = local_name(&e);
                    match doc.as_mut() {
                        Some(d) => d.open(name),
                        None if ROOTS.contains(&name.as_str()) => {
                            self.ordinal += 1;
                            let mut d = DocumentBuilder::new(SourceRef::new(&self.origin, self.ordinal));
                            d.open(name);
                            doc = Some(d);
                        }
                        None => {}
                    }
                }
                Event::Empty(e) => {
                    if let Some(d) = doc.as_mut() {
                        let name = local_name(&e);
                        d.open(name);
                        d.close();
                    }
                }
                Event::Text(t) => {
                    if let Some(d) = doc.as_mut() {
                        let text = match t.unescape() {
                            Ok(s) => s.into_owned(),
                            Err(_) => String::from_utf8_lossy(&t).into_owned(),
                        };
                        d.text(&text);
                    }
                }
                Event::CData(c) => {
                    if let Some(d) = doc.as_mut() {
                        d.text(&String::from_utf8_lossy(&c));
                    }
                }
                Event::End(_) => {
                    if let Some(d) = doc.as_mut()
                        && d.close()
                    {
                        let finished = doc.take().map(DocumentBuilder::finish);
                        if let Some(p) = &finished {
                            debug!(source = %p.source, application_id = ?p.application_id, "read XML document");
                        }
                        return Ok(finished);
                    }
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for GrantXmlReader<R> {
    type Item = Result<RawPatent, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_document() {
            Ok(Some(p)) => Some(Ok(p)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read every document of a bulk file.
///
/// A syntax error ends the file but keeps the documents before it. The
/// error itself becomes one unreadable record, so normalisation counts and
/// audits it like any other malformed record.
pub fn patents_from_xml<R: BufRead>(input: R, origin: &str) -> Vec<RawPatent> {
    let mut out = Vec::new();
    for item in GrantXmlReader::new(input, origin) {
        match item {
            Ok(patent) => out.push(patent),
            Err(e) => {
                warn!(origin, kept = out.len(), error = %e, "XML error; keeping documents read so far");
                out.push(RawPatent {
                    source: SourceRef::new(origin, out.len() + 1),
                    unreadable: Some(e.to_string()),
                    ..Default::default()
                });
            }
        }
    }
    out
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Structured `<classification-cpc>` parts.
#[derive(Default)]
struct CpcParts {
    section: String,
    class: String,
    subclass: String,
    main_group: String,
    subgroup: String,
}

impl CpcParts {
    fn assemble(&self) -> Option<String> {
        if self.section.is_empty() || self.class.is_empty() || self.subclass.is_empty() {
            return None;
        }
        let mut code = format!("{}{}{}", self.section, self.class, self.subclass);
        if !self.main_group.is_empty() {
            code.push_str(&self.main_group);
            if !self.subgroup.is_empty() {
                code.push('/');
                code.push_str(&self.subgroup);
            }
        }
        Some(code)
    }
}

/// Accumulates one document's fields while its events stream past.
struct DocumentBuilder {
    path: Vec<String>,
    text: String,
    abstract_parts: Vec<String>,
    cpc: CpcParts,
    raw: RawPatent,
}

impl DocumentBuilder {
    fn new(source: SourceRef) -> Self {
        Self {
            path: Vec::new(),
            text: String::new(),
            abstract_parts: Vec::new(),
            cpc: CpcParts::default(),
            raw: RawPatent {
                source,
                ..Default::default()
            },
        }
    }

    fn open(&mut self, name: String) {
        if CAPTURED.contains(&name.as_str()) {
            self.text.clear();
        }
        if name == "classification-cpc" {
            self.cpc = CpcParts::default();
        }
        self.path.push(name);
    }

    fn text(&mut self, s: &str) {
        let s = s.trim();
        if s.is_empty() {
            return;
        }
        if self.within("abstract") {
            self.abstract_parts.push(s.to_string());
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(s);
    }

    /// Close the innermost element. Returns `true` when the root closed.
    fn close(&mut self) -> bool {
        let taken = std::mem::take(&mut self.text);
        let value = taken.trim();

        if self.ends_with(&["application-reference", "document-id", "doc-number"]) {
            self.raw.application_id.get_or_insert_with(|| value.to_string());
        } else if self.ends_with(&["application-reference", "document-id", "date"]) {
            self.raw.filing_date.get_or_insert_with(|| value.to_string());
        } else if self.ends_with(&["invention-title"]) {
            self.raw.title.get_or_insert_with(|| value.to_string());
        } else if self.ends_with(&["classification-cpc-text"]) {
            self.raw.cpc.push(value.to_string());
        } else if self.ends_with(&["orgname"]) && self.within("assignees") {
            self.raw.assignees.push(value.to_string());
        } else if self.ends_with(&["classification-cpc", "section"]) {
            self.cpc.section = value.to_string();
        } else if self.ends_with(&["classification-cpc", "class"]) {
            self.cpc.class = value.to_string();
        } else if self.ends_with(&["classification-cpc", "subclass"]) {
            self.cpc.subclass = value.to_string();
        } else if self.ends_with(&["classification-cpc", "main-group"]) {
            self.cpc.main_group = value.to_string();
        } else if self.ends_with(&["classification-cpc", "subgroup"]) {
            self.cpc.subgroup = value.to_string();
        } else if self.ends_with(&["classification-cpc"]) {
            if let Some(code) = self.cpc.assemble() {
                self.raw.cpc.push(code);
            }
        } else {
            // Keep text of inline markup (e.g. <i> in a title) for the parent.
            self.text = taken;
        }

        self.path.pop();
        self.path.is_empty()
    }

    fn ends_with(&self, suffix: &[&str]) -> bool {
        self.path.len() >= suffix.len()
            && self.path[self.path.len() - suffix.len()..]
                .iter()
                .zip(suffix)
                .all(|(a, b)| a == b)
    }

    fn within(&self, name: &str) -> bool {
        self.path.iter().any(|p| p == name)
    }

    fn finish(mut self) -> RawPatent {
        if !self.abstract_parts.is_empty() {
            self.raw.abstract_text = Some(self.abstract_parts.join(" "));
        }
        self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRANT_A: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE us-patent-grant SYSTEM "us-patent-grant-v47-2022-02-17.dtd" [ ]>
<us-patent-grant lang="EN" file="US12000001-20240820.XML">
<us-bibliographic-data-grant>
<publication-reference><document-id><country>US</country><doc-number>12000001</doc-number><kind>B2</kind><date>20240820</date></document-id></publication-reference>
<application-reference appl-type="utility"><document-id><country>US</country><doc-number>17123456</doc-number><date>20220315</date></document-id></application-reference>
<classifications-cpc>
<main-cpc><classification-cpc><cpc-version-indicator><date>20230101</date></cpc-version-indicator><section>G</section><class>06</class><subclass>N</subclass><main-group>3</main-group><subgroup>08</subgroup></classification-cpc></main-cpc>
</classifications-cpc>
<invention-title id="d2e43">Training a <i>neural</i> network</invention-title>
<us-parties><us-applicants><us-applicant><addressbook><orgname>Applicant Holdings</orgname></addressbook></us-applicant></us-applicants></us-parties>
<assignees><assignee><addressbook><orgname>Acme Corp.</orgname><role>02</role></addressbook></assignee>
<assignee><addressbook><orgname>Beta LLC</orgname></addressbook></assignee></assignees>
</us-bibliographic-data-grant>
<abstract id="abstract"><p id="p-0001">A method of training a model &amp; evaluating it.</p><p>Second paragraph.</p></abstract>
<classification-cpc-text>H04L 29/06</classification-cpc-text>
</us-patent-grant>
"#;

    const GRANT_B: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE us-patent-grant SYSTEM "us-patent-grant-v47-2022-02-17.dtd" [ ]>
<us-patent-grant>
<us-bibliographic-data-grant>
<application-reference><document-id><doc-number>17999999</doc-number><date>2023-01-05</date></document-id></application-reference>
<invention-title>Database index</invention-title>
</us-bibliographic-data-grant>
<classification-cpc-text>G06F 16/245</classification-cpc-text>
</us-patent-grant>
"#;

    fn read_all(xml: &str) -> Vec<Result<RawPatent, IngestError>> {
        GrantXmlReader::new(xml.as_bytes(), "ipg.xml").collect()
    }

    #[test]
    fn reads_concatenated_documents() {
        let input = format!("{GRANT_A}{GRANT_B}");
        let docs: Vec<RawPatent> = read_all(&input).into_iter().map(Result::unwrap).collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source, SourceRef::new("ipg.xml", 1));
        assert_eq!(docs[1].source, SourceRef::new("ipg.xml", 2));
        assert_eq!(docs[1].application_id.as_deref(), Some("17999999"));
        assert_eq!(docs[1].cpc, ["G06F 16/245"]);
    }

    #[test]
    fn extracts_bibliographic_fields() {
        let doc = read_all(GRANT_A).remove(0).unwrap();
        // Application reference, not the publication reference.
        assert_eq!(doc.application_id.as_deref(), Some("17123456"));
        assert_eq!(doc.filing_date.as_deref(), Some("20220315"));
        assert_eq!(doc.title.as_deref(), Some("Training a neural network"));
        assert_eq!(
            doc.abstract_text.as_deref(),
            Some("A method of training a model & evaluating it. Second paragraph.")
        );
    }

    #[test]
    fn collects_structured_and_text_cpc() {
        let doc = read_all(GRANT_A).remove(0).unwrap();
        assert_eq!(doc.cpc, ["G06N3/08", "H04L 29/06"]);
    }

    #[test]
    fn assignees_only_not_applicants() {
        let doc = read_all(GRANT_A).remove(0).unwrap();
        assert_eq!(doc.assignees, ["Acme Corp.", "Beta LLC"]);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(read_all("").is_empty());
    }

    #[test]
    fn syntax_error_stops_after_good_documents() {
        let input = format!("{GRANT_B}<us-patent-grant><invention-title>x</wrong></us-patent-grant>");
        let results = read_all(&input);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(IngestError::Xml { .. })));
    }

    #[test]
    fn collected_file_keeps_documents_before_an_error() {
        let input = format!("{GRANT_A}{GRANT_B}<us-patent-grant><invention-title>x</wrong></us-patent-grant>");
        let docs = patents_from_xml(input.as_bytes(), "ipg.xml");
        assert_eq!(docs.len(), 3);
        assert!(docs[..2].iter().all(|d| d.unreadable.is_none()));
        assert_eq!(docs[1].application_id.as_deref(), Some("17999999"));
        assert_eq!(docs[2].source, SourceRef::new("ipg.xml", 3));
        assert!(docs[2].unreadable.is_some());
        assert!(matches!(
            crate::normalize(docs[2].clone()),
            Err(crate::MalformedRecordError::Unreadable { .. })
        ));
    }
}
