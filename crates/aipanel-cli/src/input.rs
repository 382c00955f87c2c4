//! Input file loading. Each file is read on a blocking thread; results are
//! collected in command-line order so runs stay reproducible.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use aipanel_ingest::{
    RawOfficeAction, RawPatent, office_actions_from_json_lines, patents_from_json_document, patents_from_json_lines,
    patents_from_xml,
};
use anyhow::Context;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatentFormat {
    Xml,
    JsonDocument,
    JsonLines,
}

fn patent_format(path: &Path) -> PatentFormat {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("xml") => PatentFormat::Xml,
        Some("json") => PatentFormat::JsonDocument,
        _ => PatentFormat::JsonLines,
    }
}

fn open(path: &Path) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(BufReader::new(file))
}

/// Read patents from one bulk XML, JSON document or JSON-lines file.
pub fn read_patents(path: &Path) -> anyhow::Result<Vec<RawPatent>> {
    let origin = path.display().to_string();
    let reader = open(path)?;
    let patents = match patent_format(path) {
        PatentFormat::Xml => patents_from_xml(reader, &origin),
        PatentFormat::JsonDocument => {
            let value: serde_json::Value =
                serde_json::from_reader(reader).with_context(|| format!("parsing JSON {origin}"))?;
            patents_from_json_document(&value, &origin)
        }
        PatentFormat::JsonLines => {
            patents_from_json_lines(reader, &origin).with_context(|| format!("reading JSON lines {origin}"))?
        }
    };
    info!(path = %origin, records = patents.len(), "read patents");
    Ok(patents)
}

pub fn read_office_actions(path: &Path) -> anyhow::Result<Vec<RawOfficeAction>> {
    let origin = path.display().to_string();
    let actions = office_actions_from_json_lines(open(path)?, &origin)
        .with_context(|| format!("reading office actions {origin}"))?;
    info!(path = %origin, records = actions.len(), "read office actions");
    Ok(actions)
}

/// Load every file concurrently and concatenate the results in argument
/// order.
pub async fn load_all<T, F>(paths: &[PathBuf], read: F) -> anyhow::Result<Vec<T>>
where
    T: Send + 'static,
    F: Fn(&Path) -> anyhow::Result<Vec<T>> + Copy + Send + 'static,
{
    let handles: Vec<_> = paths
        .iter()
        .cloned()
        .map(|path| tokio::task::spawn_blocking(move || read(&path)))
        .collect();
    let mut out = Vec::new();
    for handle in handles {
        out.extend(handle.await.context("input loader panicked")??);
    }
    Ok(out)
}
