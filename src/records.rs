use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One display block of enriched content, in display order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Heading1 { text: String },
    Heading2 { text: String },
    Paragraph { text: String },
    Image { access_url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

/// A point of interest as stored in the NDJSON record store.
///
/// Fields this crate does not know about are kept in `extra` and written
/// back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttractionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<Coordinate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentBlock>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AttractionRecord {
    pub fn new(name: &str, location: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            location: Some(location.to_string()),
            ..Self::default()
        }
    }

    /// Non-empty name, if the record has one
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }

    /// Whether the record already carries enriched content
    pub fn has_content(&self) -> bool {
        self.content.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// NDJSON file holding one [`AttractionRecord`] per line.
///
/// Every save rewrites the whole file.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every record, skipping blank lines
    pub fn load(&self) -> Result<Vec<AttractionRecord>> {
        let contents = fs::read_to_string(&self.path)?;
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| {
                    PipelineError::InvalidStore(format!(
                        "{} line {}: {}",
                        self.path.display(),
                        i + 1,
                        e
                    ))
                })
            })
            .collect()
    }

    /// Rewrite the store with `records`
    pub fn save(&self, records: &[AttractionRecord]) -> Result<()> {
        write_ndjson(&self.path, records)
    }
}

fn write_ndjson<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut out = String::new();
    for row in rows {
        out.push_str(&serde_json::to_string(row)?);
        out.push('\n');
    }
    write_atomic(path, out.as_bytes())
}

/// Write to a sibling temp file, sync it, then rename it over `path`.
/// Readers see either the old file or the complete new one.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let temp_path = temp_path_for(path);
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[derive(Debug, Deserialize)]
struct AttractionList {
    attractions: Vec<Value>,
}

/// Convert a JSON document `{"attractions": [...]}` into NDJSON.
///
/// Without an explicit output the result is written next to the input with
/// an `.ndjson` extension. Returns the output path.
pub fn import_json(input: &Path, output: Option<&Path>) -> Result<PathBuf> {
    let contents = fs::read_to_string(input)?;
    let list: AttractionList = serde_json::from_str(&contents)?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.with_extension("ndjson"));
    write_ndjson(&output, &list.attractions)?;

    ::log::info!(
        "Converted {} attractions from {} to {}",
        list.attractions.len(),
        input.display(),
        output.display()
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_block_wire_format() {
        let blocks = vec![
            ContentBlock::Heading1 {
                text: "West Lake".into(),
            },
            ContentBlock::Heading2 {
                text: "History".into(),
            },
            ContentBlock::Paragraph {
                text: "Old.".into(),
            },
            ContentBlock::Image {
                access_url: "https://a.com/i.png".into(),
            },
        ];
        let value = serde_json::to_value(&blocks).unwrap();
        assert_eq!(
            value,
            json!([
                {"type": "heading1", "text": "West Lake"},
                {"type": "heading2", "text": "History"},
                {"type": "paragraph", "text": "Old."},
                {"type": "image", "access_url": "https://a.com/i.png"}
            ])
        );
    }

    #[test]
    fn test_unknown_block_type_rejected() {
        let result: std::result::Result<ContentBlock, _> =
            serde_json::from_value(json!({"type": "video", "url": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_store_round_trip_keeps_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spots.ndjson");
        fs::write(
            &path,
            concat!(
                r#"{"name":"西湖","location":"杭州","rating":4.8}"#,
                "\n\n",
                r#"{"name":"灵隐寺","location":"杭州","coordinate":{"longitude":120.1,"latitude":30.2}}"#,
                "\n"
            ),
        )
        .unwrap();

        let store = RecordStore::new(&path);
        let records = store.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].extra["rating"], json!(4.8));
        assert_eq!(
            records[1].coordinate,
            Some(Coordinate {
                longitude: 120.1,
                latitude: 30.2
            })
        );

        store.save(&records).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        // Written as UTF-8, not \u escapes
        assert!(lines[0].contains("西湖"));
        assert!(lines[0].contains(r#""rating":4.8"#));
        assert_eq!(store.load().unwrap(), records);
    }

    #[test]
    fn test_save_replaces_file_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spots.ndjson");
        fs::write(&path, "{\"name\":\"old\"}\n").unwrap();
        // A second name for the current file keeps its contents observable
        let previous = dir.path().join("previous.ndjson");
        fs::hard_link(&path, &previous).unwrap();

        let store = RecordStore::new(&path);
        store.save(&[AttractionRecord::new("new", "here")]).unwrap();

        assert_eq!(fs::read_to_string(&previous).unwrap(), "{\"name\":\"old\"}\n");
        assert_eq!(store.load().unwrap()[0].name.as_deref(), Some("new"));
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["previous.ndjson", "spots.ndjson"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_writes_a_new_inode() {
        use std::os::unix::fs::MetadataExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spots.ndjson");
        fs::write(&path, "{\"name\":\"A\"}\n").unwrap();
        let before = fs::metadata(&path).unwrap().ino();

        let store = RecordStore::new(&path);
        let records = store.load().unwrap();
        store.save(&records).unwrap();

        assert_ne!(fs::metadata(&path).unwrap().ino(), before);
        assert_eq!(store.load().unwrap(), records);
    }

    #[test]
    fn test_has_content() {
        let mut record = AttractionRecord::new("A", "B");
        assert!(!record.has_content());
        record.content = Some(Vec::new());
        assert!(!record.has_content());
        record.content = Some(vec![ContentBlock::Paragraph { text: "x".into() }]);
        assert!(record.has_content());
    }

    #[test]
    fn test_display_name_requires_non_blank() {
        let mut record = AttractionRecord::default();
        assert_eq!(record.display_name(), None);
        record.name = Some("  ".into());
        assert_eq!(record.display_name(), None);
        record.name = Some("Temple".into());
        assert_eq!(record.display_name(), Some("Temple"));
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ndjson");
        fs::write(&path, "{\"name\":\"ok\"}\nnot json\n").unwrap();

        match RecordStore::new(&path).load() {
            Err(PipelineError::InvalidStore(msg)) => assert!(msg.contains("line 2")),
            other => panic!("expected invalid store error, got {:?}", other),
        }
    }

    #[test]
    fn test_import_json() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("city.json");
        fs::write(
            &input,
            r#"{"city":"杭州","attractions":[{"name":"西湖","location":"杭州西湖区"},{"name":"灵隐寺","location":"杭州"}]}"#,
        )
        .unwrap();

        let output = import_json(&input, None).unwrap();
        assert_eq!(output, dir.path().join("city.ndjson"));

        let records = RecordStore::new(&output).load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name.as_deref(), Some("西湖"));
        assert_eq!(records[1].location.as_deref(), Some("杭州"));
    }
}
