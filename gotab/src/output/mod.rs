//! Thread-safe report writers with format auto-detection.
//!
//! One [`FileWriter`] instance owns one output file; shared references can
//! write concurrently, serialized on an internal mutex. The payload shape
//! depends on the detected format: text lines, CSV records with verified
//! headers, or JSON values appended into an array.

pub mod outdir;

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

pub use outdir::{default_output_dir, prepend_default_output_dir};

/// The format of an output file, detected from its extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Unknown,
    Txt,
    Csv,
    Json,
}

/// Detect a file's format from its extension.
pub fn detect_format(path: &Path) -> FileFormat {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("txt") => FileFormat::Txt,
        Some("csv") => FileFormat::Csv,
        Some("json") => FileFormat::Json,
        _ => FileFormat::Unknown,
    }
}

/// A unit of data to write, shaped for the writer's format.
#[derive(Clone, Debug)]
pub enum Payload {
    /// Text: each element becomes one line; a trailing newline is added.
    Lines(Vec<String>),
    /// CSV: one record plus the header row it must line up with.
    Record {
        fields: Vec<String>,
        headers: Vec<String>,
    },
    /// JSON: any value; `flatten` merges array payloads element-wise when
    /// appending to existing data.
    Json { value: Value, flatten: bool },
}

struct WriterInner {
    path: PathBuf,
    format: FileFormat,
    file: Option<File>,
    /// CSV headers in effect for the file, established on the first write.
    csv_headers: Option<Vec<String>>,
    /// In-memory view of everything already in the JSON file.
    json_written: Option<Vec<Value>>,
}

/// A thread-safe writer for one report file. Only one distinct writer may
/// point at any given file at a time.
pub struct FileWriter {
    inner: Mutex<WriterInner>,
}

impl FileWriter {
    /// Create a writer for `path`, resolving relative paths under the
    /// default output directory. `append` keeps existing contents; it is
    /// ignored for JSON files, which are always overwritten.
    pub fn new(path: &Path, append: bool) -> Result<Self> {
        let path = prepend_default_output_dir(path)
            .with_context(|| format!("setting output file path {path:?}"))?;
        let format = detect_format(&path);
        if format == FileFormat::Unknown {
            bail!("unsupported output file format (file {path:?})");
        }
        let append = append && format != FileFormat::Json;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("creating output file's parent directory")?;
        }

        let mut options = OpenOptions::new();
        options.create(true).read(true).write(true);
        if append {
            debug!(path = ?path, "appending to output file in case it already exists");
            options.append(true);
        } else {
            debug!(path = ?path, "truncating output file in case it already exists");
            options.truncate(true);
        }
        let file = options
            .open(&path)
            .with_context(|| format!("opening output file {path:?}"))?;

        Ok(Self {
            inner: Mutex::new(WriterInner {
                path,
                format,
                file: Some(file),
                csv_headers: None,
                json_written: None,
            }),
        })
    }

    /// The resolved output path.
    pub fn path(&self) -> PathBuf {
        self.inner.lock().unwrap().path.clone()
    }

    /// The parent directory of the output path.
    pub fn path_dir(&self) -> PathBuf {
        self.path().parent().map(Path::to_path_buf).unwrap_or_default()
    }

    pub fn format(&self) -> FileFormat {
        self.inner.lock().unwrap().format
    }

    /// Write one payload, dispatching on the detected format.
    pub fn write(&self, payload: Payload) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let path = inner.path.clone();
        append_payload(&mut inner, payload)
            .with_context(|| format!("writing data to output file {path:?}"))?;
        debug!(path = ?path, "data written successfully to file");
        Ok(())
    }

    /// Write several payloads element-wise, stopping at the first error.
    pub fn write_multiple(&self, payloads: Vec<Payload>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let path = inner.path.clone();
        let count = payloads.len();
        for (i, payload) in payloads.into_iter().enumerate() {
            append_payload(&mut inner, payload)
                .with_context(|| format!("writing data to output file {path:?} (element {i})"))?;
        }
        debug!(path = ?path, count, "multiple pieces of data written successfully to file");
        Ok(())
    }

    /// Flush and drop the file handle. Further writes fail.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        debug!(path = ?inner.path, "closing file writer resources");
        if let Some(mut file) = inner.file.take() {
            if let Err(err) = file.flush() {
                warn!(%err, path = ?inner.path, "error flushing output file");
            }
        }
    }
}

fn append_payload(inner: &mut WriterInner, payload: Payload) -> Result<()> {
    if inner.file.is_none() {
        bail!("cannot write data to a closed writer");
    }
    match (inner.format, payload) {
        (FileFormat::Txt, Payload::Lines(lines)) => append_text(inner, &lines),
        (FileFormat::Csv, Payload::Record { fields, headers }) => {
            append_csv(inner, &fields, &headers)
        }
        (FileFormat::Json, Payload::Json { value, flatten }) => append_json(inner, value, flatten),
        (format, payload) => bail!(
            "payload {payload:?} is not supported by the {format:?} output format"
        ),
    }
}

fn append_text(inner: &mut WriterInner, lines: &[String]) -> Result<()> {
    let file = inner.file.as_mut().unwrap();
    let content = lines.join("\n") + "\n";
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn append_csv(inner: &mut WriterInner, fields: &[String], headers: &[String]) -> Result<()> {
    if headers.is_empty() {
        bail!("writing to CSV requires non-empty headers");
    }
    if fields.len() != headers.len() {
        bail!(
            "provided CSV row field count ({}) does not match header count ({})",
            fields.len(),
            headers.len()
        );
    }

    // Establish the file's headers exactly once: write them into an empty
    // file, or read them back from an existing one.
    if inner.csv_headers.is_none() {
        let file = inner.file.as_mut().unwrap();
        let size = file.metadata()?.len();
        if size == 0 {
            let mut writer = csv::Writer::from_writer(&mut *file);
            writer.write_record(headers)?;
            writer.flush()?;
            inner.csv_headers = Some(headers.to_vec());
            debug!(?headers, "wrote CSV headers");
        } else {
            // Re-open by path: seeking a file opened with append is
            // undefined, so the first line is read through a fresh handle.
            let existing = File::open(&inner.path)?;
            let mut reader = csv::Reader::from_reader(existing);
            let existing_headers = reader
                .headers()
                .context("reading CSV headers")?
                .iter()
                .map(str::to_string)
                .collect::<Vec<_>>();
            inner.csv_headers = Some(existing_headers);
        }
    }

    let existing = inner.csv_headers.as_ref().unwrap();
    if existing.len() != headers.len() {
        bail!(
            "provided CSV header count ({}) does not match existing header count ({})",
            headers.len(),
            existing.len()
        );
    }
    for (i, (provided, existing)) in headers.iter().zip(existing).enumerate() {
        if provided != existing {
            bail!(
                "provided CSV header {provided:?} does not match existing header {existing:?} (index {i})"
            );
        }
    }

    let file = inner.file.as_mut().unwrap();
    let mut writer = csv::Writer::from_writer(&mut *file);
    writer.write_record(fields)?;
    writer.flush()?;
    Ok(())
}

fn append_json(inner: &mut WriterInner, value: Value, flatten: bool) -> Result<()> {
    // Read whatever the file already holds exactly once, normalizing a
    // scalar to a one-element array.
    if inner.json_written.is_none() {
        let file = inner.file.as_mut().unwrap();
        file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        std::io::Read::read_to_string(file, &mut contents)?;
        let existing = if contents.trim().is_empty() {
            Vec::new()
        } else {
            match serde_json::from_str::<Value>(&contents).context("reading existing JSON data")? {
                Value::Array(items) => items,
                other => vec![other],
            }
        };
        inner.json_written = Some(existing);
    }

    let written = inner.json_written.as_mut().unwrap();
    match value {
        Value::Array(items) if flatten => written.extend(items),
        other => written.push(other),
    }

    // Rewrite the whole file with the updated contents, two-space indented.
    let file = inner.file.as_mut().unwrap();
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    let encoded = if written.len() == 1 {
        serde_json::to_string_pretty(&written[0])?
    } else {
        serde_json::to_string_pretty(&written)?
    };
    file.write_all(encoded.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

/// One-shot write: create a writer, write a single payload, close it. Used
/// for the per-test JSON documents.
pub fn write_to_file(path: &Path, payload: Payload) -> Result<()> {
    let writer = FileWriter::new(path, false)?;
    let result = writer.write(payload);
    writer.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(fields: &[&str], headers: &[&str]) -> Payload {
        Payload::Record {
            fields: fields.iter().map(|s| s.to_string()).collect(),
            headers: headers.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(Path::new("a.txt")), FileFormat::Txt);
        assert_eq!(detect_format(Path::new("a.CSV")), FileFormat::Csv);
        assert_eq!(detect_format(Path::new("a.json")), FileFormat::Json);
        assert_eq!(detect_format(Path::new("a.yaml")), FileFormat::Unknown);
        assert_eq!(detect_format(Path::new("report")), FileFormat::Unknown);
    }

    #[test]
    fn test_text_lines_get_trailing_newline() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.txt");
        let writer = FileWriter::new(&path, false).unwrap();
        writer
            .write(Payload::Lines(vec!["one".into(), "two".into()]))
            .unwrap();
        writer.close();
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_csv_single_header_row_across_writes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.csv");
        let writer = FileWriter::new(&path, false).unwrap();
        writer.write(record(&["1", "a"], &["n", "s"])).unwrap();
        writer.write(record(&["2", "b"], &["n", "s"])).unwrap();
        writer.close();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["n,s", "1,a", "2,b"]);
    }

    #[test]
    fn test_csv_append_reads_existing_headers() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.csv");
        fs::write(&path, "n,s\n1,a\n").unwrap();

        let writer = FileWriter::new(&path, true).unwrap();
        writer.write(record(&["2", "b"], &["n", "s"])).unwrap();
        writer.close();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().collect::<Vec<_>>(), vec!["n,s", "1,a", "2,b"]);
    }

    #[test]
    fn test_csv_header_mismatch_fails_and_leaves_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.csv");
        fs::write(&path, "n,s\n1,a\n").unwrap();

        let writer = FileWriter::new(&path, true).unwrap();
        let err = writer.write(record(&["2", "b"], &["n", "other"]));
        assert!(err.is_err());
        writer.close();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "n,s\n1,a\n");
    }

    #[test]
    fn test_json_scalar_then_array() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.json");
        let writer = FileWriter::new(&path, false).unwrap();

        writer
            .write(Payload::Json {
                value: serde_json::json!({"a": 1}),
                flatten: false,
            })
            .unwrap();
        let first: Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(first.is_object());

        writer
            .write(Payload::Json {
                value: serde_json::json!({"b": 2}),
                flatten: false,
            })
            .unwrap();
        writer.close();

        let second: Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let items = second.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["a"], 1);
        assert_eq!(items[1]["b"], 2);
    }

    #[test]
    fn test_json_flatten_merges_slice_elements() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.json");
        let writer = FileWriter::new(&path, false).unwrap();

        writer
            .write(Payload::Json {
                value: serde_json::json!(1),
                flatten: false,
            })
            .unwrap();
        writer
            .write(Payload::Json {
                value: serde_json::json!([2, 3]),
                flatten: true,
            })
            .unwrap();
        writer.close();

        let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value, serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let temp = TempDir::new().unwrap();
        assert!(FileWriter::new(&temp.path().join("out.xml"), false).is_err());
    }

    #[test]
    fn test_payload_format_mismatch() {
        let temp = TempDir::new().unwrap();
        let writer = FileWriter::new(&temp.path().join("out.txt"), false).unwrap();
        let err = writer.write(Payload::Json {
            value: Value::Null,
            flatten: false,
        });
        assert!(err.is_err());
    }
}
