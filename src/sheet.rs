//! Spreadsheet-side I/O: reading CSV uploads into rows and writing decoded
//! contacts back out as CSV or JSON.

use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::decode::{ContactRow, COLUMNS};
use crate::mapping::Row;

/// A parsed CSV upload: trimmed header in source order plus one map per row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Read CSV text. Header cells are trimmed and empty ones dropped; rows whose
/// cells are all blank are dropped; missing trailing cells read as empty.
pub fn read_csv<R: Read>(reader: R) -> Result<Sheet> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .context("failed to read CSV header")?
        .clone();

    let mut columns: Vec<(usize, String)> = Vec::new();
    for (idx, raw) in headers.iter().enumerate() {
        let name = raw.trim_start_matches('\u{feff}').trim();
        if name.is_empty() {
            continue;
        }
        if columns.iter().any(|(_, existing)| existing == name) {
            warn!(column = name, "duplicate CSV column ignored");
            continue;
        }
        columns.push((idx, name.to_string()));
    }

    let mut rows = Vec::new();
    for (line, record) in csv_reader.records().enumerate() {
        let record = record.with_context(|| format!("failed to read CSV record {}", line + 1))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let row: Row = columns
            .iter()
            .map(|(idx, name)| (name.clone(), record.get(*idx).unwrap_or_default().to_string()))
            .collect();
        rows.push(row);
    }

    debug!(columns = columns.len(), rows = rows.len(), "read CSV sheet");
    Ok(Sheet {
        columns: columns.into_iter().map(|(_, name)| name).collect(),
        rows,
    })
}

pub fn read_csv_path(path: &Path) -> Result<Sheet> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open CSV file {}", path.display()))?;
    read_csv(file).with_context(|| format!("failed to parse CSV file {}", path.display()))
}

/// Output format for decoded contacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub fn default_file_name(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "contacts.csv",
            OutputFormat::Json => "contacts.json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Csv => f.write_str("csv"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{other}' (expected csv or json)")),
        }
    }
}

/// CSV with the fixed decoded column set and CRLF record terminators.
pub fn write_csv<W: Write>(rows: &[ContactRow], writer: W) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(writer);

    csv_writer
        .write_record(COLUMNS)
        .context("failed to write CSV header")?;
    for row in rows {
        csv_writer
            .write_record(row.values())
            .context("failed to write CSV record")?;
    }
    csv_writer.flush().context("failed to flush CSV output")?;
    Ok(())
}

/// JSON array of objects keyed by the decoded column names.
pub fn write_json<W: Write>(rows: &[ContactRow], mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, rows).context("failed to serialize contacts as JSON")?;
    writeln!(writer).context("failed to write JSON output")?;
    Ok(())
}

pub fn render(rows: &[ContactRow], format: OutputFormat) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    match format {
        OutputFormat::Csv => write_csv(rows, &mut buffer)?,
        OutputFormat::Json => write_json(rows, &mut buffer)?,
    }
    Ok(buffer)
}

/// Replace `target` through a temporary sibling file and a rename, so readers
/// never observe a half-written export.
pub fn write_atomic(target: &Path, data: &[u8]) -> Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        Some(_) => PathBuf::from("."),
        None => return Err(anyhow!("target path has no parent: {}", target.display())),
    };
    fs::create_dir_all(&parent)
        .with_context(|| format!("failed to create parent dir {}", parent.display()))?;

    let file_name = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("vcfsheet");
    let mut counter: u32 = 0;
    let temp_path = loop {
        let candidate = if counter == 0 {
            parent.join(format!(".{file_name}.tmp"))
        } else {
            parent.join(format!(".{file_name}.{counter}.tmp"))
        };
        if !candidate.exists() {
            break candidate;
        }
        counter += 1;
    };

    {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .with_context(|| {
                format!(
                    "failed to create temporary file {} for atomic write",
                    temp_path.display()
                )
            })?;
        file.write_all(data)
            .with_context(|| format!("failed to write temporary file {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to sync temporary file {}", temp_path.display()))?;
    }

    fs::rename(&temp_path, target).with_context(|| {
        format!(
            "failed to rename temporary file {} to {}",
            temp_path.display(),
            target.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_trimmed_header_and_skips_blank_rows() {
        let input = "\u{feff} 姓名 ,电话,,备注\n张三, 138 0013 8000 ,x,hi\n,,,\n李四,139\n";
        let sheet = read_csv(input.as_bytes()).unwrap();

        assert_eq!(sheet.columns, vec!["姓名", "电话", "备注"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0]["姓名"], "张三");
        assert_eq!(sheet.rows[0]["电话"], " 138 0013 8000 ");
        assert_eq!(sheet.rows[0]["备注"], "hi");
        assert_eq!(sheet.rows[1]["备注"], "");
    }

    #[test]
    fn header_only_csv_has_no_rows() {
        let sheet = read_csv("Name,Phone\n".as_bytes()).unwrap();
        assert_eq!(sheet.columns, vec!["Name", "Phone"]);
        assert!(sheet.rows.is_empty());
    }

    #[test]
    fn duplicate_columns_keep_first() {
        let sheet = read_csv("Name,Name\na,b\n".as_bytes()).unwrap();
        assert_eq!(sheet.columns, vec!["Name"]);
        assert_eq!(sheet.rows[0]["Name"], "a");
    }

    #[test]
    fn csv_output_has_fixed_header() {
        let row = ContactRow {
            formatted_name: "Acme, Inc.".to_string(),
            tels: "1 (CELL) | 2".to_string(),
            ..ContactRow::default()
        };
        let out = String::from_utf8(render(&[row], OutputFormat::Csv).unwrap()).unwrap();
        let mut lines = out.split("\r\n");

        assert_eq!(lines.next().unwrap(), COLUMNS.join(","));
        let record = lines.next().unwrap();
        assert!(record.contains("\"Acme, Inc.\""));
        assert!(record.contains("1 (CELL) | 2"));
    }

    #[test]
    fn json_output_uses_column_names() {
        let row = ContactRow {
            formatted_name: "张三".to_string(),
            ..ContactRow::default()
        };
        let out = render(&[row], OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["FN"], "张三");
        assert_eq!(value[0]["ADR_Country"], "");
    }

    #[test]
    fn output_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xlsx".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Json.default_file_name(), "contacts.json");
    }

    #[test]
    fn atomic_write_replaces_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested").join("contacts-3.0.vcf");

        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "second");
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
