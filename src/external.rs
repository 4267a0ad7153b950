// 📥 External files - per-organization card usage reports
//
// One file per organization, windows-1251, comma-delimited, no header,
// 17 positional columns. The organization key is the last `_` token of the
// file stem ("report_2024_FS.csv" → "FS").

use crate::error::{ReconcileError, Result};
use csv::{ReaderBuilder, StringRecord};
use encoding_rs::WINDOWS_1251;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const EXTERNAL_COLUMNS: usize = 17;

const COL_NUMBER: usize = 0;
const COL_DATE: usize = 1;
const COL_TYPE: usize = 3;
const COL_CODE: usize = 4;
const COL_NAME: usize = 5;
const COL_AMOUNT: usize = 7;
const COL_ORG: usize = 11;

// ============================================================================
// EXTERNAL ROW
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRow {
    pub card_number: String,
    pub date: String,
    pub type_: String,
    pub code: String,
    pub full_name: String,
    pub amount: String,
    pub organization_label: String,
    pub line: usize,
}

/// Full name split as "Last First [Middle...]"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonName {
    pub last: String,
    pub first: String,
    pub middle: Option<String>,
}

impl PersonName {
    /// "First Middle", or just "First" when there is no middle name
    pub fn first_middle(&self) -> String {
        match &self.middle {
            Some(middle) => format!("{} {}", self.first, middle),
            None => self.first.clone(),
        }
    }
}

pub fn split_name(full_name: &str) -> Option<PersonName> {
    let mut tokens = full_name.split_whitespace();
    let last = tokens.next()?.to_string();
    let first = tokens.next()?.to_string();
    let rest: Vec<&str> = tokens.collect();

    Some(PersonName {
        last,
        first,
        middle: if rest.is_empty() { None } else { Some(rest.join(" ")) },
    })
}

/// Names compared token-wise, so stray spaces do not count as a new person
pub fn same_person(a: &str, b: &str) -> bool {
    a.split_whitespace().eq(b.split_whitespace())
}

impl ExternalRow {
    pub fn from_record(record: &StringRecord, file: &str, line: usize) -> Result<Self> {
        if record.len() < EXTERNAL_COLUMNS {
            return Err(ReconcileError::structural(
                file,
                line,
                format!("expected {} columns, found {}", EXTERNAL_COLUMNS, record.len()),
            ));
        }

        let col = |idx: usize| record.get(idx).unwrap_or("").trim().to_string();

        let row = ExternalRow {
            card_number: col(COL_NUMBER),
            date: col(COL_DATE),
            type_: col(COL_TYPE),
            code: col(COL_CODE),
            full_name: col(COL_NAME),
            amount: col(COL_AMOUNT),
            organization_label: col(COL_ORG),
            line,
        };

        if row.card_number.is_empty() {
            return Err(ReconcileError::structural(file, line, "empty card number"));
        }

        Ok(row)
    }

    pub fn name(&self, file: &str) -> Result<PersonName> {
        split_name(&self.full_name).ok_or_else(|| {
            ReconcileError::structural(
                file,
                self.line,
                format!("name '{}' needs at least last and first name", self.full_name),
            )
        })
    }
}

// ============================================================================
// EXTERNAL FILE
// ============================================================================

/// One downloaded report: its file name and raw bytes
#[derive(Debug, Clone)]
pub struct ExternalFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// A row that failed to parse, kept so a lenient run can report it
#[derive(Debug, Clone)]
pub struct SkippedRow {
    pub file: String,
    pub line: usize,
    pub reason: String,
}

impl ExternalFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        ExternalFile {
            name: name.into(),
            bytes,
        }
    }

    /// Organization key encoded in the file name
    pub fn org_key(&self) -> &str {
        org_key_from_file_name(&self.name)
    }

    pub fn decode(&self) -> String {
        let (text, _, had_errors) = WINDOWS_1251.decode(&self.bytes);
        if had_errors {
            tracing::warn!(file = %self.name, "file contains bytes outside windows-1251");
        }
        text.into_owned()
    }

    /// Parse every row; with `skip_malformed` structural errors are collected
    /// instead of returned
    pub fn rows(&self, skip_malformed: bool) -> Result<(Vec<ExternalRow>, Vec<SkippedRow>)> {
        let text = self.decode();
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        let mut skipped = Vec::new();

        for result in reader.records() {
            let record = result?;
            let line = record.position().map(|p| p.line() as usize).unwrap_or(0);

            match ExternalRow::from_record(&record, &self.name, line) {
                Ok(row) => rows.push(row),
                Err(ReconcileError::Structural { reason, .. }) if skip_malformed => {
                    tracing::warn!(file = %self.name, line, %reason, "malformed external row skipped");
                    skipped.push(SkippedRow {
                        file: self.name.clone(),
                        line,
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok((rows, skipped))
    }
}

pub fn org_key_from_file_name(file_name: &str) -> &str {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    stem.rsplit('_').next().unwrap_or(stem)
}

// ============================================================================
// SOURCES
// ============================================================================

/// Where external reports come from
pub trait ExternalSource {
    /// All reports, ordered by file name
    fn files(&self) -> Result<Vec<ExternalFile>>;
}

/// `*.csv` files of a local staging directory
pub struct LocalDirSource {
    dir: PathBuf,
}

impl LocalDirSource {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        LocalDirSource { dir: dir.into() }
    }
}

pub fn is_csv(name: &str) -> bool {
    name.ends_with(".csv")
}

impl ExternalSource for LocalDirSource {
    fn files(&self) -> Result<Vec<ExternalFile>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .filter(|path| path.file_name().and_then(|n| n.to_str()).is_some_and(is_csv))
            .collect();
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            files.push(ExternalFile::new(name, fs::read(&path)?));
        }

        tracing::info!(dir = %self.dir.display(), files = files.len(), "external files found");
        Ok(files)
    }
}

/// In-memory source, handy for tests and for callers that already hold bytes
impl ExternalSource for Vec<ExternalFile> {
    fn files(&self) -> Result<Vec<ExternalFile>> {
        let mut files = self.clone();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

// ============================================================================
// TESTS
// ============================================================================
