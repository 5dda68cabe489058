//! Append-only line store backing the persistence adapter.
//!
//! Each record occupies one line, `<persisted-at>,<payload>`, where the
//! timestamp is RFC 3339 and the payload has `\`, LF and CR escaped so that
//! multi-line formatter output stays on a single line.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;

const DELIMITER: char = ',';

/// A payload read back from the store together with its write time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistedLine {
    pub persisted_at: DateTime<Utc>,
    pub payload: String,
}

/// Line-oriented append-only file.
pub struct TextStore {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl TextStore {
    /// Open `path` for appending, creating the file and any missing parent
    /// directories.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to the operating system.
    pub fn append(&mut self, persisted_at: DateTime<Utc>, payload: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "{}{DELIMITER}{}",
            persisted_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            escape(payload)
        )?;
        self.writer.flush()
    }

    /// Read at most `count` records from the start of the file.
    ///
    /// Lines that are not UTF-8 or do not carry a valid timestamp prefix
    /// are skipped.
    pub fn read(&self, count: usize) -> io::Result<Vec<PersistedLine>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        let mut raw = Vec::new();
        while records.len() < count {
            raw.clear();
            if reader.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            let Ok(line) = std::str::from_utf8(&raw) else {
                debug!("TextStore: skipping non UTF-8 line in {}", self.path.display());
                continue;
            };
            let line = line.trim_end_matches(['\n', '\r']);
            match parse_line(line) {
                Some(record) => records.push(record),
                None => debug!("TextStore: skipping malformed line in {}", self.path.display()),
            }
        }
        Ok(records)
    }

    /// Remove every record.
    pub fn truncate(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().set_len(0)
    }
}

fn parse_line(line: &str) -> Option<PersistedLine> {
    let (stamp, payload) = line.split_once(DELIMITER)?;
    let persisted_at = DateTime::parse_from_rfc3339(stamp).ok()?.with_timezone(&Utc);
    Some(PersistedLine {
        persisted_at,
        payload: unescape(payload),
    })
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
