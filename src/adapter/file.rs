//! Casbin CSV policy file
//!
//! One rule per line: `p, alice, data1, read`. Lines starting with `#` and
//! blank lines are ignored. Fields are trimmed and may be double-quoted to
//! contain commas (`""` escapes a quote inside a quoted field); the opening
//! quote must directly follow the separating comma.

use super::{load_row, Adapter, RuleRows};
use crate::error::{Error, Result};
use crate::model::Model;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Policy store backed by a CSV file
///
/// Every mutation rewrites the file through a temporary sibling and an
/// atomic rename, so readers never observe a half-written file.
#[derive(Debug, Clone)]
pub struct FileAdapter {
    path: PathBuf,
}

impl FileAdapter {
    /// A missing file is treated as an empty policy
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileAdapter { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self) -> Result<RuleRows> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Policy file does not exist yet");
                return Ok(RuleRows::default());
            }
            Err(e) => {
                return Err(Error::store(
                    format!("reading policy file {}", self.path.display()),
                    e,
                ))
            }
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(file);

        let mut rows = RuleRows::default();
        for record in reader.records() {
            let record = record.map_err(|e| self.csv_error(e))?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            if record.len() < 2 || record[0].is_empty() {
                let line = record.position().map_or(0, |p| p.line());
                return Err(Error::InvalidPolicy(format!(
                    "{}:{}: expected 'ptype, field, ...', found {:?}",
                    self.path.display(),
                    line,
                    record.iter().collect::<Vec<_>>()
                )));
            }
            let rule: Vec<String> = record.iter().skip(1).map(str::to_string).collect();
            rows.push(&record[0], &rule);
        }
        Ok(rows)
    }

    fn csv_error(&self, e: csv::Error) -> Error {
        if e.is_io_error() {
            return Error::store(format!("reading policy file {}", self.path.display()), e);
        }
        let line = e.position().map_or(0, |p| p.line());
        Error::InvalidPolicy(format!("{}:{}: {}", self.path.display(), line, e))
    }

    fn write_rows(&self, rows: &RuleRows) -> Result<()> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "policy".to_string());
        let temp = self.path.with_file_name(format!(".{}.tmp", file_name));

        let write = || -> std::result::Result<(), csv::Error> {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(&temp)?;
            for (ptype, rule) in rows.rows() {
                writer.write_record(
                    std::iter::once(ptype.as_str()).chain(rule.iter().map(String::as_str)),
                )?;
            }
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
            fs::rename(&temp, &self.path)?;
            Ok(())
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&temp);
            Error::store(format!("writing policy file {}", self.path.display()), e)
        })
    }

    /// Read, apply `change`, and write back only if it reported a change
    fn update(&self, change: impl FnOnce(&mut RuleRows) -> bool) -> Result<bool> {
        let mut rows = self.read_rows()?;
        if !change(&mut rows) {
            return Ok(false);
        }
        self.write_rows(&rows)?;
        Ok(true)
    }
}

impl Adapter for FileAdapter {
    fn load_policy(&mut self, model: &mut Model) -> Result<()> {
        let rows = self.read_rows()?;
        for (ptype, rule) in rows.rows() {
            load_row(model, ptype, rule.clone())?;
        }
        info!(path = %self.path.display(), rules = rows.rows().len(), "Loaded policy file");
        Ok(())
    }

    fn save_policy(&mut self, model: &Model) -> Result<()> {
        self.write_rows(&RuleRows::from_model(model))
    }

    fn add_policy(&mut self, ptype: &str, rule: &[String]) -> Result<bool> {
        self.update(|rows| rows.push(ptype, rule))
    }

    fn add_policies(&mut self, ptype: &str, rules: &[Vec<String>]) -> Result<bool> {
        self.update(|rows| rows.add_all(ptype, rules))
    }

    fn remove_policy(&mut self, ptype: &str, rule: &[String]) -> Result<bool> {
        self.update(|rows| rows.remove_all(ptype, &[rule.to_vec()]))
    }

    fn remove_policies(&mut self, ptype: &str, rules: &[Vec<String>]) -> Result<bool> {
        self.update(|rows| rows.remove_all(ptype, rules))
    }

    fn remove_filtered_policy(
        &mut self,
        ptype: &str,
        field_index: usize,
        values: &[String],
    ) -> Result<bool> {
        self.update(|rows| rows.remove_filtered(ptype, field_index, values))
    }

    fn clear_policy(&mut self) -> Result<()> {
        self.write_rows(&RuleRows::default())
    }
}
