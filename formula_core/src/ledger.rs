//! Append-only ledger of accepted formulas.
//!
//! Formulas are appended to a JSONL (JSON Lines) file per user with file
//! locking to ensure safe concurrent access. The ledger is also where the
//! caller gets the prior version number for the next acceptance.

use crate::{AcceptedFormula, Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Sink trait for persisting accepted formulas
pub trait FormulaSink {
    fn append(&mut self, formula: &AcceptedFormula) -> Result<()>;
}

/// JSONL-based formula ledger with file locking
pub struct JsonlLedger {
    path: PathBuf,
}

impl JsonlLedger {
    /// Create a new ledger for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ledger file for a user inside a data directory
    pub fn for_user(data_dir: &Path, user: &str) -> Result<Self> {
        if user.is_empty()
            || !user
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::Ledger(format!("Invalid user id '{}'", user)));
        }
        Ok(Self::new(data_dir.join("formulas").join(format!("{}.jsonl", user))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl FormulaSink for JsonlLedger {
    fn append(&mut self, formula: &AcceptedFormula) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        // Acquire exclusive lock
        file.lock_exclusive()?;

        // Re-check under the lock so two writers cannot both claim a version
        let latest = latest_version_unlocked(&self.path)?;
        if let Some(latest) = latest {
            if formula.version <= latest {
                file.unlock()?;
                return Err(Error::Ledger(format!(
                    "Formula version {} is not newer than recorded version {}",
                    formula.version, latest
                )));
            }
        }

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(formula)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        tracing::debug!(
            "Appended formula {} (version {}) to ledger",
            formula.id,
            formula.version
        );
        Ok(())
    }
}

fn parse_lines(file: &File) -> Result<Vec<AcceptedFormula>> {
    let reader = BufReader::new(file);
    let mut formulas = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<AcceptedFormula>(&line) {
            Ok(formula) => formulas.push(formula),
            Err(e) => {
                tracing::warn!("Failed to parse formula at line {}: {}", line_num + 1, e);
                // Continue reading, don't fail completely
            }
        }
    }

    Ok(formulas)
}

fn latest_version_unlocked(path: &Path) -> Result<Option<u32>> {
    let file = File::open(path)?;
    Ok(parse_lines(&file)?.iter().map(|f| f.version).max())
}

/// Read all formulas from a ledger file
pub fn read_formulas(path: &Path) -> Result<Vec<AcceptedFormula>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    // Acquire shared lock for reading
    file.lock_shared()?;
    let formulas = parse_lines(&file);
    file.unlock()?;

    let formulas = formulas?;
    tracing::debug!("Read {} formulas from ledger", formulas.len());
    Ok(formulas)
}

/// Highest version recorded in a ledger, if any
pub fn latest_version(path: &Path) -> Result<Option<u32>> {
    Ok(read_formulas(path)?.iter().map(|f| f.version).max())
}
