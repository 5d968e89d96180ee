//! Persistent record of validation errors across sanitization runs.
//!
//! Errors are keyed by content identity, so a violation reported again on a
//! re-parsed document lands on the existing record and the reviewer's
//! decision stored there drives what the next pass does. A status nobody
//! reviewed is recomputed on every run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::error::{SanitizerError, SanitizerResult};
use crate::validation::{ErrorStatus, ValidationError, ValidationErrorSink};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub error: ValidationError,
    /// Times reported since the last `begin_run`
    pub occurrences: u32,
    /// Set once a reviewer acknowledged or overrode the record
    #[serde(default)]
    pub reviewed: bool,
    #[serde(skip)]
    seen: bool,
}

impl LedgerEntry {
    pub fn status(&self) -> ErrorStatus {
        self.error.status
    }

    /// Whether the stored status binds the next run.
    pub fn is_reviewed(&self) -> bool {
        self.reviewed || self.error.status.is_acknowledged()
    }

    pub fn seen(&self) -> bool {
        self.seen
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorLedger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl ErrorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml(yaml: &str) -> SanitizerResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> SanitizerResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Read a ledger file. Only a missing file yields an empty ledger; any
    /// other read failure is returned so the file is never overwritten.
    pub fn load(path: impl AsRef<Path>) -> SanitizerResult<Self> {
        match fs::read_to_string(path.as_ref()) {
            Ok(yaml) => Self::from_yaml(&yaml),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("ledger: {} not found, starting empty", path.as_ref().display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> SanitizerResult<()> {
        fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Mark every record unseen before a new run.
    pub fn begin_run(&mut self) {
        for entry in self.entries.values_mut() {
            entry.seen = false;
            entry.occurrences = 0;
        }
    }

    /// Drop unacknowledged records that the run did not report again.
    /// Returns how many were pruned.
    pub fn finish_run(&mut self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.seen || entry.status().is_acknowledged());
        let pruned = before - self.entries.len();
        if pruned > 0 {
            log::debug!("ledger: pruned {} stale error(s)", pruned);
        }
        pruned
    }

    pub fn acknowledge(&mut self, id: &str) -> SanitizerResult<ErrorStatus> {
        let entry = self.entry_mut(id)?;
        entry.error.status = entry.error.status.acknowledge();
        entry.reviewed = true;
        Ok(entry.error.status)
    }

    pub fn override_disposition(&mut self, id: &str) -> SanitizerResult<ErrorStatus> {
        let entry = self.entry_mut(id)?;
        entry.error.status = entry.error.status.override_disposition();
        entry.reviewed = true;
        Ok(entry.error.status)
    }

    pub fn get(&self, id: &str) -> Option<&LedgerEntry> {
        self.entries.get(id)
    }

    /// Records ordered by identity.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LedgerEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, id: &str) -> SanitizerResult<&mut LedgerEntry> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| SanitizerError::UnknownValidationError { id: id.to_string() })
    }
}

impl ValidationErrorSink for ErrorLedger {
    fn report(&mut self, error: &ValidationError) -> Option<ErrorStatus> {
        let id = error.identity();
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.seen = true;
            entry.occurrences += 1;
            if entry.is_reviewed() {
                return Some(entry.error.status);
            }
            // Unreviewed: take whatever this run decided.
            entry.error = error.clone();
            return None;
        }
        self.entries.insert(
            id,
            LedgerEntry {
                error: error.clone(),
                occurrences: 1,
                reviewed: false,
                seen: true,
            },
        );
        None
    }
}
