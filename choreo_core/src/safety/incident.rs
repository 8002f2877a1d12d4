//! Durable incident records
//!
//! Every directive at Moderate or above produces an `Incident` appended to
//! a JSON-lines log. The log is append-only; nothing in the kernel ever
//! rewrites it.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::ChoreoResult;
use crate::safety::{AffectedJoints, RequiredAction, Severity};

/// One recorded safety event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub reason: String,
    pub affected: AffectedJoints,
    pub actions: Vec<RequiredAction>,
    /// Sensor-sample-to-directive latency actually measured, milliseconds
    pub latency_ms: u64,
}

impl Incident {
    pub fn new(
        severity: Severity,
        reason: String,
        affected: AffectedJoints,
        actions: Vec<RequiredAction>,
        latency_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity,
            reason,
            affected,
            actions,
            latency_ms,
        }
    }
}

/// Append-only JSON-lines incident log
pub struct IncidentLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl IncidentLog {
    /// Open (creating if needed) the log at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> ChoreoResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one incident as a JSON line and flush
    pub fn append(&self, incident: &Incident) -> ChoreoResult<()> {
        let line = serde_json::to_string(incident)?;
        let mut file = self.file.lock();
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }

    /// Read a whole log back (diagnostics, tests)
    pub fn read_all<P: AsRef<Path>>(path: P) -> ChoreoResult<Vec<Incident>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut incidents = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            incidents.push(serde_json::from_str(&line)?);
        }
        Ok(incidents)
    }
}
