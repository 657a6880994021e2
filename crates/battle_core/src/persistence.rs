//! Battle result persistence
//!
//! The controller hands every finished battle to a [`ResultSink`] exactly
//! once. Recording is best effort: a failing sink is logged and the
//! session keeps its result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::config::{BattleMode, Difficulty};
use crate::error::{BattleError, Result};
use crate::opponent::OpponentDescriptor;
use crate::reward::RewardPayload;
use crate::session::{BattleOutcome, RoundOutcome, Score, SessionId};

/// Archived result of one battle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleRecord {
    pub session_id: SessionId,
    pub category: String,
    pub difficulty: Difficulty,
    pub mode: BattleMode,
    pub final_score: Score,
    pub rewards: RewardPayload,
    pub outcome: BattleOutcome,
    pub was_bot: bool,
    pub opponent: Option<OpponentDescriptor>,
    pub rounds: Vec<RoundOutcome>,
    pub finished_at: DateTime<Utc>,
}

/// Destination for finished battles
pub trait ResultSink: Send + Sync {
    fn record_battle_result(&self, record: &BattleRecord) -> Result<()>;
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn record_battle_result(&self, _record: &BattleRecord) -> Result<()> {
        Ok(())
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<BattleRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<BattleRecord> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

impl ResultSink for MemorySink {
    fn record_battle_result(&self, record: &BattleRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }
}

/// Appends one JSON object per line
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every record in a JSON-lines file
    pub fn read_all(path: &Path) -> Result<Vec<BattleRecord>> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

impl ResultSink for JsonlSink {
    fn record_battle_result(&self, record: &BattleRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;

        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BattleError::Persistence(format!("{}: {e}", self.path.display())))?;
        writeln!(file, "{line}")?;

        debug!(session_id = %record.session_id, path = %self.path.display(), "Battle result appended");
        Ok(())
    }
}
