//! Durable per-patient state
//!
//! The store owns the mapping from medical record number to demographics and
//! result history, bootstraps it from disk at startup, and checkpoints the
//! full database after every processed frame.
//!
//! # Bootstrap precedence
//!
//! 1. Warm path: a snapshot from a previous run exists, deserialize it.
//! 2. Cold path: load the historical results CSV, replay the recovery log of
//!    PAS admission pairs through the same admission logic used at runtime,
//!    then checkpoint immediately so the next restart takes the warm path.
//!
//! # Durability
//!
//! Checkpoints are full-database snapshots written to a temp file in the
//! snapshot directory and renamed over the target, so a crash mid-write
//! leaves the previous snapshot intact (at-least-once recovery, never a
//! half-written database).

use crate::config::StateConfig;
use crate::error::{Error, Result};
use crate::hl7::{self, ParsedMessage, Sex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Demographics and result history for one patient
///
/// `results` is append-only and chronological. `sex`/`age` are overwritten
/// on each admission and stay `None` for patients whose results arrive
/// before any admission message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatientRecord {
    pub results: Vec<f64>,
    pub sex: Option<Sex>,
    pub age: Option<u32>,
}

/// The complete patient database
pub type Database = BTreeMap<String, PatientRecord>;

/// Durable patient state with snapshot-backed recovery
pub struct PatientStore {
    snapshot_path: PathBuf,
    db: Database,
}

impl PatientStore {
    /// Build the store from disk, preferring a prior snapshot.
    pub fn bootstrap(config: &StateConfig) -> Result<Self> {
        let snapshot_path = PathBuf::from(&config.snapshot_path);

        if snapshot_path.exists() {
            let db = load_snapshot(&snapshot_path)?;
            log::info!(
                "Restored snapshot: {} patients from {}",
                db.len(),
                snapshot_path.display()
            );
            return Ok(Self { snapshot_path, db });
        }

        log::info!("No snapshot found, building database from cold sources");
        let mut db = Database::new();
        load_history_csv(&mut db, Path::new(&config.history_csv))?;
        let replayed = replay_recovery_log(&mut db, Path::new(&config.recovery_log))?;
        log::info!(
            "Cold bootstrap complete: {} patients ({} admissions replayed)",
            db.len(),
            replayed
        );

        let store = Self { snapshot_path, db };
        store.checkpoint()?;
        Ok(store)
    }

    /// Store wrapping an already-built database (tests, evaluation tooling).
    pub fn with_database(snapshot_path: impl Into<PathBuf>, db: Database) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            db,
        }
    }

    /// Overwrite demographics for `mrn`, creating the record if unseen.
    ///
    /// Idempotent: applying the same admission twice leaves identical state.
    /// Result history is never touched.
    pub fn apply_admission(&mut self, mrn: &str, sex: Sex, age: u32) {
        let record = self.db.entry(mrn.to_string()).or_default();
        record.sex = Some(sex);
        record.age = Some(age);
    }

    /// Append a result to `mrn`'s history, creating a demographics-less
    /// record for unseen identifiers. Returns the updated record.
    pub fn apply_lab_result(&mut self, mrn: &str, value: f64) -> &PatientRecord {
        let record = self.db.entry(mrn.to_string()).or_default();
        record.results.push(value);
        record
    }

    /// Look up a patient record.
    pub fn get(&self, mrn: &str) -> Option<&PatientRecord> {
        self.db.get(mrn)
    }

    /// Number of known patients.
    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// Whether the database holds no patients.
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Write a full snapshot of the database.
    ///
    /// The snapshot lands in a temp file next to the target and is renamed
    /// into place, so the prior snapshot stays valid until the new one is
    /// fully flushed.
    pub fn checkpoint(&self) -> Result<()> {
        let tmp_path = self.snapshot_path.with_extension("tmp");
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        serde_json::to_writer(&mut writer, &self.db)?;
        // Flush and sync before the rename: a dropped BufWriter swallows
        // write errors, which could install a truncated snapshot
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.snapshot_path)?;
        Ok(())
    }
}

/// Deserialize a snapshot file.
fn load_snapshot(path: &Path) -> Result<Database> {
    let file = File::open(path)?;
    let db = serde_json::from_reader(BufReader::new(file))?;
    Ok(db)
}

/// Load the historical results CSV.
///
/// Row format: `mrn,<date>,result,<date>,result,...` with a header row.
/// Result values sit in columns 2, 4, 6, ...; empty cells are skipped.
fn load_history_csv(db: &mut Database, path: &Path) -> Result<()> {
    let file = File::open(path)?;
    for (line_no, line) in BufReader::new(file).lines().enumerate().skip(1) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut cells = line.split(',');
        let mrn = cells
            .next()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| Error::Parse(format!("history line {}: missing mrn", line_no + 1)))?;

        let mut results = Vec::new();
        for (i, cell) in cells.enumerate() {
            // Odd positions after the mrn are dates, even are results
            if i % 2 == 1 && !cell.is_empty() {
                let value: f64 = cell.parse().map_err(|e| {
                    Error::Parse(format!("history line {}: bad result {:?}: {}", line_no + 1, cell, e))
                })?;
                results.push(value);
            }
        }

        db.insert(
            mrn.to_string(),
            PatientRecord {
                results,
                sex: None,
                age: None,
            },
        );
    }
    Ok(())
}

/// Replay the recovery log of paired PAS admission segments.
///
/// The log is an operational backfill source: two header lines followed by
/// MSH/PID line pairs. Each pair runs through the runtime admission parser;
/// discharges and unparseable pairs are skipped with a warning.
fn replay_recovery_log(db: &mut Database, path: &Path) -> Result<usize> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines().skip(2);
    let mut replayed = 0usize;

    while let Some(first) = lines.next() {
        let msh = first?.trim().to_string();
        if msh.is_empty() {
            continue;
        }
        let Some(second) = lines.next() else {
            log::warn!("Recovery log ends with an unpaired segment, ignoring");
            break;
        };
        let pid = second?.trim().to_string();

        match hl7::parse(&[msh, pid]) {
            Ok(ParsedMessage::Admission { mrn, sex, age }) => {
                let record = db.entry(mrn).or_default();
                record.sex = Some(sex);
                record.age = Some(age);
                replayed += 1;
            }
            Ok(ParsedMessage::Discharge { .. }) => {}
            Ok(other) => log::warn!("Recovery log pair is not a PAS event: {:?}", other),
            Err(e) => log::warn!("Skipping unparseable recovery log pair: {}", e),
        }
    }
    Ok(replayed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn state_config(dir: &TempDir) -> StateConfig {
        write_file(
            dir,
            "history.csv",
            "mrn,date0,result0,date1,result1\n\
             497030,2024-01-01 06:12:00,68.58,2024-01-09 09:45:00,70.58\n\
             265445,2024-01-02 07:00:00,116.05,,\n",
        );
        write_file(
            dir,
            "backup.txt",
            "recovery log\n\
             ----\n\
             MSH|^~\\&|SIMULATION|SOUTH RIVERSIDE|||20240102135300||ADT^A01|||2.5\n\
             PID|1||497030||ROSCOE DOHERTY||19870515|M\n\
             MSH|^~\\&|SIMULATION|SOUTH RIVERSIDE|||20240310134000||ADT^A01|||2.5\n\
             PID|1||160116||AJAY BURTON||20010829|F\n",
        );
        StateConfig {
            snapshot_path: dir.path().join("database.json").display().to_string(),
            history_csv: dir.path().join("history.csv").display().to_string(),
            recovery_log: dir.path().join("backup.txt").display().to_string(),
        }
    }

    #[test]
    fn test_cold_bootstrap_merges_csv_and_recovery_log() {
        let dir = TempDir::new().unwrap();
        let store = PatientStore::bootstrap(&state_config(&dir)).unwrap();

        let roscoe = store.get("497030").unwrap();
        assert_eq!(roscoe.results, vec![68.58, 70.58]);
        assert_eq!(roscoe.sex, Some(Sex::Male));
        assert_eq!(roscoe.age, Some(36));

        // In the CSV only: results without demographics
        let from_csv = store.get("265445").unwrap();
        assert_eq!(from_csv.results, vec![116.05]);
        assert_eq!(from_csv.sex, None);

        // In the recovery log only: demographics without results
        let from_log = store.get("160116").unwrap();
        assert!(from_log.results.is_empty());
        assert_eq!(from_log.sex, Some(Sex::Female));
        assert_eq!(from_log.age, Some(22));
    }

    #[test]
    fn test_warm_bootstrap_equals_cold_bootstrap() {
        let dir = TempDir::new().unwrap();
        let config = state_config(&dir);

        let cold = PatientStore::bootstrap(&config).unwrap();
        // Cold path checkpoints immediately, so a second bootstrap is warm
        let warm = PatientStore::bootstrap(&config).unwrap();

        assert_eq!(cold.db, warm.db);
    }

    #[test]
    fn test_admission_overwrites_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut store =
            PatientStore::with_database(dir.path().join("db.json"), Database::new());

        store.apply_admission("497030", Sex::Male, 36);
        store.apply_admission("497030", Sex::Male, 36);
        let once = store.get("497030").unwrap().clone();
        assert_eq!(once.sex, Some(Sex::Male));
        assert_eq!(once.age, Some(36));

        // Re-admission overwrites demographics, keeps history
        store.apply_lab_result("497030", 70.0);
        store.apply_admission("497030", Sex::Female, 37);
        let record = store.get("497030").unwrap();
        assert_eq!(record.sex, Some(Sex::Female));
        assert_eq!(record.age, Some(37));
        assert_eq!(record.results, vec![70.0]);
    }

    #[test]
    fn test_lab_result_before_admission() {
        let dir = TempDir::new().unwrap();
        let mut store =
            PatientStore::with_database(dir.path().join("db.json"), Database::new());

        let record = store.apply_lab_result("999999", 88.1);
        assert_eq!(record.results, vec![88.1]);
        assert_eq!(record.sex, None);
        assert_eq!(record.age, None);
    }

    #[test]
    fn test_history_is_monotonic() {
        let dir = TempDir::new().unwrap();
        let mut store =
            PatientStore::with_database(dir.path().join("db.json"), Database::new());
        store.apply_admission("1", Sex::Male, 50);

        let mut last_len = 0;
        for value in [10.0, 20.0, 30.0] {
            let record = store.apply_lab_result("1", value);
            assert!(record.results.len() > last_len);
            last_len = record.results.len();
        }
        // Admissions and discharges never shrink history
        store.apply_admission("1", Sex::Male, 50);
        assert_eq!(store.get("1").unwrap().results.len(), last_len);
    }

    #[test]
    fn test_checkpoint_flushes_past_writer_buffer() {
        // Enough patients to exceed BufWriter's default 8 KiB buffer, so a
        // missed flush would truncate the snapshot
        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("db.json");
        let mut db = Database::new();
        for i in 0..2000 {
            db.insert(
                format!("{:06}", i),
                PatientRecord {
                    results: vec![68.58, 70.58, 116.05],
                    sex: Some(Sex::Male),
                    age: Some(40),
                },
            );
        }
        let store = PatientStore::with_database(&snapshot, db);
        store.checkpoint().unwrap();

        let reloaded = load_snapshot(&snapshot).unwrap();
        assert_eq!(reloaded.len(), 2000);
        assert_eq!(reloaded, store.db);
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("db.json");
        let mut store = PatientStore::with_database(&snapshot, Database::new());
        store.apply_admission("497030", Sex::Female, 36);
        store.apply_lab_result("497030", 70.69681868961705);
        store.checkpoint().unwrap();

        let reloaded = load_snapshot(&snapshot).unwrap();
        assert_eq!(reloaded, store.db);
        // No temp file left behind
        assert!(!snapshot.with_extension("tmp").exists());
    }
}
