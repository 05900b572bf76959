//! Shared position store and optimistic cross-process reconciliation.
//!
//! The store file is co-written by the dashboard process. There is no lock:
//! the engine tracks the modification time of its own writes and treats any
//! newer mtime as a foreign edit to be merged by key-set diff. Two writes
//! landing in the same instant can lose one of them; acceptable for a single
//! human co-writer at dashboard edit rates.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use orb_core::error::{EngineError, Result};
use orb_core::position::Position;

/// Persistence seam for the position map. A locking or transactional backend
/// can replace [`JsonFileStore`] without touching the account.
pub trait SharedStore: Send {
    /// Read the full symbol→position mapping. A missing backing file is a
    /// fresh start, not an error.
    fn load(&mut self) -> Result<HashMap<String, Position>>;

    /// Replace the store contents with the given mapping.
    fn save(&mut self, positions: &HashMap<String, Position>) -> Result<()>;

    /// True when the store changed since this handle's last load or save.
    fn modified_externally(&self) -> Result<bool>;
}

/// JSON file backend; one file per strategy agent.
pub struct JsonFileStore {
    path: PathBuf,
    last_mtime: Option<SystemTime>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_mtime: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn current_mtime(&self) -> Result<Option<SystemTime>> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl SharedStore for JsonFileStore {
    fn load(&mut self) -> Result<HashMap<String, Position>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No position store yet, starting empty");
                return Ok(HashMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        let positions: HashMap<String, Position> = serde_json::from_str(&raw)
            .map_err(|e| EngineError::persistence(format!("bad store file: {e}")))?;

        self.last_mtime = self.current_mtime()?;
        Ok(positions)
    }

    fn save(&mut self, positions: &HashMap<String, Position>) -> Result<()> {
        let json = serde_json::to_string_pretty(positions)
            .map_err(|e| EngineError::persistence(e.to_string()))?;
        fs::write(&self.path, json)?;

        // Record our own write so the next sync does not re-read it as a
        // foreign change.
        self.last_mtime = self.current_mtime()?;
        Ok(())
    }

    fn modified_externally(&self) -> Result<bool> {
        let Some(current) = self.current_mtime()? else {
            return Ok(false);
        };
        Ok(match self.last_mtime {
            Some(last) => current > last,
            // File exists but we never touched it: someone else wrote it.
            None => true,
        })
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Symbols adopted from disk (opened externally).
    pub adopted: Vec<String>,
    /// Symbols dropped from memory (closed externally; no trade-log entry,
    /// the external writer already accounted for them).
    pub dropped: Vec<String>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.adopted.is_empty() && self.dropped.is_empty()
    }
}

/// Key-set reconciliation of the in-memory map against a freshly loaded
/// store. Keys present in both are left untouched — memory stays
/// authoritative for them until the engine's next write.
pub fn diff_merge(
    memory: &mut HashMap<String, Position>,
    disk: HashMap<String, Position>,
) -> SyncReport {
    let mut report = SyncReport::default();

    report.dropped = memory
        .keys()
        .filter(|sym| !disk.contains_key(*sym))
        .cloned()
        .collect();
    for sym in &report.dropped {
        memory.remove(sym);
    }

    for (sym, pos) in disk {
        if !memory.contains_key(&sym) {
            memory.insert(sym.clone(), pos);
            report.adopted.push(sym);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orb_core::position::{
        Direction, PositionKind, SettlementPrices, TriggerPrices,
    };
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn position(id: i64, symbol: &str) -> Position {
        Position {
            id,
            symbol: symbol.to_string(),
            quantity: 65,
            direction: Direction::Long,
            entry_time: Utc::now(),
            settlement: SettlementPrices {
                entry: dec!(112.35),
                stop: dec!(80),
                target: dec!(145.5),
            },
            trigger: TriggerPrices {
                symbol: "NSE:NIFTY50-INDEX".to_string(),
                entry: dec!(25135),
                stop: dec!(25080),
                target: Some(dec!(25200)),
            },
            kind: PositionKind::Single,
        }
    }

    #[test]
    fn save_load_round_trip_preserves_the_map() {
        let dir = tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("positions.json"));

        let mut positions = HashMap::new();
        positions.insert("A".to_string(), position(1, "A"));
        positions.insert("B".to_string(), position(2, "B"));
        store.save(&positions).unwrap();

        let mut fresh = JsonFileStore::new(dir.path().join("positions.json"));
        let loaded = fresh.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["A"], positions["A"]);
        assert_eq!(loaded["B"].entry_time, positions["B"].entry_time);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("nope.json"));
        assert!(store.load().unwrap().is_empty());
        assert!(!store.modified_externally().unwrap());
    }

    #[test]
    fn own_writes_are_not_foreign_changes() {
        let dir = tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("positions.json"));
        store.save(&HashMap::new()).unwrap();
        assert!(!store.modified_externally().unwrap());
    }

    #[test]
    fn foreign_write_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.json");
        let mut store = JsonFileStore::new(&path);
        store.save(&HashMap::new()).unwrap();

        // Simulate the dashboard writing the file after our save.
        let future = SystemTime::now() + std::time::Duration::from_secs(5);
        std::fs::write(&path, "{}").unwrap();
        let file = std::fs::File::open(&path).unwrap();
        file.set_modified(future).unwrap();

        assert!(store.modified_externally().unwrap());
    }

    #[test]
    fn diff_merge_adopts_disk_only_keys() {
        let mut memory = HashMap::new();
        memory.insert("A".to_string(), position(1, "A"));

        let mut disk = HashMap::new();
        disk.insert("A".to_string(), position(1, "A"));
        disk.insert("B".to_string(), position(2, "B"));

        let report = diff_merge(&mut memory, disk);
        assert_eq!(report.adopted, vec!["B".to_string()]);
        assert!(report.dropped.is_empty());
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn diff_merge_drops_memory_only_keys() {
        let mut memory = HashMap::new();
        memory.insert("A".to_string(), position(1, "A"));
        memory.insert("B".to_string(), position(2, "B"));

        let mut disk = HashMap::new();
        disk.insert("A".to_string(), position(1, "A"));

        let report = diff_merge(&mut memory, disk);
        assert_eq!(report.dropped, vec!["B".to_string()]);
        assert_eq!(memory.len(), 1);
        assert!(memory.contains_key("A"));
    }

    #[test]
    fn diff_merge_keeps_memory_authoritative_for_shared_keys() {
        let mut memory = HashMap::new();
        let mut mine = position(1, "A");
        mine.quantity = 130;
        memory.insert("A".to_string(), mine.clone());

        let mut disk = HashMap::new();
        disk.insert("A".to_string(), position(9, "A"));

        let report = diff_merge(&mut memory, disk);
        assert!(report.is_empty());
        assert_eq!(memory["A"], mine);
    }
}
