//! Persisted parking-zone store.
//!
//! Zones are identified by position in the store's ordered sequence; there is
//! no persistent ID. Every mutating operation persists the whole sequence
//! before the in-memory state is updated, so a failed write leaves the store
//! unchanged and a reader of the file never observes a partial sequence.

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::Polygon;

pub struct ZoneStore {
    path: PathBuf,
    zones: Vec<Polygon>,
}

impl ZoneStore {
    /// Open the store at `path`, loading prior state. A missing file is an
    /// empty store, not an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let zones = load_zones(&path)?;
        Ok(Self { path, zones })
    }

    pub fn zones(&self) -> &[Polygon] {
        &self.zones
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Snapshot copy for a single frame's matching pass. Mutations during the
    /// frame do not affect the snapshot.
    pub fn snapshot(&self) -> Vec<Polygon> {
        self.zones.clone()
    }

    /// Append one zone and persist.
    pub fn append(&mut self, polygon: Polygon) -> Result<()> {
        let mut next = self.zones.clone();
        next.push(polygon);
        self.commit(next)
    }

    /// Remove the given positions in one transaction and persist once.
    /// Indices are processed from highest to lowest so earlier removals do
    /// not shift later ones.
    pub fn remove_at(&mut self, indices: &BTreeSet<usize>) -> Result<usize> {
        if indices.is_empty() {
            return Ok(0);
        }
        let mut next = self.zones.clone();
        for &idx in indices.iter().rev() {
            if idx >= next.len() {
                return Err(anyhow!(
                    "zone index {} out of range (store has {} zones)",
                    idx,
                    self.zones.len()
                ));
            }
            next.remove(idx);
        }
        let removed = self.zones.len() - next.len();
        self.commit(next)?;
        Ok(removed)
    }

    /// Pop the most recently appended zone and persist. No-op on an empty
    /// store.
    pub fn undo_last(&mut self) -> Result<bool> {
        if self.zones.is_empty() {
            return Ok(false);
        }
        let mut next = self.zones.clone();
        next.pop();
        self.commit(next)?;
        Ok(true)
    }

    /// Empty the store and persist.
    pub fn clear(&mut self) -> Result<()> {
        self.commit(Vec::new())
    }

    /// Replace the entire contents (auto-layout) and persist.
    pub fn replace_all(&mut self, zones: Vec<Polygon>) -> Result<()> {
        self.commit(zones)
    }

    /// Persist `next`, then commit it to memory. The in-memory sequence is
    /// untouched if the write fails.
    fn commit(&mut self, next: Vec<Polygon>) -> Result<()> {
        save_zones(&self.path, &next)?;
        self.zones = next;
        Ok(())
    }
}

fn load_zones(path: &Path) -> Result<Vec<Polygon>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    let zones: Vec<Polygon> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid zone store {}", path.display()))?;
    Ok(zones)
}

/// Write the whole sequence via a temp file and rename, so a concurrent
/// reader sees either the old or the new store, never a partial write.
fn save_zones(path: &Path, zones: &[Polygon]) -> Result<()> {
    let json = serde_json::to_string(zones)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json.as_bytes())
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;
    use tempfile::TempDir;

    fn poly(seed: i32) -> Polygon {
        Polygon::new(vec![
            Point::new(seed, seed),
            Point::new(seed, seed + 10),
            Point::new(seed + 10, seed + 10),
            Point::new(seed + 10, seed),
        ])
    }

    fn store_in(dir: &TempDir) -> ZoneStore {
        ZoneStore::open(dir.path().join("zones.json")).expect("open store")
    }

    #[test]
    fn missing_file_is_an_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.is_empty());
    }

    #[test]
    fn append_persists_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("zones.json");
        {
            let mut store = ZoneStore::open(&path).unwrap();
            store.append(poly(0)).unwrap();
            store.append(poly(20)).unwrap();
        }
        let reloaded = ZoneStore::open(&path).unwrap();
        assert_eq!(reloaded.zones(), &[poly(0), poly(20)]);
    }

    #[test]
    fn remove_at_deletes_exact_positions_regardless_of_order() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        for seed in [0, 10, 20, 30, 40] {
            store.append(poly(seed)).unwrap();
        }
        // BTreeSet iteration is ascending; removal processes it descending.
        let indices: BTreeSet<usize> = [3, 0, 1].into_iter().collect();
        let removed = store.remove_at(&indices).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.zones(), &[poly(20), poly(40)]);
    }

    #[test]
    fn remove_at_empty_set_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.append(poly(0)).unwrap();
        assert_eq!(store.remove_at(&BTreeSet::new()).unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_at_out_of_range_leaves_store_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.append(poly(0)).unwrap();
        let indices: BTreeSet<usize> = [0, 7].into_iter().collect();
        assert!(store.remove_at(&indices).is_err());
        assert_eq!(store.zones(), &[poly(0)]);
    }

    #[test]
    fn undo_pops_most_recent_and_ignores_empty() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        assert!(!store.undo_last().unwrap());
        store.append(poly(0)).unwrap();
        store.append(poly(10)).unwrap();
        assert!(store.undo_last().unwrap());
        assert_eq!(store.zones(), &[poly(0)]);
    }

    #[test]
    fn clear_and_replace_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("zones.json");
        let mut store = ZoneStore::open(&path).unwrap();
        store.append(poly(0)).unwrap();
        store.replace_all(vec![poly(5), poly(15)]).unwrap();
        assert_eq!(ZoneStore::open(&path).unwrap().len(), 2);
        store.clear().unwrap();
        assert!(ZoneStore::open(&path).unwrap().is_empty());
    }

    #[test]
    fn failed_persist_leaves_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.append(poly(0)).unwrap();
        // Point the store at an unwritable path and try to mutate.
        store.path = dir.path().join("missing_dir").join("zones.json");
        assert!(store.append(poly(10)).is_err());
        assert_eq!(store.zones(), &[poly(0)]);
    }
}
