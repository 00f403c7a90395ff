//! Label and comment annotations keyed by `(region id, address)`.
//!
//! Addresses are resolved through memory maps (see [`crate::memmap`]) to
//! the deepest backing region *before* storage, so a label put on a banked
//! window and the same byte seen through another mirror land on one entry.
//! Persisted as a JSON array in `<rombase>.sym.json`; written sorted by key
//! for stable diffs.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::BackendError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolEntry {
    pub label: Option<String>,
    pub comment: Option<String>,
}

/// One annotation, as listed and persisted.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Symbol {
    pub region: String,
    pub addr: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Labels must be identifiers: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn valid_label(label: &str) -> bool {
    let mut chars = label.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Default)]
pub struct SymbolStore {
    entries: BTreeMap<(String, u64), SymbolEntry>,
    auto_save_path: Option<PathBuf>,
}

impl SymbolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Auto-save target; `None` disables auto-save.
    pub fn set_auto_save_path(&mut self, path: Option<PathBuf>) {
        self.auto_save_path = path;
    }

    fn auto_save(&self) {
        if let Some(path) = &self.auto_save_path
            && let Err(error) = self.save(path)
        {
            tracing::warn!(path = %path.display(), %error, "symbol auto-save failed");
        }
    }

    pub fn set_label(
        &mut self,
        region: &str,
        addr: u64,
        label: &str,
    ) -> Result<(), BackendError> {
        if !valid_label(label) {
            return Err(BackendError::InvalidLabel);
        }
        self.entries
            .entry((region.to_string(), addr))
            .or_default()
            .label = Some(label.to_string());
        self.auto_save();
        Ok(())
    }

    pub fn delete_label(&mut self, region: &str, addr: u64) -> bool {
        let key = (region.to_string(), addr);
        let Some(entry) = self.entries.get_mut(&key) else {
            return false;
        };
        entry.label = None;
        if entry.comment.is_none() {
            self.entries.remove(&key);
        }
        self.auto_save();
        true
    }

    pub fn label(&self, region: &str, addr: u64) -> Option<&str> {
        self.entries
            .get(&(region.to_string(), addr))
            .and_then(|e| e.label.as_deref())
    }

    pub fn set_comment(&mut self, region: &str, addr: u64, comment: &str) {
        self.entries
            .entry((region.to_string(), addr))
            .or_default()
            .comment = Some(comment.to_string());
        self.auto_save();
    }

    pub fn delete_comment(&mut self, region: &str, addr: u64) -> bool {
        let key = (region.to_string(), addr);
        let Some(entry) = self.entries.get_mut(&key) else {
            return false;
        };
        entry.comment = None;
        if entry.label.is_none() {
            self.entries.remove(&key);
        }
        self.auto_save();
        true
    }

    pub fn comment(&self, region: &str, addr: u64) -> Option<&str> {
        self.entries
            .get(&(region.to_string(), addr))
            .and_then(|e| e.comment.as_deref())
    }

    pub fn has_annotation(&self, region: &str, addr: u64) -> bool {
        self.entries.contains_key(&(region.to_string(), addr))
    }

    pub fn list(&self) -> Vec<Symbol> {
        self.entries
            .iter()
            .map(|((region, addr), entry)| Symbol {
                region: region.clone(),
                addr: *addr,
                label: entry.label.clone(),
                comment: entry.comment.clone(),
            })
            .collect()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let symbols = self.list();
        let json = serde_json::to_string_pretty(&symbols)?;
        fs::write(path, json + "\n")?;
        tracing::info!(count = symbols.len(), path = %path.display(), "saved symbols");
        Ok(())
    }

    /// Best-effort load: objects without both `region` and `addr`, or with
    /// neither annotation, are skipped silently. Replaces current contents.
    pub fn load(&mut self, path: &Path) -> io::Result<usize> {
        let data = fs::read_to_string(path)?;
        self.entries.clear();

        let Ok(value) = serde_json::from_str::<serde_json::Value>(&data) else {
            return Ok(0);
        };
        let Some(array) = value.as_array() else {
            return Ok(0);
        };

        for item in array {
            let Some(obj) = item.as_object() else { continue };
            let Some(region) = obj.get("region").and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(addr) = obj.get("addr").and_then(|v| v.as_u64()) else {
                continue;
            };
            let label = obj
                .get("label")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let comment = obj
                .get("comment")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            if label.is_none() && comment.is_none() {
                continue;
            }
            self.entries
                .insert((region.to_string(), addr), SymbolEntry { label, comment });
        }

        tracing::info!(count = self.entries.len(), path = %path.display(), "loaded symbols");
        Ok(self.entries.len())
    }

    /// Loads from the auto-save path if the file exists.
    pub fn auto_load(&mut self) {
        if let Some(path) = self.auto_save_path.clone()
            && path.exists()
        {
            let _ = self.load(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_validation() {
        assert!(valid_label("main"));
        assert!(valid_label("_irq_handler2"));
        assert!(!valid_label(""));
        assert!(!valid_label("0start"));
        assert!(!valid_label("with space"));
        assert!(!valid_label("dash-ed"));
    }

    #[test]
    fn removing_both_fields_removes_the_entry() {
        let mut store = SymbolStore::new();
        store.set_label("wram", 0xC000, "counter").unwrap();
        store.set_comment("wram", 0xC000, "frame counter");
        assert_eq!(store.count(), 1);

        assert!(store.delete_label("wram", 0xC000));
        assert_eq!(store.count(), 1);
        assert!(store.comment("wram", 0xC000).is_some());

        assert!(store.delete_comment("wram", 0xC000));
        assert_eq!(store.count(), 0);
        assert!(!store.delete_comment("wram", 0xC000));
    }

    #[test]
    fn invalid_label_leaves_store_unchanged() {
        let mut store = SymbolStore::new();
        assert!(matches!(
            store.set_label("wram", 0, "not valid!"),
            Err(BackendError::InvalidLabel)
        ));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn save_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sym.json");

        let mut store = SymbolStore::new();
        store.set_label("rom", 0x0150, "entry").unwrap();
        store.set_comment("rom", 0x0150, "jumps here\nafter the header");
        store.set_comment("wram", 0xC000, "counter");
        store.save(&path).unwrap();

        let mut restored = SymbolStore::new();
        assert_eq!(restored.load(&path).unwrap(), 2);
        assert_eq!(restored.label("rom", 0x0150), Some("entry"));
        assert_eq!(
            restored.comment("rom", 0x0150),
            Some("jumps here\nafter the header")
        );
        assert_eq!(restored.comment("wram", 0xC000), Some("counter"));
        assert_eq!(restored.list(), store.list());
    }

    #[test]
    fn load_skips_malformed_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.sym.json");
        fs::write(
            &path,
            r#"[
                {"region":"rom","addr":16,"label":"ok"},
                {"region":"rom","label":"no_addr"},
                {"addr":32,"label":"no_region"},
                {"region":"rom","addr":48},
                "not an object"
            ]"#,
        )
        .unwrap();

        let mut store = SymbolStore::new();
        assert_eq!(store.load(&path).unwrap(), 1);
        assert_eq!(store.label("rom", 16), Some("ok"));
    }

    #[test]
    fn list_is_sorted_by_key() {
        let mut store = SymbolStore::new();
        store.set_label("z", 1, "zz").unwrap();
        store.set_label("a", 9, "a9").unwrap();
        store.set_label("a", 2, "a2").unwrap();
        let listed = store.list();
        let keys: Vec<(String, u64)> = listed.iter().map(|s| (s.region.clone(), s.addr)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
