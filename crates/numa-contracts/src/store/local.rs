use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{Map, Value};

/// Flat key/value map persisted as a single JSON object file.
///
/// Reads refresh from disk. Writes merge only the keys this instance touched
/// into whatever is on disk, so two instances sharing a file keep each
/// other's keys.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
    payload: Option<Map<String, Value>>,
    dirty_keys: Vec<String>,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            payload: None,
            dirty_keys: Vec::new(),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Value> {
        self.refresh().get(key).cloned()
    }

    pub fn get_str(&mut self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|value| value.as_str().map(str::to_string))
            .filter(|value| !value.trim().is_empty())
    }

    pub fn get_f64(&mut self, key: &str) -> Option<f64> {
        self.get(key).and_then(|value| value.as_f64())
    }

    pub fn get_i64(&mut self, key: &str) -> Option<i64> {
        let value = self.get(key)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|raw| raw.round() as i64))
    }

    /// Missing or non-boolean values read as `false`.
    pub fn get_bool(&mut self, key: &str) -> bool {
        self.get(key).and_then(|value| value.as_bool()).unwrap_or(false)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> anyhow::Result<()> {
        let value = value.into();
        let payload = self.refresh();
        if payload.get(key) == Some(&value) {
            return Ok(());
        }
        payload.insert(key.to_string(), value);
        self.mark_dirty(key);
        self.flush()
    }

    pub fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        let payload = self.refresh();
        if payload.remove(key).is_none() {
            return Ok(());
        }
        self.mark_dirty(key);
        self.flush()
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        if self.dirty_keys.is_empty() {
            return Ok(());
        }
        let Some(payload) = &self.payload else {
            return Ok(());
        };

        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        for key in &self.dirty_keys {
            match payload.get(key) {
                Some(value) => {
                    on_disk.insert(key.clone(), value.clone());
                }
                None => {
                    on_disk.remove(key);
                }
            }
        }
        write_json_object(&self.path, &on_disk)?;
        self.payload = Some(on_disk);
        self.dirty_keys.clear();
        Ok(())
    }

    fn mark_dirty(&mut self, key: &str) {
        if !self.dirty_keys.iter().any(|existing| existing == key) {
            self.dirty_keys.push(key.to_string());
        }
    }

    // Re-reads the file, keeping unflushed edits on top of it.
    fn refresh(&mut self) -> &mut Map<String, Value> {
        let mut fresh = read_json_object(&self.path).unwrap_or_default();
        if let Some(previous) = &self.payload {
            for key in &self.dirty_keys {
                match previous.get(key) {
                    Some(value) => {
                        fresh.insert(key.clone(), value.clone());
                    }
                    None => {
                        fresh.remove(key);
                    }
                }
            }
        }
        self.payload.insert(fresh)
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )
    .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::LocalStore;

    #[test]
    fn typed_getters() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = LocalStore::new(temp.path().join("defaults.json"));
        store.set("name", "numa")?;
        store.set("weight", 72.5)?;
        store.set("age", 31)?;
        store.set("done", true)?;

        assert_eq!(store.get_str("name").as_deref(), Some("numa"));
        assert_eq!(store.get_f64("weight"), Some(72.5));
        assert_eq!(store.get_i64("age"), Some(31));
        assert!(store.get_bool("done"));
        assert!(!store.get_bool("missing"));
        assert_eq!(store.get_str("missing"), None);
        Ok(())
    }

    #[test]
    fn values_survive_reopen() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("defaults.json");
        let mut store = LocalStore::new(&path);
        store.set("key", json!({"value": 1}))?;

        let mut reopened = LocalStore::new(path);
        assert_eq!(reopened.get("key"), Some(json!({"value": 1})));
        Ok(())
    }

    #[test]
    fn writers_sharing_a_file_keep_each_others_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("defaults.json");
        let mut store_a = LocalStore::new(&path);
        let mut store_b = LocalStore::new(&path);

        store_a.set("a", 1)?;
        store_b.set("b", 2)?;
        store_a.set("c", 3)?;

        let mut reloaded = LocalStore::new(path);
        assert_eq!(reloaded.get("a"), Some(json!(1)));
        assert_eq!(reloaded.get("b"), Some(json!(2)));
        assert_eq!(reloaded.get("c"), Some(json!(3)));
        Ok(())
    }

    #[test]
    fn remove_deletes_from_disk() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("defaults.json");
        let mut store = LocalStore::new(&path);
        store.set("keep", "yes")?;
        store.set("drop", "no")?;
        store.remove("drop")?;
        store.remove("never-set")?;

        let mut reloaded = LocalStore::new(path);
        assert_eq!(reloaded.get("drop"), None);
        assert_eq!(reloaded.get_str("keep").as_deref(), Some("yes"));
        Ok(())
    }

    #[test]
    fn reads_see_other_writers() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("defaults.json");
        let mut store_a = LocalStore::new(&path);
        let mut store_b = LocalStore::new(&path);

        store_a.set("key", 1)?;
        assert_eq!(store_b.get("key"), Some(json!(1)));
        store_b.set("key", 2)?;
        assert_eq!(store_a.get("key"), Some(json!(2)));
        Ok(())
    }
}
