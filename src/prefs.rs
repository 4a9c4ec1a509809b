//! Persisted key-value preferences, kept separate from the SQLite store.
//!
//! The completion flag lives here so that it survives independently of the
//! migrated data.

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A small persisted key-value area.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    fn set(&self, key: &str, value: Value) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Read a boolean, treating a missing or non-boolean value as `false`.
    fn get_bool(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set(key, Value::Bool(value))
    }
}

/// Preferences stored as a JSON object in a single file.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash mid-write leaves the previous contents intact.
pub struct FilePreferences {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FilePreferences {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read preferences {:?}", self.path));
            }
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content)
            .with_context(|| format!("Failed to parse preferences {:?}", self.path))?
        {
            Value::Object(map) => Ok(map),
            _ => Err(anyhow!(
                "Preferences file {:?} does not contain a JSON object",
                self.path
            )),
        }
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let content = serde_json::to_string_pretty(map)?;
        fs::write(&tmp, content).with_context(|| format!("Failed to write {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace preferences {:?}", self.path))?;
        Ok(())
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| anyhow!("preferences lock poisoned"))
    }
}

impl PreferenceStore for FilePreferences {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.guard()?;
        Ok(self.read_map()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.guard()?;
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value);
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.guard()?;
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// In-memory preferences for embedding and tests.
#[derive(Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow!("preferences lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("preferences lock poisoned"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("preferences lock poisoned"))?;
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_empty() {
        let temp = TempDir::new().unwrap();
        let prefs = FilePreferences::new(temp.path().join("prefs.json"));
        assert!(!prefs.get_bool("cities_migrated").unwrap());
        assert!(prefs.get("anything").unwrap().is_none());
    }

    #[test]
    fn test_set_persists_across_instances() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/dir/prefs.json");

        FilePreferences::new(&path)
            .set_bool("cities_migrated", true)
            .unwrap();
        FilePreferences::new(&path)
            .set("other", json!("value"))
            .unwrap();

        let prefs = FilePreferences::new(&path);
        assert!(prefs.get_bool("cities_migrated").unwrap());
        assert_eq!(prefs.get("other").unwrap(), Some(json!("value")));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_remove() {
        let temp = TempDir::new().unwrap();
        let prefs = FilePreferences::new(temp.path().join("prefs.json"));
        prefs.set_bool("flag", true).unwrap();
        prefs.remove("flag").unwrap();
        assert!(!prefs.get_bool("flag").unwrap());
        prefs.remove("never-set").unwrap();
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prefs.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(FilePreferences::new(&path).get_bool("flag").is_err());
    }

    #[test]
    fn test_non_bool_reads_false() {
        let prefs = MemoryPreferences::new();
        prefs.set("flag", json!("yes")).unwrap();
        assert!(!prefs.get_bool("flag").unwrap());
        prefs.set_bool("flag", true).unwrap();
        assert!(prefs.get_bool("flag").unwrap());
    }
}
