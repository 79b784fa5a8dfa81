//! JSON settings file provider.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::ConfigResult;
use super::provider::ConfigProvider;

/// Reads and writes a JSON object on disk.
///
/// Dotted keys address nested objects: `gemini.api_key` reads
/// `{"gemini": {"api_key": ...}}`. A missing file reads as empty and is
/// created on the first write. Non-string values come back as JSON text.
pub struct FileConfigProvider {
    path: PathBuf,
    document: RwLock<Option<Map<String, Value>>>,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drops the cached document so the next access rereads the file.
    pub async fn reload(&self) {
        *self.document.write().await = None;
    }

    async fn read_file(&self) -> ConfigResult<Map<String, Value>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(Map::new());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_file(&self, document: &Map<String, Value>) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_string_pretty(document)?).await?;
        Ok(())
    }

    async fn with_document<R>(&self, f: impl FnOnce(&Map<String, Value>) -> R) -> ConfigResult<R> {
        let mut guard = self.document.write().await;
        if guard.is_none() {
            tracing::debug!(path = %self.path.display(), "loading settings file");
            *guard = Some(self.read_file().await?);
        }
        Ok(f(guard.get_or_insert_with(Map::new)))
    }
}

fn lookup<'a>(document: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let first = document.get(parts.next()?)?;
    parts.try_fold(first, |value, part| value.get(part))
}

fn insert(document: &mut Map<String, Value>, key: &str, value: Value) {
    let (parents, leaf) = match key.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, key),
    };

    let mut target = document;
    for part in parents.into_iter().flat_map(|p| p.split('.')) {
        let slot = target
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        target = match slot {
            Value::Object(next) => next,
            _ => return,
        };
    }
    target.insert(leaf.to_string(), value);
}

fn remove(document: &mut Map<String, Value>, key: &str) -> bool {
    match key.rsplit_once('.') {
        None => document.remove(key).is_some(),
        Some((parents, leaf)) => {
            let mut target = document;
            for part in parents.split('.') {
                match target.get_mut(part) {
                    Some(Value::Object(next)) => target = next,
                    _ => return false,
                }
            }
            target.remove(leaf).is_some()
        }
    }
}

fn collect_keys(prefix: &str, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                collect_keys(&format!("{}.{}", prefix, key), child, out);
            }
        }
        _ => out.push(prefix.to_string()),
    }
}

#[async_trait::async_trait]
impl ConfigProvider for FileConfigProvider {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        self.with_document(|document| {
            lookup(document, key).map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        })
        .await
    }

    /// `value` is stored as JSON when it parses, otherwise as a string.
    async fn set_raw(&self, key: &str, value: &str) -> ConfigResult<()> {
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.into()));

        let mut guard = self.document.write().await;
        let mut document = match guard.take() {
            Some(document) => document,
            None => self.read_file().await?,
        };
        insert(&mut document, key, value);
        let written = self.write_file(&document).await;
        *guard = Some(document);
        written
    }

    async fn delete(&self, key: &str) -> ConfigResult<bool> {
        let mut guard = self.document.write().await;
        let mut document = match guard.take() {
            Some(document) => document,
            None => self.read_file().await?,
        };
        let removed = remove(&mut document, key);
        let written = if removed {
            self.write_file(&document).await
        } else {
            Ok(())
        };
        *guard = Some(document);
        written.map(|()| removed)
    }

    async fn list_keys(&self, prefix: &str) -> ConfigResult<Vec<String>> {
        self.with_document(|document| {
            let mut keys = Vec::new();
            for (key, value) in document {
                collect_keys(key, value, &mut keys);
            }
            keys.retain(|k| k.starts_with(prefix));
            keys
        })
        .await
    }
}

impl std::fmt::Debug for FileConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConfigProvider")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn provider_with(content: &str) -> (TempDir, FileConfigProvider) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("verse.json");
        tokio::fs::write(&path, content).await.unwrap();
        (dir, FileConfigProvider::new(path))
    }

    #[tokio::test]
    async fn test_nested_reads() {
        let (_dir, provider) = provider_with(
            r#"{"gemini": {"api_key": "k-123", "timeout_secs": 30}, "models": [{"id": "a"}]}"#,
        )
        .await;

        assert_eq!(
            provider.get_raw("gemini.api_key").await.unwrap().as_deref(),
            Some("k-123")
        );
        assert_eq!(
            provider.get_raw("gemini.timeout_secs").await.unwrap().as_deref(),
            Some("30")
        );
        assert_eq!(
            provider.get_raw("models").await.unwrap().as_deref(),
            Some(r#"[{"id":"a"}]"#)
        );
        assert_eq!(provider.get_raw("gemini.base_url").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let provider = FileConfigProvider::new(dir.path().join("absent.json"));
        assert_eq!(provider.get_raw("gemini.api_key").await.unwrap(), None);
        assert!(provider.list_keys("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_creates_nested_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("verse.json");
        let provider = FileConfigProvider::new(path.clone());

        provider.set_raw("gemini.api_key", "secret").await.unwrap();
        provider.set_raw("gemini.timeout_secs", "45").await.unwrap();

        let written: Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(written["gemini"]["api_key"], "secret");
        assert_eq!(written["gemini"]["timeout_secs"], 45);

        let mut keys = provider.list_keys("gemini.").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["gemini.api_key", "gemini.timeout_secs"]);
    }

    #[tokio::test]
    async fn test_delete_nested() {
        let (_dir, provider) = provider_with(r#"{"gemini": {"api_key": "k"}}"#).await;

        assert!(provider.delete("gemini.api_key").await.unwrap());
        assert!(!provider.delete("gemini.api_key").await.unwrap());
        assert!(!provider.delete("missing.key").await.unwrap());
        assert_eq!(provider.get_raw("gemini.api_key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let (_dir, provider) = provider_with(r#"{"gemini": {"base_url": "http://old"}}"#).await;
        assert_eq!(
            provider.get_raw("gemini.base_url").await.unwrap().as_deref(),
            Some("http://old")
        );

        tokio::fs::write(provider.path(), r#"{"gemini": {"base_url": "http://new"}}"#)
            .await
            .unwrap();
        provider.reload().await;
        assert_eq!(
            provider.get_raw("gemini.base_url").await.unwrap().as_deref(),
            Some("http://new")
        );
    }

    #[tokio::test]
    async fn test_invalid_json_is_an_error() {
        let (_dir, provider) = provider_with("{not json").await;
        assert!(provider.get_raw("gemini.api_key").await.is_err());
    }
}
