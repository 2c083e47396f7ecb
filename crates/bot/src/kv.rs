use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result};
use tokio::sync::Mutex;
use tracing::debug;

/// Plugin key-value store persisted as one JSON object. Values are kept as
/// UTF-8 strings; plugins store JSON records in them.
#[derive(Debug)]
pub struct KvStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl KvStore {
    /// Loads `path`, starting empty when the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(data) => serde_json::from_str(&data)
                .with_context(|| format!("parsing KV file at {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading KV file at {}", path.display()));
            }
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .await
            .get(key)
            .map(|v| v.as_bytes().to_vec())
    }

    /// Stores `value` and rewrites the file before returning.
    pub async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let value = String::from_utf8(value.to_vec()).context("KV values must be UTF-8")?;
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_owned(), value);
        let data = serde_json::to_string_pretty(&*entries)?;
        write_replacing(&self.path, &data).await?;
        debug!(key = %key, file = %self.path.display(), "KV entry written");
        Ok(())
    }
}

async fn write_replacing(path: &Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data)
        .await
        .with_context(|| format!("writing KV file at {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing KV file at {}", path.display()))?;
    Ok(())
}
