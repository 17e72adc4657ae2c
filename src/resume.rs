use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tokio::fs;
use tokio::sync::Mutex;

use crate::formats::ResumeRecord;

/// Durable record of which chapters completed and under which filename.
///
/// This is the only shared mutable state in the pipeline: one lock
/// serializes load/save/lookup/upsert, so any number of concurrently
/// orchestrated chapters can hold the same map without external locking.
#[derive(Debug)]
pub struct ResumeMap {
    path: PathBuf,
    entries: Mutex<HashMap<String, ResumeRecord>>,
}

impl ResumeMap {
    /// Reads persisted records from `path`. A missing file is an empty
    /// map; a malformed file is a hard error.
    pub async fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = match fs::read(&path).await {
            Ok(bytes) => {
                let records: Vec<ResumeRecord> = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parse resume map: {}", path.display()))?;
                records
                    .into_iter()
                    .map(|record| (record.url.clone(), record))
                    .collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("read resume map: {}", path.display()));
            }
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// None means "not previously completed" or "completed under a file
    /// the caller must still check on disk".
    pub async fn lookup(&self, key: &str) -> Option<ResumeRecord> {
        self.entries.lock().await.get(key).cloned()
    }

    pub async fn upsert(&self, record: ResumeRecord) {
        self.entries
            .lock()
            .await
            .insert(record.url.clone(), record);
    }

    /// All records, sorted by url.
    pub async fn records(&self) -> Vec<ResumeRecord> {
        let entries = self.entries.lock().await;
        let mut records: Vec<ResumeRecord> = entries.values().cloned().collect();
        records.sort_by(|a, b| a.url.cmp(&b.url));
        records
    }

    /// Rewrites the whole file, atomically. Called after every successful
    /// chapter so a crash mid-run loses at most the in-flight chapter,
    /// never previously completed ones. The lock is held across the write
    /// so concurrent saves cannot interleave.
    pub async fn save(&self) -> anyhow::Result<()> {
        let entries = self.entries.lock().await;
        let mut records: Vec<&ResumeRecord> = entries.values().collect();
        records.sort_by(|a, b| a.url.cmp(&b.url));
        let data = serde_json::to_vec_pretty(&records).context("serialize resume map")?;
        write_atomic(&self.path, &data)
            .await
            .with_context(|| format!("write resume map: {}", self.path.display()))
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create parent dir: {}", parent.display()))?;
    }

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp_path, data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
