// src/infrastructure/archive/fs.rs
// Filesystem cold archive: <root>/<bucket>/<symbol>/<timestamp>.json

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::errors::{ArchiveError, ArchiveResult};
use crate::domain::models::{PriceObservation, RecordKey};
use crate::domain::repository::ColdArchive;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct FileSystemArchive {
    base: PathBuf,
}

impl FileSystemArchive {
    pub fn new(root: impl AsRef<Path>, bucket: &str) -> ArchiveResult<Self> {
        if bucket.is_empty()
            || bucket.contains(|c: char| c == '/' || c == '\\')
            || bucket == "."
            || bucket == ".."
        {
            return Err(ArchiveError::Unavailable(format!(
                "Invalid bucket name: {:?}",
                bucket
            )));
        }

        let base = root.as_ref().join(bucket);
        std::fs::create_dir_all(&base)?;
        log::info!("Filesystem archive ready at {}", base.display());
        Ok(Self { base })
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Relative object path for a key: `<symbol>/<timestamp>.json`
    pub fn object_path(key: &RecordKey) -> PathBuf {
        PathBuf::from(encode_segment(&key.symbol))
            .join(format!("{}.json", object_stem(key.timestamp)))
    }

    fn full_path(&self, key: &RecordKey) -> PathBuf {
        self.base.join(Self::object_path(key))
    }
}

fn object_stem(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%dT%H%M%S%.9fZ").to_string()
}

/// Percent-encode anything that is not safe as a single path segment
fn encode_segment(symbol: &str) -> String {
    let mut out = String::with_capacity(symbol.len());
    for byte in symbol.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'^' | b'=' => {
                out.push(byte as char)
            }
            b'.' if symbol != "." && symbol != ".." => out.push('.'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

async fn read_object(path: &Path) -> ArchiveResult<Option<PriceObservation>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir(dir: &Path, out: &mut Vec<PriceObservation>) -> ArchiveResult<()> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(observation) = read_object(&path).await? {
            out.push(observation);
        }
    }
    Ok(())
}

#[async_trait]
impl ColdArchive for FileSystemArchive {
    async fn put(&self, observation: &PriceObservation) -> ArchiveResult<()> {
        let path = self.full_path(&observation.key());
        let dir = path
            .parent()
            .ok_or_else(|| ArchiveError::Unavailable(format!("no parent for {}", path.display())))?;
        tokio::fs::create_dir_all(dir).await?;

        let body = serde_json::to_vec(observation)?;

        // Write then rename, so a reader never sees a half-written object.
        let tmp = dir.join(format!(
            ".{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, &body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        log::debug!("archived {} -> {}", observation.key(), path.display());
        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> ArchiveResult<Option<PriceObservation>> {
        read_object(&self.full_path(key)).await
    }

    async fn list(&self, symbol: Option<&str>) -> ArchiveResult<Vec<PriceObservation>> {
        let mut out = Vec::new();

        match symbol {
            Some(symbol) => list_dir(&self.base.join(encode_segment(symbol)), &mut out).await?,
            None => {
                let mut symbols = tokio::fs::read_dir(&self.base).await?;
                while let Some(entry) = symbols.next_entry().await? {
                    if entry.file_type().await?.is_dir() {
                        list_dir(&entry.path(), &mut out).await?;
                    }
                }
            }
        }

        out.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(out)
    }
}
