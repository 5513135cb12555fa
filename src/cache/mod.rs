//! # Cache Module
//!
//! Persistent query → track cache for Open Jukebox.
//!
//! Every free-text query (or catalog-derived query such as
//! `"Song Name Artist"`) that has been resolved once is remembered together
//! with its **stable** locator and title. Stream URLs are never stored here:
//! they expire after a few hours and are resolved again on every playback.
//!
//! ## File Format
//!
//! The cache lives in a single JSON file (default `data/cache.json`) that is
//! rewritten wholesale on each insert:
//!
//! ```json
//! {
//!     "never gonna give you up": {
//!         "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
//!         "title": "Rick Astley - Never Gonna Give You Up"
//!     }
//! }
//! ```
//!
//! ## Concurrency
//!
//! A single lock guards the map and the file write, so writes are atomic
//! with respect to each other. Two concurrent misses for the same query can
//! both hit the search backend; the second write simply overwrites the first
//! with an equivalent entry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, warn};

use crate::error::{MusicError, MusicResult};
use crate::sources::SongRecord;

/// Process-wide cache of resolved queries, backed by a JSON file.
#[derive(Debug)]
pub struct QueryCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, SongRecord>>,
}

impl QueryCache {
    /// Loads the cache file once at startup.
    ///
    /// A missing, unreadable or corrupt file is never fatal: the cache simply
    /// starts empty and the next insert rewrites the file.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let entries = match read_entries(&path).await {
            Ok(entries) => {
                info!("📂 Caché cargada: {} consultas desde {}", entries.len(), path.display());
                entries
            }
            Err(e) => {
                warn!("⚠️ {} - iniciando con caché vacía", e);
                HashMap::new()
            }
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub async fn get(&self, query: &str) -> Option<SongRecord> {
        self.entries.lock().await.get(query).cloned()
    }

    /// Guarda la consulta y reescribe el archivo completo.
    pub async fn insert(&self, query: &str, song: SongRecord) -> MusicResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(query.to_string(), song);

        let content = serde_json::to_string_pretty(&*entries)
            .map_err(|e| MusicError::CacheIo(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| MusicError::CacheIo(e.to_string()))?;
            }
        }

        fs::write(&self.path, content)
            .await
            .map_err(|e| MusicError::CacheIo(format!("{}: {}", self.path.display(), e)))?;

        debug!("💾 Caché guardada ({} entradas)", entries.len());
        Ok(())
    }

    #[allow(dead_code)]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

async fn read_entries(path: &Path) -> MusicResult<HashMap<String, SongRecord>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => {
            return Err(MusicError::CacheIo(format!(
                "no se pudo leer {}: {}",
                path.display(),
                e
            )))
        }
    };

    serde_json::from_str(&content)
        .map_err(|e| MusicError::CacheIo(format!("{} corrupto: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn song(url: &str, title: &str) -> SongRecord {
        SongRecord::new(url, title)
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = QueryCache::load(dir.path().join("cache.json")).await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ esto no es json").unwrap();

        let cache = QueryCache::load(&path).await;
        assert_eq!(cache.len().await, 0);

        // El siguiente insert reescribe el archivo corrupto
        cache.insert("a", song("https://youtu.be/a", "A")).await.unwrap();
        let reloaded = QueryCache::load(&path).await;
        assert_eq!(reloaded.get("a").await, Some(song("https://youtu.be/a", "A")));
    }

    #[tokio::test]
    async fn insert_persists_url_and_title_per_query() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let cache = QueryCache::load(&path).await;

        cache
            .insert("never gonna", song("https://www.youtube.com/watch?v=dQw4w9WgXcQ", "Rick"))
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({
                "never gonna": {
                    "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                    "title": "Rick"
                }
            })
        );

        let reloaded = QueryCache::load(&path).await;
        assert_eq!(reloaded.len().await, 1);
        assert_eq!(reloaded.get("never gonna").await.unwrap().title(), "Rick");
    }

    #[tokio::test]
    async fn keys_are_exact_query_strings() {
        let dir = tempfile::tempdir().unwrap();
        let cache = QueryCache::load(dir.path().join("cache.json")).await;
        cache.insert("Song A", song("https://youtu.be/a", "A")).await.unwrap();

        assert!(cache.get("Song A").await.is_some());
        assert!(cache.get("song a").await.is_none());
    }
}
