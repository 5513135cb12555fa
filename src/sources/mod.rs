pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::QueryCache;
use crate::error::{MusicError, MusicResult};

pub use spotify::{CatalogLink, SpotifyClient};
pub use youtube::YouTubeClient;

/// Una canción reproducible: locator estable + título.
///
/// Nunca guarda una URL de stream; esas caducan y se resuelven de nuevo en
/// cada intento de reproducción. Se serializa como `{url, title}`, el mismo
/// formato que usa el archivo de caché.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRecord {
    #[serde(rename = "url")]
    locator: String,
    title: String,
}

impl SongRecord {
    pub fn new(locator: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            title: title.into(),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

/// URL de audio de corta duración, de un solo uso.
///
/// No implementa `Clone` a propósito: el sink la consume al reproducir.
#[derive(Debug)]
pub struct StreamHandle {
    url: String,
}

impl StreamHandle {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    #[allow(dead_code)]
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn into_url(self) -> String {
        self.url
    }
}

/// Trait común para los backends de búsqueda/extracción
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MusicSource: Send + Sync {
    /// Busca la mejor coincidencia para una consulta de texto libre o URL
    async fn search(&self, query: &str) -> MusicResult<Option<SongRecord>>;

    /// Resuelve un locator estable a una URL de stream nueva
    async fn stream(&self, locator: &str) -> MusicResult<StreamHandle>;

    /// Nombre de la fuente
    fn source_name(&self) -> &'static str;
}

/// Resolución de consultas (con caché) y de streams (siempre en frío).
#[derive(Clone)]
pub struct TrackResolver {
    source: Arc<dyn MusicSource>,
    cache: Arc<QueryCache>,
}

impl TrackResolver {
    pub fn new(source: Arc<dyn MusicSource>, cache: Arc<QueryCache>) -> Self {
        Self { source, cache }
    }

    /// Consulta la caché primero; en un fallo de caché busca en la fuente y
    /// guarda `{url, title}` bajo la consulta exacta.
    pub async fn resolve_query(&self, query: &str) -> MusicResult<SongRecord> {
        if let Some(song) = self.cache.get(query).await {
            debug!("🎯 Cache HIT: {}", query);
            return Ok(song);
        }

        info!("🔍 Cache MISS, buscando en {}: {}", self.source.source_name(), query);

        let song = self
            .source
            .search(query)
            .await?
            .ok_or_else(|| MusicError::ResolutionNotFound(query.to_string()))?;

        // Un fallo al persistir no invalida el resultado
        if let Err(e) = self.cache.insert(query, song.clone()).await {
            warn!("⚠️ No se pudo guardar en caché '{}': {}", query, e);
        }

        Ok(song)
    }

    /// Siempre resuelve de nuevo; el resultado no se guarda ni se reutiliza.
    pub async fn resolve_stream(&self, locator: &str) -> MusicResult<StreamHandle> {
        debug!("🎵 Resolviendo stream para: {}", locator);
        self.source.stream(locator).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn cache_in(dir: &tempfile::TempDir) -> Arc<QueryCache> {
        Arc::new(QueryCache::load(dir.path().join("cache.json")).await)
    }

    #[tokio::test]
    async fn resolve_query_hits_backend_once_per_query() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockMusicSource::new();
        source.expect_source_name().return_const("mock");
        source
            .expect_search()
            .withf(|q| q == "lofi")
            .times(1)
            .returning(|_| Ok(Some(SongRecord::new("https://youtu.be/lofi", "Lofi Mix"))));

        let resolver = TrackResolver::new(Arc::new(source), cache_in(&dir).await);

        let first = resolver.resolve_query("lofi").await.unwrap();
        let second = resolver.resolve_query("lofi").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.locator(), "https://youtu.be/lofi");
    }

    #[tokio::test]
    async fn resolve_query_reports_not_found_without_caching() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockMusicSource::new();
        source.expect_source_name().return_const("mock");
        source.expect_search().times(2).returning(|_| Ok(None));

        let cache = cache_in(&dir).await;
        let resolver = TrackResolver::new(Arc::new(source), cache.clone());

        for _ in 0..2 {
            let err = resolver.resolve_query("nada").await.unwrap_err();
            assert!(matches!(err, MusicError::ResolutionNotFound(q) if q == "nada"));
        }
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn resolve_stream_is_never_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockMusicSource::new();
        let mut n = 0;
        source.expect_stream().times(2).returning(move |_| {
            n += 1;
            Ok(StreamHandle::new(format!("https://cdn.example/{}", n)))
        });

        let resolver = TrackResolver::new(Arc::new(source), cache_in(&dir).await);

        let a = resolver.resolve_stream("https://youtu.be/x").await.unwrap();
        let b = resolver.resolve_stream("https://youtu.be/x").await.unwrap();
        assert_ne!(a.url(), b.url());
    }
}
