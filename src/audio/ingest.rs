use futures::stream::{self, StreamExt};
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::scheduler::Scheduler;
use crate::error::{MusicError, MusicResult};
use crate::sources::SongRecord;

/// Lo que se sabe al volver de [`PlaylistIngestor::ingest`]
#[derive(Debug)]
pub struct IngestStart {
    /// Primera canción, ya en la cola
    pub first: SongRecord,
    /// Consultas que se siguen resolviendo en segundo plano
    pub pending: usize,
    /// Termina con el número de canciones agregadas
    pub background: Option<JoinHandle<usize>>,
}

/// Convierte una lista de consultas en canciones encoladas.
///
/// La primera se resuelve antes de volver para que la reproducción arranque
/// enseguida; el resto se resuelve con concurrencia limitada y se agrega a
/// la cola en un solo bloque, en orden de llegada.
pub struct PlaylistIngestor {
    scheduler: Arc<Scheduler>,
    concurrency: usize,
}

impl PlaylistIngestor {
    pub fn new(scheduler: Arc<Scheduler>, concurrency: usize) -> Self {
        Self {
            scheduler,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn ingest(&self, guild_id: GuildId, queries: Vec<String>) -> MusicResult<IngestStart> {
        let mut queries = queries.into_iter();
        let Some(first_query) = queries.next() else {
            return Err(MusicError::Catalog("la lista no contiene canciones".to_string()));
        };

        let resolver = self.scheduler.resolver().clone();
        let first = resolver.resolve_query(&first_query).await?;
        self.scheduler.enqueue(guild_id, first.clone())?;
        self.scheduler.spawn_kick(guild_id);

        let rest: Vec<String> = queries.collect();
        let pending = rest.len();
        if rest.is_empty() {
            return Ok(IngestStart {
                first,
                pending,
                background: None,
            });
        }

        info!("📋 Resolviendo {} canciones en segundo plano para guild {}", pending, guild_id);

        let scheduler = self.scheduler.clone();
        let concurrency = self.concurrency;
        let background = tokio::spawn(async move {
            let songs: Vec<SongRecord> = stream::iter(rest)
                .map(|query| {
                    let resolver = resolver.clone();
                    async move {
                        match resolver.resolve_query(&query).await {
                            Ok(song) => Some(song),
                            Err(e) => {
                                warn!("⚠️ Omitida '{}': {}", query, e);
                                None
                            }
                        }
                    }
                })
                .buffer_unordered(concurrency)
                .filter_map(|song| async move { song })
                .collect()
                .await;

            let added = scheduler.enqueue_batch(guild_id, songs);
            scheduler.observer().playlist_ingested(guild_id, added).await;

            let outcome = scheduler.kick(guild_id).await;
            debug!("📋 Playlist lista en guild {}: {:?}", guild_id, outcome);
            added
        });

        Ok(IngestStart {
            first,
            pending,
            background: Some(background),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{session::SessionRegistry, tests::RecordingObserver};
    use crate::cache::QueryCache;
    use crate::sources::{MockMusicSource, TrackResolver};
    use pretty_assertions::assert_eq;
    use std::{collections::HashSet, time::Duration};

    fn guild() -> GuildId {
        GuildId::new(9)
    }

    async fn ingestor_with(
        source: MockMusicSource,
        dir: &tempfile::TempDir,
    ) -> (PlaylistIngestor, Arc<Scheduler>, Arc<RecordingObserver>) {
        let cache = QueryCache::load(dir.path().join("cache.json")).await;
        let resolver = TrackResolver::new(Arc::new(source), Arc::new(cache));
        let observer = Arc::new(RecordingObserver::default());
        let (scheduler, _rx) = Scheduler::new(
            Arc::new(SessionRegistry::new(100)),
            resolver,
            observer.clone(),
            Duration::from_secs(60),
        );
        (PlaylistIngestor::new(scheduler.clone(), 4), scheduler, observer)
    }

    fn titles(scheduler: &Scheduler) -> Vec<String> {
        let (snapshot, _) = scheduler.queue_view(guild(), usize::MAX);
        snapshot.items.iter().map(|s| s.title().to_string()).collect()
    }

    #[tokio::test]
    async fn first_track_is_queued_before_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockMusicSource::new();
        source.expect_source_name().return_const("mock");
        for i in 0..10 {
            let query = format!("q{}", i);
            let missing = i == 3 || i == 7;
            source
                .expect_search()
                .withf(move |q| q == query)
                .times(1)
                .returning(move |q| {
                    Ok((!missing).then(|| SongRecord::new(format!("https://youtu.be/{}", q), q)))
                });
        }

        let (ingestor, scheduler, observer) = ingestor_with(source, &dir).await;
        let queries: Vec<String> = (0..10).map(|i| format!("q{}", i)).collect();

        let start = ingestor.ingest(guild(), queries).await.unwrap();
        assert_eq!(start.first.title(), "q0");
        assert_eq!(start.pending, 9);
        assert_eq!(titles(&scheduler), vec!["q0"]);

        let added = start.background.unwrap().await.unwrap();
        assert_eq!(added, 7);

        let queued = titles(&scheduler);
        assert_eq!(queued[0], "q0");
        assert_eq!(queued.len(), 8);
        let unique: HashSet<&String> = queued.iter().collect();
        assert_eq!(unique.len(), 8);
        assert!(!queued.contains(&"q3".to_string()));
        assert!(!queued.contains(&"q7".to_string()));
        assert_eq!(observer.events(), vec!["ingested:7"]);
    }

    #[tokio::test]
    async fn unresolvable_first_track_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockMusicSource::new();
        source.expect_source_name().return_const("mock");
        source
            .expect_search()
            .withf(|q| q == "first")
            .times(1)
            .returning(|_| Ok(None));

        let (ingestor, scheduler, _) = ingestor_with(source, &dir).await;
        let err = ingestor
            .ingest(guild(), vec!["first".into(), "second".into()])
            .await
            .unwrap_err();

        assert!(matches!(err, MusicError::ResolutionNotFound(_)));
        assert!(titles(&scheduler).is_empty());
    }

    #[tokio::test]
    async fn single_track_has_no_background_work() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockMusicSource::new();
        source.expect_source_name().return_const("mock");
        source
            .expect_search()
            .times(1)
            .returning(|q| Ok(Some(SongRecord::new("https://youtu.be/x", q))));

        let (ingestor, scheduler, _) = ingestor_with(source, &dir).await;
        let start = ingestor.ingest(guild(), vec!["solo".into()]).await.unwrap();

        assert_eq!(start.pending, 0);
        assert!(start.background.is_none());
        assert_eq!(titles(&scheduler), vec!["solo"]);
    }

    #[tokio::test]
    async fn empty_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (ingestor, _, _) = ingestor_with(MockMusicSource::new(), &dir).await;
        assert!(matches!(
            ingestor.ingest(guild(), Vec::new()).await,
            Err(MusicError::Catalog(_))
        ));
    }
}
