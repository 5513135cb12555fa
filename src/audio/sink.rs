use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::scheduler::SchedulerEvent;
use crate::error::{MusicError, MusicResult};
use crate::sources::StreamHandle;

/// Aviso de fin de un intento de reproducción.
///
/// El sink lo dispara cuando el stream termina, falla o se detiene. Solo
/// el primer disparo cuenta; el aviso viaja como [`SchedulerEvent`] al
/// event loop del scheduler en vez de ejecutarse en el hilo del driver.
#[derive(Debug)]
pub struct Completion {
    guild_id: GuildId,
    attempt: u64,
    events: UnboundedSender<SchedulerEvent>,
    fired: AtomicBool,
}

impl Completion {
    pub fn new(guild_id: GuildId, attempt: u64, events: UnboundedSender<SchedulerEvent>) -> Self {
        Self {
            guild_id,
            attempt,
            events,
            fired: AtomicBool::new(false),
        }
    }

    pub fn fire(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }

        let event = SchedulerEvent::TrackEnded {
            guild_id: self.guild_id,
            attempt: self.attempt,
        };
        if self.events.send(event).is_err() {
            warn!("Event loop cerrado, fin de pista descartado en guild {}", self.guild_id);
        }
    }
}

/// Salida de audio de una guild: un solo stream a la vez.
#[async_trait]
pub trait VoiceSink: Send + Sync {
    /// Empieza a reproducir `stream`; `completion` debe dispararse
    /// exactamente una vez cuando el stream termine o se detenga.
    async fn play(&self, stream: StreamHandle, completion: Arc<Completion>) -> MusicResult<()>;

    /// Detiene el stream actual. Tras volver, `is_playing` es `false`.
    async fn stop(&self);

    async fn is_playing(&self) -> bool;

    /// Libera la conexión de voz
    async fn disconnect(&self) -> MusicResult<()>;
}

/// Sink respaldado por una llamada de Songbird
pub struct SongbirdSink {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdSink {
    pub fn new(
        guild_id: GuildId,
        manager: Arc<Songbird>,
        call: Arc<tokio::sync::Mutex<Call>>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            guild_id,
            manager,
            call,
            http,
            current: Mutex::new(None),
        }
    }
}

#[async_trait]
impl VoiceSink for SongbirdSink {
    async fn play(&self, stream: StreamHandle, completion: Arc<Completion>) -> MusicResult<()> {
        let input: Input = HttpRequest::new(self.http.clone(), stream.into_url()).into();

        let track = {
            let mut call = self.call.lock().await;
            if call.current_channel().is_none() {
                return Err(MusicError::SinkUnavailable(format!(
                    "sin canal de voz en guild {}",
                    self.guild_id
                )));
            }
            call.play_input(input)
        };

        for event in [TrackEvent::End, TrackEvent::Error] {
            track
                .add_event(
                    Event::Track(event),
                    TrackEndNotifier {
                        completion: completion.clone(),
                    },
                )
                .map_err(|e| MusicError::SinkUnavailable(e.to_string()))?;
        }

        *self.current.lock() = Some(track);
        Ok(())
    }

    async fn stop(&self) {
        let track = self.current.lock().take();
        if let Some(track) = track {
            let _ = track.stop();
            debug!("⏹️ Track detenido en guild {}", self.guild_id);
        }
    }

    async fn is_playing(&self) -> bool {
        let track = self.current.lock().clone();
        match track {
            Some(track) => match track.get_info().await {
                Ok(info) => matches!(info.playing, PlayMode::Play | PlayMode::Pause),
                Err(_) => false,
            },
            None => false,
        }
    }

    async fn disconnect(&self) -> MusicResult<()> {
        self.stop().await;
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| MusicError::SinkUnavailable(e.to_string()))
    }
}

/// Handler para cuando termina (o falla) una canción
struct TrackEndNotifier {
    completion: Arc<Completion>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        self.completion.fire();
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    /// Sink en memoria que registra lo que se reproduce.
    #[derive(Default)]
    pub(crate) struct FakeSink {
        active: Mutex<Option<Arc<Completion>>>,
        pub plays: Mutex<Vec<String>>,
        pub stops: AtomicUsize,
        pub disconnected: AtomicBool,
        pub fail_play: AtomicBool,
        /// Se reprodujo algo con otro stream aún activo
        pub double_play: AtomicBool,
        /// Se ejecuta una vez en la próxima llamada a `is_playing`
        pub on_is_playing: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl FakeSink {
        /// Simula el final natural del stream
        pub fn finish(&self) {
            if let Some(completion) = self.active.lock().take() {
                completion.fire();
            }
        }

        pub fn played(&self) -> Vec<String> {
            self.plays.lock().clone()
        }
    }

    #[async_trait]
    impl VoiceSink for FakeSink {
        async fn play(&self, stream: StreamHandle, completion: Arc<Completion>) -> MusicResult<()> {
            if self.fail_play.load(Ordering::SeqCst) {
                return Err(MusicError::SinkUnavailable("fake".into()));
            }
            self.plays.lock().push(stream.into_url());
            if self.active.lock().replace(completion).is_some() {
                self.double_play.store(true, Ordering::SeqCst);
            }
            Ok(())
        }

        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.finish();
        }

        async fn is_playing(&self) -> bool {
            let hook = self.on_is_playing.lock().take();
            if let Some(hook) = hook {
                hook();
            }
            self.active.lock().is_some()
        }

        async fn disconnect(&self) -> MusicResult<()> {
            self.disconnected.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn completion_fires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let completion = Completion::new(GuildId::new(7), 3, tx);

        completion.fire();
        completion.fire();
        drop(completion);

        match rx.recv().await {
            Some(SchedulerEvent::TrackEnded { guild_id, attempt }) => {
                assert_eq!(guild_id, GuildId::new(7));
                assert_eq!(attempt, 3);
            }
            other => panic!("evento inesperado: {:?}", other),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn fake_stop_fires_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = FakeSink::default();
        sink.play(StreamHandle::new("https://cdn/a"), Arc::new(Completion::new(GuildId::new(1), 1, tx)))
            .await
            .unwrap();
        assert!(sink.is_playing().await);

        sink.stop().await;
        assert!(!sink.is_playing().await);
        assert!(matches!(rx.recv().await, Some(SchedulerEvent::TrackEnded { attempt: 1, .. })));
    }
}
