use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{
    queue::{LoopMode, PlaybackQueue, QueueSnapshot},
    sink::VoiceSink,
};

/// Estado del scheduler para una guild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Sin conexión de voz
    Disconnected,
    /// Conectado, cola vacía o detenida
    Idle,
    /// Transitorio: resolviendo o aplicando el fin de pista
    Advancing,
    /// El sink está reproduciendo la cabeza de la cola
    Playing,
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub queue: PlaybackQueue,
    pub loop_mode: LoopMode,
    pub state: PlaybackState,
    /// Identifica el intento de reproducción vigente; cualquier evento con
    /// otro valor es obsoleto.
    pub attempt: u64,
    pub idle_since: Option<Instant>,
    pub announce_channel: Option<ChannelId>,
}

impl SessionState {
    pub fn enter_idle(&mut self) {
        self.state = PlaybackState::Idle;
        self.idle_since = Some(Instant::now());
    }

    /// Una sesión inactiva que recibe canciones reinicia su plazo
    pub fn refresh_idle(&mut self) {
        if self.state == PlaybackState::Idle {
            self.idle_since = Some(Instant::now());
        }
    }

    /// Vacía la cola, apaga el loop, invalida el intento y marca la sesión
    /// como desconectada.
    pub fn release(&mut self) {
        self.queue.clear();
        self.loop_mode = LoopMode::Off;
        self.attempt += 1;
        self.state = PlaybackState::Disconnected;
        self.idle_since = None;
    }
}

/// Cola, modo de loop y sink de voz de una guild.
///
/// El estado se modifica en secciones críticas cortas (`with_state`); los
/// intentos de reproducción se serializan con un lock asíncrono aparte para
/// no bloquear comandos como `/queue` mientras se resuelve un stream.
pub struct GuildSession {
    guild_id: GuildId,
    state: Mutex<SessionState>,
    sink: RwLock<Option<Arc<dyn VoiceSink>>>,
    playback: tokio::sync::Mutex<()>,
}

impl GuildSession {
    pub fn new(guild_id: GuildId, max_queue_size: usize) -> Self {
        Self {
            guild_id,
            state: Mutex::new(SessionState {
                queue: PlaybackQueue::new(max_queue_size),
                loop_mode: LoopMode::Off,
                state: PlaybackState::Disconnected,
                attempt: 0,
                idle_since: None,
                announce_channel: None,
            }),
            sink: RwLock::new(None),
            playback: tokio::sync::Mutex::new(()),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub(crate) async fn lock_playback(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.playback.lock().await
    }

    pub fn sink(&self) -> Option<Arc<dyn VoiceSink>> {
        self.sink.read().clone()
    }

    /// Asocia la conexión de voz; una sesión desconectada pasa a `Idle`.
    pub fn attach_sink(&self, sink: Arc<dyn VoiceSink>) {
        *self.sink.write() = Some(sink);
        self.with_state(|s| {
            if s.state == PlaybackState::Disconnected {
                s.enter_idle();
            }
        });
        debug!("🔊 Sink asociado en guild {}", self.guild_id);
    }

    pub fn detach_sink(&self) -> Option<Arc<dyn VoiceSink>> {
        let sink = self.sink.write().take();
        self.with_state(|s| {
            s.state = PlaybackState::Disconnected;
            s.idle_since = None;
        });
        sink
    }

    /// Vacía la cola, apaga el loop e invalida el intento en curso.
    pub fn reset(&self) {
        self.with_state(|s| {
            s.queue.clear();
            s.loop_mode = LoopMode::Off;
            s.attempt += 1;
        });
        info!("♻️ Sesión reiniciada en guild {}", self.guild_id);
    }

    pub fn set_announce_channel(&self, channel_id: ChannelId) {
        self.with_state(|s| s.announce_channel = Some(channel_id));
    }

    pub fn announce_channel(&self) -> Option<ChannelId> {
        self.with_state(|s| s.announce_channel)
    }

    pub fn state(&self) -> PlaybackState {
        self.with_state(|s| s.state)
    }

    #[allow(dead_code)]
    pub fn loop_mode(&self) -> LoopMode {
        self.with_state(|s| s.loop_mode)
    }

    #[allow(dead_code)]
    pub fn queue_snapshot(&self, limit: usize) -> QueueSnapshot {
        self.with_state(|s| s.queue.snapshot(limit))
    }
}

/// Registro de sesiones por guild, vivo mientras viva el proceso.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<GuildSession>>,
    max_queue_size: usize,
}

impl SessionRegistry {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_queue_size,
        }
    }

    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("🆕 Nueva sesión para guild {}", guild_id);
                Arc::new(GuildSession::new(guild_id, self.max_queue_size))
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sink::tests::FakeSink;
    use crate::sources::SongRecord;

    #[test]
    fn sessions_are_isolated_per_guild() {
        let registry = SessionRegistry::new(10);
        let a = registry.get_or_create(GuildId::new(1));
        let b = registry.get_or_create(GuildId::new(2));

        a.with_state(|s| s.queue.enqueue(SongRecord::new("u", "A")).unwrap());

        assert_eq!(a.queue_snapshot(10).total_items, 1);
        assert_eq!(b.queue_snapshot(10).total_items, 0);
        assert!(Arc::ptr_eq(&a, &registry.get_or_create(GuildId::new(1))));
        assert_eq!(registry.len(), 2);
        assert!(registry.get(GuildId::new(3)).is_none());
    }

    #[test]
    fn sink_lifecycle_drives_state() {
        let session = GuildSession::new(GuildId::new(1), 10);
        assert_eq!(session.state(), PlaybackState::Disconnected);

        session.attach_sink(Arc::new(FakeSink::default()));
        assert_eq!(session.state(), PlaybackState::Idle);
        assert!(session.sink().is_some());

        assert!(session.detach_sink().is_some());
        assert_eq!(session.state(), PlaybackState::Disconnected);
        assert!(session.sink().is_none());
    }

    #[test]
    fn reset_clears_queue_and_loop_and_bumps_attempt() {
        let session = GuildSession::new(GuildId::new(1), 10);
        session.with_state(|s| {
            s.queue.enqueue(SongRecord::new("u", "A")).unwrap();
            s.loop_mode = LoopMode::Song;
        });
        let before = session.with_state(|s| s.attempt);

        session.reset();

        assert_eq!(session.queue_snapshot(10).total_items, 0);
        assert_eq!(session.loop_mode(), LoopMode::Off);
        assert!(session.with_state(|s| s.attempt) > before);
    }
}
