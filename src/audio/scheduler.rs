use serenity::model::id::GuildId;
use std::{fmt, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use super::{
    queue::{LoopMode, QueueSnapshot},
    session::{GuildSession, PlaybackState, SessionRegistry},
    sink::Completion,
    PlaybackObserver,
};
use crate::error::MusicResult;
use crate::sources::{SongRecord, TrackResolver};

/// Mensajes procesados por el event loop del scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Terminó (o falló, o se detuvo) el intento `attempt`
    TrackEnded { guild_id: GuildId, attempt: u64 },
    /// Revisar si la sesión lleva suficiente tiempo inactiva
    IdleCheck { guild_id: GuildId },
}

/// Resultado de un intento de arrancar la reproducción
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Playing(SongRecord),
    /// La cola se vació (o no había nada que reproducir)
    Idle,
    /// No hay conexión de voz
    Disconnected,
    /// Un stop/leave invalidó el intento mientras se resolvía
    Superseded,
    /// Ya hay una reproducción en marcha
    AlreadyActive,
    /// El sink rechazó el stream
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    Skipped,
    NothingPlaying,
}

impl fmt::Display for SkipOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipOutcome::Skipped => "⏭️ Canción saltada",
            SkipOutcome::NothingPlaying => "❌ No hay nada reproduciéndose",
        })
    }
}

/// Máquina de estados de reproducción para todas las guilds.
///
/// Por guild solo hay un intento de reproducción activo a la vez: los
/// intentos se serializan con el lock de playback de la sesión y cada uno
/// lleva un número de intento. Los avisos de fin de pista con un número
/// viejo se ignoran.
pub struct Scheduler {
    sessions: Arc<SessionRegistry>,
    resolver: TrackResolver,
    observer: Arc<dyn PlaybackObserver>,
    events: UnboundedSender<SchedulerEvent>,
    idle_timeout: Duration,
}

impl Scheduler {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        resolver: TrackResolver,
        observer: Arc<dyn PlaybackObserver>,
        idle_timeout: Duration,
    ) -> (Arc<Self>, UnboundedReceiver<SchedulerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(Self {
            sessions,
            resolver,
            observer,
            events,
            idle_timeout,
        });
        (scheduler, rx)
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn resolver(&self) -> &TrackResolver {
        &self.resolver
    }

    pub fn observer(&self) -> &Arc<dyn PlaybackObserver> {
        &self.observer
    }

    /// Consume eventos hasta que se cierre el canal. Cada evento corre en su
    /// propia tarea; el orden por guild lo impone el lock de playback.
    pub fn spawn_event_loop(self: &Arc<Self>, mut rx: UnboundedReceiver<SchedulerEvent>) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            info!("🎛️ Event loop del scheduler iniciado");
            while let Some(event) = rx.recv().await {
                let scheduler = scheduler.clone();
                tokio::spawn(async move {
                    scheduler.handle_event(event).await;
                });
            }
            info!("🎛️ Event loop del scheduler detenido");
        })
    }

    pub async fn handle_event(&self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::TrackEnded { guild_id, attempt } => self.on_track_end(guild_id, attempt).await,
            SchedulerEvent::IdleCheck { guild_id } => self.on_idle_check(guild_id).await,
        }
    }

    /// Agrega una canción; devuelve su posición (1 = sonando ahora)
    pub fn enqueue(&self, guild_id: GuildId, song: SongRecord) -> MusicResult<usize> {
        let session = self.sessions.get_or_create(guild_id);
        session.with_state(|s| {
            s.queue.enqueue(song)?;
            s.refresh_idle();
            Ok(s.queue.len())
        })
    }

    pub fn enqueue_batch(&self, guild_id: GuildId, songs: Vec<SongRecord>) -> usize {
        let session = self.sessions.get_or_create(guild_id);
        session.with_state(|s| {
            let added = s.queue.extend(songs);
            if added > 0 {
                s.refresh_idle();
            }
            added
        })
    }

    /// Arranca la reproducción si la guild está conectada e inactiva.
    pub async fn kick(&self, guild_id: GuildId) -> PlaybackOutcome {
        let Some(session) = self.sessions.get(guild_id) else {
            return PlaybackOutcome::Disconnected;
        };

        let claimed = session.with_state(|s| match s.state {
            PlaybackState::Disconnected => Err(PlaybackOutcome::Disconnected),
            PlaybackState::Idle if !s.queue.is_empty() => {
                s.state = PlaybackState::Advancing;
                Ok(())
            }
            PlaybackState::Idle => Err(PlaybackOutcome::Idle),
            PlaybackState::Advancing | PlaybackState::Playing => Err(PlaybackOutcome::AlreadyActive),
        });
        if let Err(outcome) = claimed {
            return outcome;
        }

        self.trigger_playback(guild_id).await
    }

    pub fn spawn_kick(self: &Arc<Self>, guild_id: GuildId) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let outcome = scheduler.kick(guild_id).await;
            debug!("▶️ Kick en guild {}: {:?}", guild_id, outcome);
        });
    }

    /// Reproduce la cabeza de la cola, deteniendo antes cualquier stream
    /// activo. No avanza la cola.
    pub async fn trigger_playback(&self, guild_id: GuildId) -> PlaybackOutcome {
        let Some(session) = self.sessions.get(guild_id) else {
            return PlaybackOutcome::Disconnected;
        };

        let _guard = session.lock_playback().await;
        self.play_next(&session).await
    }

    /// Requiere el lock de playback de la sesión.
    async fn play_next(&self, session: &GuildSession) -> PlaybackOutcome {
        let guild_id = session.guild_id();
        let Some(sink) = session.sink() else {
            return PlaybackOutcome::Disconnected;
        };

        if sink.is_playing().await {
            // El fin del stream anterior queda obsoleto
            session.with_state(|s| s.attempt += 1);
            sink.stop().await;
            debug!("⏹️ Stream anterior detenido antes de reproducir en guild {}", guild_id);
        }

        loop {
            let next = session.with_state(|s| {
                let head = s.queue.peek_head().cloned();
                match head {
                    Some(song) => {
                        s.state = PlaybackState::Advancing;
                        Some((song, s.attempt))
                    }
                    None => {
                        s.enter_idle();
                        None
                    }
                }
            });

            let Some((song, observed)) = next else {
                info!("📭 Cola vacía en guild {}", guild_id);
                self.arm_idle_check(guild_id);
                return PlaybackOutcome::Idle;
            };

            let stream = match self.resolver.resolve_stream(song.locator()).await {
                Ok(stream) => stream,
                Err(e) => {
                    let still_current = session.with_state(|s| {
                        if s.attempt != observed {
                            return false;
                        }
                        s.queue.drop_head();
                        true
                    });
                    if !still_current {
                        return PlaybackOutcome::Superseded;
                    }

                    warn!("⚠️ Saltando '{}' en guild {}: {}", song.title(), guild_id, e);
                    self.observer.track_failed(guild_id, &song, &e).await;
                    continue;
                }
            };

            let attempt = session.with_state(|s| {
                (s.attempt == observed).then(|| {
                    s.attempt += 1;
                    s.attempt
                })
            });
            let Some(attempt) = attempt else {
                return PlaybackOutcome::Superseded;
            };

            let completion = Arc::new(Completion::new(guild_id, attempt, self.events.clone()));
            if let Err(e) = sink.play(stream, completion).await {
                error!("❌ El sink rechazó '{}' en guild {}: {}", song.title(), guild_id, e);
                session.with_state(|s| {
                    if s.attempt == attempt {
                        s.enter_idle();
                    }
                });
                self.observer.playback_interrupted(guild_id, &e).await;
                self.arm_idle_check(guild_id);
                return PlaybackOutcome::Interrupted;
            }

            let current = session.with_state(|s| {
                if s.attempt != attempt {
                    return false;
                }
                s.state = PlaybackState::Playing;
                s.idle_since = None;
                true
            });
            if !current {
                sink.stop().await;
                return PlaybackOutcome::Superseded;
            }

            info!("🎵 Reproduciendo en guild {}: {}", guild_id, song.title());
            self.observer.now_playing(guild_id, &song).await;
            return PlaybackOutcome::Playing(song);
        }
    }

    async fn on_track_end(&self, guild_id: GuildId, attempt: u64) {
        let Some(session) = self.sessions.get(guild_id) else {
            return;
        };

        let _guard = session.lock_playback().await;
        let advanced = session.with_state(|s| {
            if s.attempt != attempt || s.state != PlaybackState::Playing {
                return false;
            }
            s.state = PlaybackState::Advancing;
            let mode = s.loop_mode;
            s.queue.advance(mode);
            true
        });

        if !advanced {
            debug!("🔕 Fin de pista obsoleto en guild {} (intento {})", guild_id, attempt);
            return;
        }

        let outcome = self.play_next(&session).await;
        debug!("⏭️ Siguiente en guild {}: {:?}", guild_id, outcome);
    }

    async fn on_idle_check(&self, guild_id: GuildId) {
        let Some(session) = self.sessions.get(guild_id) else {
            return;
        };

        let _guard = session.lock_playback().await;
        let Some(sink) = session.sink() else {
            return;
        };

        if sink.is_playing().await {
            debug!("⏳ Guild {} sigue reproduciendo, no se desconecta", guild_id);
            return;
        }

        // Cualquier enqueue durante la espera reinicia idle_since
        let released = session.with_state(|s| {
            let due = s.state == PlaybackState::Idle
                && s.idle_since.is_some_and(|since| since.elapsed() >= self.idle_timeout);
            if due {
                s.release();
            }
            due
        });
        if !released {
            debug!("⏳ Guild {} sigue activa, no se desconecta", guild_id);
            return;
        }

        session.detach_sink();
        if let Err(e) = sink.disconnect().await {
            warn!("⚠️ Error al desconectar guild {}: {}", guild_id, e);
        }

        info!("👋 Desconectado de guild {} por inactividad", guild_id);
        self.observer.idle_disconnected(guild_id).await;
    }

    fn arm_idle_check(&self, guild_id: GuildId) {
        let events = self.events.clone();
        let timeout = self.idle_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(SchedulerEvent::IdleCheck { guild_id });
        });
    }

    /// Detiene el stream actual; el fin de pista aplica el modo de loop,
    /// así que con loop de canción se repite la misma.
    pub async fn skip(&self, guild_id: GuildId) -> SkipOutcome {
        let Some(session) = self.sessions.get(guild_id) else {
            return SkipOutcome::NothingPlaying;
        };

        match session.sink() {
            Some(sink) if session.state() == PlaybackState::Playing => {
                sink.stop().await;
                info!("⏭️ Skip en guild {}", guild_id);
                SkipOutcome::Skipped
            }
            _ => SkipOutcome::NothingPlaying,
        }
    }

    /// Vacía la cola, apaga el loop y detiene el stream. La conexión se
    /// mantiene hasta que venza el tiempo de inactividad.
    pub async fn stop(&self, guild_id: GuildId) -> bool {
        let Some(session) = self.sessions.get(guild_id) else {
            return false;
        };

        session.with_state(|s| {
            s.queue.clear();
            s.loop_mode = LoopMode::Off;
            s.attempt += 1;
            if s.state != PlaybackState::Disconnected {
                s.enter_idle();
            }
        });

        let Some(sink) = session.sink() else {
            return false;
        };
        sink.stop().await;
        self.arm_idle_check(guild_id);

        info!("⏹️ Reproducción detenida en guild {}", guild_id);
        true
    }

    /// Detiene todo y libera la conexión de voz.
    pub async fn leave(&self, guild_id: GuildId) -> MusicResult<bool> {
        let Some(session) = self.sessions.get(guild_id) else {
            return Ok(false);
        };
        let Some(sink) = session.detach_sink() else {
            return Ok(false);
        };

        session.reset();
        sink.stop().await;
        sink.disconnect().await?;

        info!("👋 Desconectado de guild {}", guild_id);
        Ok(true)
    }

    /// La conexión de voz se perdió desde fuera (kick, canal borrado).
    pub async fn on_sink_lost(&self, guild_id: GuildId) {
        let Some(session) = self.sessions.get(guild_id) else {
            return;
        };
        let Some(sink) = session.detach_sink() else {
            return;
        };

        session.reset();
        sink.stop().await;
        if let Err(e) = sink.disconnect().await {
            debug!("Conexión ya liberada en guild {}: {}", guild_id, e);
        }
        warn!("🔌 Bot desconectado externamente de guild {}, sesión reiniciada", guild_id);
    }

    pub fn shuffle(&self, guild_id: GuildId) -> bool {
        self.sessions
            .get(guild_id)
            .is_some_and(|session| session.with_state(|s| s.queue.shuffle_tail()))
    }

    /// Avanza al siguiente modo de loop y lo devuelve
    pub fn cycle_loop(&self, guild_id: GuildId) -> LoopMode {
        let session = self.sessions.get_or_create(guild_id);
        session.with_state(|s| {
            s.loop_mode = s.loop_mode.cycle();
            info!("🔁 Loop en guild {}: {:?}", guild_id, s.loop_mode);
            s.loop_mode
        })
    }

    pub fn queue_view(&self, guild_id: GuildId, limit: usize) -> (QueueSnapshot, LoopMode) {
        match self.sessions.get(guild_id) {
            Some(session) => session.with_state(|s| (s.queue.snapshot(limit), s.loop_mode)),
            None => (QueueSnapshot::default(), LoopMode::Off),
        }
    }
}
