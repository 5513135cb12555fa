//! # Bot Module
//!
//! Discord front end for Open Jukebox.
//!
//! - Slash command registration and dispatch ([`commands`], [`handlers`])
//! - Voice connection management through Songbird
//! - Playback announcements in the text channel of the last `/play`
//!   ([`events`])
//!
//! The bot owns no playback state of its own: every command goes through
//! the shared [`Scheduler`], which keeps one session per guild.

use anyhow::{Context as _, Result};
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::{ingest::PlaylistIngestor, scheduler::Scheduler, sink::SongbirdSink},
    config::Config,
    sources::SpotifyClient,
};

/// Main Discord event handler.
///
/// Shares the [`Scheduler`] with the rest of the process; the optional
/// [`SpotifyClient`] is only present when credentials are configured.
pub struct OpenJukeboxBot {
    config: Arc<Config>,
    pub scheduler: Arc<Scheduler>,
    pub ingestor: PlaylistIngestor,
    pub spotify: Option<SpotifyClient>,
    /// Cliente HTTP compartido por los streams de Songbird
    http_client: reqwest::Client,
}

impl OpenJukeboxBot {
    pub fn new(config: Arc<Config>, scheduler: Arc<Scheduler>, spotify: Option<SpotifyClient>) -> Self {
        let ingestor = PlaylistIngestor::new(scheduler.clone(), config.resolve_concurrency);

        Self {
            config,
            scheduler,
            ingestor,
            spotify,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers slash commands, per guild when `GUILD_ID` is set.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        match self.config.guild_id.map(GuildId::new) {
            Some(guild_id) if !ctx.cache.guilds().contains(&guild_id) => {
                warn!("⚠️ El bot no está en la guild {}, comandos sin registrar", guild_id);
            }
            Some(guild_id) => {
                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .context("registro de comandos de guild")?;
                info!("✅ Comandos registrados en guild {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx)
                    .await
                    .context("registro de comandos globales")?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Connects (or moves) the bot to `channel_id` and attaches a voice
    /// sink to the guild session if it has none.
    pub async fn join_voice_channel(&self, ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        let session = self.scheduler.sessions().get_or_create(guild_id);

        if let Some(call) = manager.get(guild_id) {
            let current = call.lock().await.current_channel();
            if current == Some(channel_id.into()) && session.sink().is_some() {
                return Ok(());
            }
        }

        let call = manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al obtener handler de voz: {:?}", e);
            anyhow::anyhow!("Error al conectar al canal de voz")
        })?;

        if session.sink().is_none() {
            let sink = SongbirdSink::new(guild_id, manager.clone(), call, self.http_client.clone());
            session.attach_sink(Arc::new(sink));
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(())
    }
}

#[async_trait]
impl EventHandler for OpenJukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Si el bot sale del canal de voz por cualquier motivo, la sesión de la
    /// guild se reinicia.
    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot fuera del canal de voz en guild {}", guild_id);
            self.scheduler.on_sink_lost(guild_id).await;
        }
    }
}
