use anyhow::Result;
use serenity::{
    async_trait,
    builder::{CreateEmbed, CreateMessage},
    http::Http,
    model::id::GuildId,
};
use std::sync::Arc;
use tracing::{debug, error};

use crate::{
    audio::{session::SessionRegistry, PlaybackObserver},
    error::MusicError,
    sources::SongRecord,
    ui::embeds,
};

/// Publica los avisos de reproducción en el canal de texto del último `/play`
pub struct ChannelAnnouncer {
    http: Arc<Http>,
    sessions: Arc<SessionRegistry>,
}

impl ChannelAnnouncer {
    pub fn new(http: Arc<Http>, sessions: Arc<SessionRegistry>) -> Self {
        Self { http, sessions }
    }

    async fn send(&self, guild_id: GuildId, message: CreateMessage) -> Result<()> {
        let Some(channel_id) = self.sessions.get(guild_id).and_then(|s| s.announce_channel()) else {
            debug!("Sin canal de anuncios en guild {}", guild_id);
            return Ok(());
        };

        channel_id.send_message(&self.http, message).await?;
        Ok(())
    }

    async fn say(&self, guild_id: GuildId, content: String) {
        if let Err(e) = self.send(guild_id, CreateMessage::new().content(content)).await {
            error!("Error al enviar mensaje en guild {}: {:?}", guild_id, e);
        }
    }

    async fn embed(&self, guild_id: GuildId, embed: CreateEmbed) {
        if let Err(e) = self.send(guild_id, CreateMessage::new().embed(embed)).await {
            error!("Error al enviar mensaje now playing: {:?}", e);
        }
    }
}

#[async_trait]
impl PlaybackObserver for ChannelAnnouncer {
    async fn now_playing(&self, guild_id: GuildId, song: &SongRecord) {
        self.embed(guild_id, embeds::create_now_playing_embed(song)).await;
    }

    async fn track_failed(&self, guild_id: GuildId, song: &SongRecord, error: &MusicError) {
        debug!("Aviso de fallo para '{}': {}", song.title(), error);
        self.say(
            guild_id,
            format!("⚠️ No se pudo reproducir **{}**, saltando a la siguiente", song.title()),
        )
        .await;
    }

    async fn playback_interrupted(&self, guild_id: GuildId, error: &MusicError) {
        self.say(guild_id, format!("❌ Reproducción interrumpida: {}", error)).await;
    }

    async fn idle_disconnected(&self, guild_id: GuildId) {
        self.say(guild_id, "👋 Desconectado por inactividad".to_string()).await;
    }

    async fn playlist_ingested(&self, guild_id: GuildId, added: usize) {
        self.say(guild_id, format!("📋 Playlist procesada: {} canciones más en la cola", added))
            .await;
    }
}
