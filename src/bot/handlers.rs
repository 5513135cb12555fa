use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::queue::LoopMode,
    bot::OpenJukeboxBot,
    error::MusicError,
    sources::CatalogLink,
    ui::embeds::{self, QUEUE_DISPLAY_LIMIT},
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &OpenJukeboxBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "shuffle" => handle_shuffle(ctx, &command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await?,
        "help" => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::create_help_embed())
                            .ephemeral(true),
                    ),
                )
                .await?
        }
        _ => respond(ctx, &command, "❌ Comando no reconocido").await?,
    }

    Ok(())
}

async fn respond(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(content)),
        )
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

async fn edit_error(ctx: &Context, command: &CommandInteraction, error: &MusicError) -> Result<()> {
    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(embeds::create_error_embed("No se pudo reproducir", &error.to_string())),
        )
        .await?;
    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenJukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .trim()
        .to_string();

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let Some(voice_channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return edit(ctx, command, "❌ Debes estar en un canal de voz").await;
    };

    if let Err(e) = bot.join_voice_channel(ctx, guild_id, voice_channel_id).await {
        warn!("No se pudo conectar en guild {}: {:?}", guild_id, e);
        return edit(ctx, command, format!("❌ {}", e)).await;
    }

    bot.scheduler
        .sessions()
        .get_or_create(guild_id)
        .set_announce_channel(command.channel_id);

    match CatalogLink::parse(&query) {
        Some(link) => play_catalog(ctx, command, bot, guild_id, link).await,
        None => play_single(ctx, command, bot, guild_id, &query).await,
    }
}

async fn play_single(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenJukeboxBot,
    guild_id: GuildId,
    query: &str,
) -> Result<()> {
    let song = match bot.scheduler.resolver().resolve_query(query).await {
        Ok(song) => song,
        Err(e) => return edit_error(ctx, command, &e).await,
    };

    let position = match bot.scheduler.enqueue(guild_id, song.clone()) {
        Ok(position) => position,
        Err(e) => return edit_error(ctx, command, &e).await,
    };
    bot.scheduler.spawn_kick(guild_id);

    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(embeds::create_song_added_embed(&song, position)),
        )
        .await?;

    Ok(())
}

async fn play_catalog(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenJukeboxBot,
    guild_id: GuildId,
    link: CatalogLink,
) -> Result<()> {
    let Some(spotify) = &bot.spotify else {
        return edit(ctx, command, "❌ Spotify no está configurado en este bot").await;
    };

    edit(ctx, command, format!("🔎 Reconocido {} de Spotify, procesando...", link.kind)).await?;

    let mut queries = match spotify.expand(&link).await {
        Ok(queries) => queries,
        Err(e) => return edit_error(ctx, command, &e).await,
    };
    if queries.is_empty() {
        return edit(ctx, command, "❌ No se encontraron pistas").await;
    }
    queries.truncate(bot.config().max_playlist_size);

    match bot.ingestor.ingest(guild_id, queries).await {
        Ok(start) if start.pending == 0 => {
            command
                .edit_response(
                    &ctx.http,
                    EditInteractionResponse::new()
                        .content("")
                        .embed(embeds::create_song_added_embed(&start.first, 1)),
                )
                .await?;
        }
        Ok(start) => {
            edit(
                ctx,
                command,
                format!(
                    "✅ Agregada **{}**, procesando {} canciones más en segundo plano...",
                    start.first.title(),
                    start.pending
                ),
            )
            .await?;
        }
        Err(e) => edit_error(ctx, command, &e).await?,
    }

    Ok(())
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenJukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let outcome = bot.scheduler.skip(guild_id).await;
    respond(ctx, command, outcome.to_string()).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenJukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let message = if bot.scheduler.stop(guild_id).await {
        "⏹️ Reproducción detenida y cola limpiada"
    } else {
        "❌ No estoy conectado a un canal de voz"
    };
    respond(ctx, command, message).await
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenJukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let message = match bot.scheduler.leave(guild_id).await {
        Ok(true) => "👋 Desconectado del canal de voz".to_string(),
        Ok(false) => "❌ No estoy conectado a un canal de voz".to_string(),
        Err(e) => format!("❌ {}", e),
    };
    respond(ctx, command, message).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenJukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let (snapshot, loop_mode) = bot.scheduler.queue_view(guild_id, QUEUE_DISPLAY_LIMIT);

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embeds::create_queue_embed(&snapshot, loop_mode)),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_shuffle(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenJukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let message = if bot.scheduler.shuffle(guild_id) {
        "🔀 Cola mezclada"
    } else {
        "❌ No hay suficientes canciones para mezclar"
    };
    respond(ctx, command, message).await
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenJukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let mode = bot.scheduler.cycle_loop(guild_id);
    let message = match mode {
        LoopMode::Off => "➡️ Repetición desactivada".to_string(),
        mode => format!("Modo de repetición: {}", mode),
    };
    respond(ctx, command, message).await
}

// Funciones auxiliares

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
