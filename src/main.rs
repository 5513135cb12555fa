use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod cache;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::{scheduler::Scheduler, session::SessionRegistry};
use crate::bot::{events::ChannelAnnouncer, OpenJukeboxBot};
use crate::cache::QueryCache;
use crate::config::Config;
use crate::sources::{SpotifyClient, TrackResolver, YouTubeClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        YouTubeClient::verify_dependencies().await?;
        println!("OK");
        return Ok(());
    }

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Caché de consultas, cargada una sola vez
    let cache = Arc::new(QueryCache::load(config.cache_file.clone()).await);

    let youtube = YouTubeClient::new(config.resolve_concurrency, config.ytdlp_cookies.clone());
    let resolver = TrackResolver::new(Arc::new(youtube), cache);

    let spotify = config.spotify_credentials().map(|(id, secret)| {
        info!("🎧 Expansión de Spotify habilitada");
        SpotifyClient::new(id, secret)
    });

    // Los avisos usan su propio cliente HTTP para no depender del Client
    let sessions = Arc::new(SessionRegistry::new(config.max_queue_size));
    let announcer = ChannelAnnouncer::new(Arc::new(Http::new(&config.discord_token)), sessions.clone());
    let (scheduler, events) = Scheduler::new(sessions, resolver, Arc::new(announcer), config.idle_timeout);
    scheduler.spawn_event_loop(events);

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = OpenJukeboxBot::new(config.clone(), scheduler, spotify);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
