use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Reproducción
    pub idle_timeout: Duration,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,

    // Rendimiento
    pub resolve_concurrency: usize,

    // Paths
    pub data_dir: PathBuf,
    pub cache_file: PathBuf,
    pub ytdlp_cookies: Option<PathBuf>,

    // APIs (Opcionales)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("No se pudo crear {}", config.data_dir.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Construye la configuración a partir de una fuente de variables
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        // Una variable vacía cuenta como ausente
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let data_dir: PathBuf = var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir);

        Ok(Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID no está definido")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: var("GUILD_ID").and_then(|s| s.parse().ok()),

            // Reproducción
            idle_timeout: match var("IDLE_TIMEOUT") {
                Some(val) => humantime::parse_duration(&val).context("IDLE_TIMEOUT inválido")?,
                None => defaults.idle_timeout,
            },
            max_queue_size: match var("MAX_QUEUE_SIZE") {
                Some(val) => val.parse().context("MAX_QUEUE_SIZE inválido")?,
                None => defaults.max_queue_size,
            },
            max_playlist_size: match var("MAX_PLAYLIST_SIZE") {
                Some(val) => val.parse().context("MAX_PLAYLIST_SIZE inválido")?,
                None => defaults.max_playlist_size,
            },

            // Rendimiento
            resolve_concurrency: match var("RESOLVE_CONCURRENCY") {
                Some(val) => val.parse().context("RESOLVE_CONCURRENCY inválido")?,
                None => defaults.resolve_concurrency,
            },

            // Paths
            cache_file: var("CACHE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("cache.json")),
            data_dir,
            ytdlp_cookies: var("YTDLP_COOKIES").map(PathBuf::from),

            // APIs
            spotify_client_id: var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: var("SPOTIFY_CLIENT_SECRET"),
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// Rejects limits that would make the bot unusable (an empty queue, a
    /// zero idle timeout that disconnects immediately, no resolver workers).
    pub fn validate(&self) -> Result<()> {
        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.resolve_concurrency == 0 {
            anyhow::bail!("Resolve concurrency must be greater than 0");
        }

        if self.idle_timeout.is_zero() {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    /// Credenciales de Spotify, si ambas están presentes
    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        self.spotify_client_id
            .clone()
            .zip(self.spotify_client_secret.clone())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and secrets are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Playback: {} idle timeout, {} queue, {} playlist\n  \
            Resolver: {} concurrent, cache {}\n  \
            Spotify: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            humantime::format_duration(self.idle_timeout),
            self.max_queue_size,
            self.max_playlist_size,
            self.resolve_concurrency,
            self.cache_file.display(),
            if self.spotify_credentials().is_some() { "enabled" } else { "disabled" },
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            idle_timeout: Duration::from_secs(120),
            max_queue_size: 1000,
            max_playlist_size: 100,

            resolve_concurrency: num_cpus::get(),

            data_dir: "./data".into(),
            cache_file: "./data/cache.json".into(),
            ytdlp_cookies: None,

            spotify_client_id: None,
            spotify_client_secret: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "t"), ("APPLICATION_ID", "42")])).unwrap();

        assert_eq!(config.application_id, 42);
        assert_eq!(config.idle_timeout, Duration::from_secs(120));
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.max_playlist_size, 100);
        assert_eq!(config.cache_file, PathBuf::from("./data/cache.json"));
        assert!(config.spotify_credentials().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "t"),
            ("APPLICATION_ID", "1"),
            ("GUILD_ID", "99"),
            ("DATA_DIR", "/srv/jukebox"),
            ("IDLE_TIMEOUT", "5m 30s"),
            ("RESOLVE_CONCURRENCY", "3"),
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.guild_id, Some(99));
        assert_eq!(config.idle_timeout, Duration::from_secs(330));
        assert_eq!(config.resolve_concurrency, 3);
        assert_eq!(config.cache_file, PathBuf::from("/srv/jukebox/cache.json"));
        assert_eq!(config.spotify_credentials(), Some(("id".to_string(), "secret".to_string())));
    }

    #[test]
    fn missing_token_and_bad_values_fail() {
        assert!(Config::from_lookup(lookup(&[("APPLICATION_ID", "1")])).is_err());
        assert!(Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "t"),
            ("APPLICATION_ID", "1"),
            ("IDLE_TIMEOUT", "soon"),
        ]))
        .is_err());

        let half_spotify = Config {
            spotify_client_id: Some("id".into()),
            ..Config::default()
        };
        assert!(half_spotify.validate().is_err());
    }
}
