//! Expansión de enlaces de Spotify a consultas de búsqueda.
//!
//! Spotify no se reproduce directamente: cada pista de una playlist, álbum,
//! top de artista o pista suelta se convierte en la consulta
//! `"<nombre> <primer artista>"`, que después se resuelve en YouTube.

use base64::{engine::general_purpose::STANDARD as B64_ENGINE, Engine};
use parking_lot::Mutex;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::{
    fmt,
    sync::LazyLock,
    time::{Duration, Instant},
};
use tracing::{debug, info};

use crate::error::{MusicError, MusicResult};

static SPOTIFY_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://open\.spotify\.com/(playlist|album|artist|track)/([a-zA-Z0-9]+)")
        .expect("patrón de URL de Spotify válido")
});

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Playlist,
    Album,
    Artist,
    Track,
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CatalogKind::Playlist => "playlist",
            CatalogKind::Album => "álbum",
            CatalogKind::Artist => "artista",
            CatalogKind::Track => "pista",
        })
    }
}

/// Enlace de catálogo reconocido en la consulta de `/play`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogLink {
    pub kind: CatalogKind,
    pub id: String,
}

impl CatalogLink {
    pub fn parse(query: &str) -> Option<Self> {
        let captures = SPOTIFY_URL.captures(query.trim())?;
        let kind = match &captures[1] {
            "playlist" => CatalogKind::Playlist,
            "album" => CatalogKind::Album,
            "artist" => CatalogKind::Artist,
            _ => CatalogKind::Track,
        };

        Some(Self {
            kind,
            id: captures[2].to_string(),
        })
    }

    fn endpoint(&self) -> String {
        match self.kind {
            CatalogKind::Playlist => format!("{}/playlists/{}/tracks", API_BASE, self.id),
            CatalogKind::Album => format!("{}/albums/{}/tracks", API_BASE, self.id),
            CatalogKind::Artist => format!("{}/artists/{}/top-tracks?market=US", API_BASE, self.id),
            CatalogKind::Track => format!("{}/tracks/{}", API_BASE, self.id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpotifyToken {
    access_token: String,
    expires_in: u64,
}

/// Cliente de la Web API de Spotify con credenciales de aplicación
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<(String, Instant)>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> MusicResult<String> {
        if let Some((token, expires_at)) = self.token.lock().clone() {
            if Instant::now() < expires_at {
                return Ok(token);
            }
        }

        let auth = B64_ENGINE.encode(format!("{}:{}", self.client_id, self.client_secret));
        let token: SpotifyToken = self
            .http
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {}", auth))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| MusicError::Catalog(e.to_string()))?
            .json()
            .await
            .map_err(|e| MusicError::Catalog(e.to_string()))?;

        debug!("🔑 Token de Spotify renovado ({}s)", token.expires_in);

        // Margen para no usar un token a punto de caducar
        let ttl = Duration::from_secs(token.expires_in.saturating_sub(30));
        *self.token.lock() = Some((token.access_token.clone(), Instant::now() + ttl));

        Ok(token.access_token)
    }

    /// Devuelve las consultas de búsqueda en el orden del catálogo.
    pub async fn expand(&self, link: &CatalogLink) -> MusicResult<Vec<String>> {
        let token = self.access_token().await?;

        let body: Value = self
            .http
            .get(link.endpoint())
            .bearer_auth(token)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| MusicError::Catalog(e.to_string()))?
            .json()
            .await
            .map_err(|e| MusicError::Catalog(e.to_string()))?;

        let queries = extract_queries(link.kind, &body);
        info!("🎧 Spotify {} {}: {} pistas", link.kind, link.id, queries.len());
        Ok(queries)
    }
}

fn extract_queries(kind: CatalogKind, body: &Value) -> Vec<String> {
    let items: Vec<&Value> = match kind {
        CatalogKind::Track => vec![body],
        CatalogKind::Artist => body["tracks"].as_array().map(|a| a.iter().collect()).unwrap_or_default(),
        CatalogKind::Playlist | CatalogKind::Album => {
            body["items"].as_array().map(|a| a.iter().collect()).unwrap_or_default()
        }
    };

    items
        .into_iter()
        .filter_map(|item| {
            // Las playlists envuelven la pista en `track`
            let track = item.get("track").filter(|t| !t.is_null()).unwrap_or(item);
            let name = track.get("name")?.as_str().filter(|n| !n.is_empty())?;
            let artist = track.get("artists")?.get(0)?.get("name")?.as_str()?;
            Some(format!("{} {}", name, artist))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_supported_links() {
        let link = CatalogLink::parse("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M?si=x").unwrap();
        assert_eq!(link.kind, CatalogKind::Playlist);
        assert_eq!(link.id, "37i9dQZF1DXcBWIGoYBM5M");

        assert_eq!(
            CatalogLink::parse("https://open.spotify.com/artist/0OdUWJ0sBjDrqHygGUXeCF").map(|l| l.kind),
            Some(CatalogKind::Artist)
        );
        assert!(CatalogLink::parse("https://open.spotify.com/show/abc").is_none());
        assert!(CatalogLink::parse("spotify playlist lofi").is_none());
    }

    #[test]
    fn playlist_items_unwrap_track_and_skip_incomplete() {
        let body = json!({
            "items": [
                { "track": { "name": "One", "artists": [{ "name": "Metallica" }, { "name": "Other" }] } },
                { "track": null },
                { "track": { "name": "", "artists": [{ "name": "Nobody" }] } },
                { "track": { "name": "Solo", "artists": [] } },
                { "track": { "name": "Two", "artists": [{ "name": "Band" }] } }
            ]
        });

        assert_eq!(
            extract_queries(CatalogKind::Playlist, &body),
            vec!["One Metallica".to_string(), "Two Band".to_string()]
        );
    }

    #[test]
    fn artist_and_track_shapes() {
        let top = json!({ "tracks": [{ "name": "Hit", "artists": [{ "name": "Star" }] }] });
        assert_eq!(extract_queries(CatalogKind::Artist, &top), vec!["Hit Star".to_string()]);

        let single = json!({ "name": "Alone", "artists": [{ "name": "Me" }] });
        assert_eq!(extract_queries(CatalogKind::Track, &single), vec!["Alone Me".to_string()]);

        assert!(extract_queries(CatalogKind::Album, &json!({})).is_empty());
    }
}
