use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use super::{MusicSource, SongRecord, StreamHandle};
use crate::error::{MusicError, MusicResult};

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YouTubeClient {
    rate_limiter: Semaphore,
    cookies: Option<PathBuf>,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
}

impl YouTubeClient {
    pub fn new(max_concurrent: usize, cookies: Option<PathBuf>) -> Self {
        Self {
            // Limitar procesos yt-dlp concurrentes para evitar rate limiting
            rate_limiter: Semaphore::new(max_concurrent.max(1)),
            cookies,
        }
    }

    /// Verifica si una URL es de YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };

        matches!(
            parsed.host_str(),
            Some("www.youtube.com" | "youtube.com" | "youtu.be" | "m.youtube.com" | "music.youtube.com")
        )
    }

    /// Verifica que yt-dlp y ffmpeg estén disponibles
    pub async fn verify_dependencies() -> anyhow::Result<()> {
        for (binary, flag) in [("yt-dlp", "--version"), ("ffmpeg", "-version")] {
            let output = Command::new(binary).arg(flag).output().await;
            match output {
                Ok(output) if output.status.success() => debug!("✅ {} disponible", binary),
                _ => anyhow::bail!("{} no está instalado o no está en PATH", binary),
            }
        }
        Ok(())
    }

    async fn run_ytdlp(&self, args: &[&str]) -> Result<String, String> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| e.to_string())?;

        let mut cmd = Command::new("yt-dlp");
        cmd.args(["--no-playlist", "--no-warnings", "--quiet"]);
        if let Some(cookies) = &self.cookies {
            cmd.arg("--cookies").arg(cookies);
        }
        cmd.args(args);

        let output = cmd
            .output()
            .await
            .map_err(|e| format!("Error al ejecutar yt-dlp: {}", e))?;

        if !output.status.success() {
            return Err(format!(
                "yt-dlp error: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Primer resultado con título y locator permanente (`webpage_url`, o `url`
/// en modo `--flat-playlist`).
fn parse_search_output(stdout: &str) -> Option<SongRecord> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
        .find_map(|info| {
            let locator = info.webpage_url.or(info.url)?;
            let title = info.title.unwrap_or_else(|| "Untitled".to_string());
            Some(SongRecord::new(locator, title))
        })
}

fn parse_stream_output(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("http"))
        .map(str::to_string)
}

#[async_trait]
impl MusicSource for YouTubeClient {
    async fn search(&self, query: &str) -> MusicResult<Option<SongRecord>> {
        let stdout = if Self::is_youtube_url(query) {
            debug!("📊 Obteniendo info de: {}", query);
            self.run_ytdlp(&["--dump-json", query]).await
        } else {
            info!("🔍 Buscando en YouTube: {}", query);
            let search_query = format!("ytsearch1:{}", query);
            self.run_ytdlp(&["--dump-json", "--flat-playlist", &search_query])
                .await
        };

        match stdout {
            Ok(stdout) => Ok(parse_search_output(&stdout)),
            Err(e) => {
                // Igual que una búsqueda vacía: el usuario ve "no encontrado"
                warn!("❌ Búsqueda fallida para '{}': {}", query, e);
                Ok(None)
            }
        }
    }

    async fn stream(&self, locator: &str) -> MusicResult<StreamHandle> {
        let stdout = self
            .run_ytdlp(&["-f", "bestaudio[ext=m4a]/bestaudio/best", "--get-url", locator])
            .await
            .map_err(|e| MusicError::stream(locator, e))?;

        parse_stream_output(&stdout)
            .map(StreamHandle::new)
            .ok_or_else(|| MusicError::stream(locator, "yt-dlp no devolvió URL de stream"))
    }

    fn source_name(&self) -> &'static str {
        "YouTube"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_youtube_url_detection() {
        assert!(YouTubeClient::is_youtube_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(YouTubeClient::is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(YouTubeClient::is_youtube_url(
            "https://music.youtube.com/watch?v=test"
        ));
        assert!(!YouTubeClient::is_youtube_url("https://example.com/video"));
        assert!(!YouTubeClient::is_youtube_url("never gonna give you up"));
    }

    #[test]
    fn search_output_prefers_webpage_url() {
        let stdout = r#"{"id":"abc","title":"Song","webpage_url":"https://www.youtube.com/watch?v=abc","url":"https://rr1.googlevideo.com/x"}"#;
        assert_eq!(
            parse_search_output(stdout),
            Some(SongRecord::new("https://www.youtube.com/watch?v=abc", "Song"))
        );
    }

    #[test]
    fn flat_search_output_falls_back_to_url() {
        let stdout = "garbage line\n{\"title\":\"Flat\",\"url\":\"https://www.youtube.com/watch?v=f\"}\n";
        assert_eq!(
            parse_search_output(stdout),
            Some(SongRecord::new("https://www.youtube.com/watch?v=f", "Flat"))
        );
        assert_eq!(parse_search_output(""), None);
    }

    #[test]
    fn stream_output_takes_first_url_line() {
        assert_eq!(
            parse_stream_output("\nhttps://rr3.googlevideo.com/videoplayback?a=1\n"),
            Some("https://rr3.googlevideo.com/videoplayback?a=1".to_string())
        );
        assert_eq!(parse_stream_output("ERROR: nope"), None);
    }
}
