//! # Audio Module
//!
//! Per-guild playback: queue, play-next state machine, playlist ingestion and
//! the idle-disconnect policy.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue Management
//! - FIFO queue whose head is the song currently playing
//! - Loop modes (`off`, `queue`, `song`) applied when an attempt ends
//!
//! ### [`session`] - Guild Sessions
//! - One session per guild, created lazily, held in an explicit registry
//! - Owns the queue, loop mode, voice sink and announcement channel
//!
//! ### [`scheduler`] - Playback Scheduler
//! - Resolves the head to a fresh stream and hands it to the sink
//! - Completion callbacks arrive as [`scheduler::SchedulerEvent`] messages
//! - Unplayable songs are dropped and the next one is tried in a loop
//!
//! ### [`ingest`] - Playlist Ingestion
//! - First track resolved up front so playback starts quickly
//! - Remaining tracks resolved concurrently and appended in one batch
//!
//! ### [`sink`] - Voice Output
//! - [`sink::VoiceSink`] abstracts the voice connection; Songbird backs it
//!   in production

pub mod ingest;
pub mod queue;
pub mod scheduler;
pub mod session;
pub mod sink;

use async_trait::async_trait;
use serenity::model::id::GuildId;

use crate::error::MusicError;
use crate::sources::SongRecord;

/// Receives user-visible playback notifications.
///
/// The scheduler never talks to the chat platform directly; the bot layer
/// implements this to post messages in the guild's announcement channel.
#[async_trait]
pub trait PlaybackObserver: Send + Sync {
    async fn now_playing(&self, guild_id: GuildId, song: &SongRecord);

    /// A queued song could not be streamed and was dropped.
    async fn track_failed(&self, guild_id: GuildId, song: &SongRecord, error: &MusicError);

    /// The sink refused a stream; the queue is left as it was.
    async fn playback_interrupted(&self, guild_id: GuildId, error: &MusicError);

    async fn idle_disconnected(&self, guild_id: GuildId);

    /// Background playlist resolution finished with `added` new songs.
    async fn playlist_ingested(&self, guild_id: GuildId, added: usize);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Observer que guarda cada notificación como texto
    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().push(event);
        }
    }

    #[async_trait]
    impl PlaybackObserver for RecordingObserver {
        async fn now_playing(&self, _guild_id: GuildId, song: &SongRecord) {
            self.push(format!("now:{}", song.title()));
        }

        async fn track_failed(&self, _guild_id: GuildId, song: &SongRecord, _error: &MusicError) {
            self.push(format!("failed:{}", song.title()));
        }

        async fn playback_interrupted(&self, _guild_id: GuildId, _error: &MusicError) {
            self.push("interrupted".to_string());
        }

        async fn idle_disconnected(&self, _guild_id: GuildId) {
            self.push("idle".to_string());
        }

        async fn playlist_ingested(&self, _guild_id: GuildId, added: usize) {
            self.push(format!("ingested:{}", added));
        }
    }
}
