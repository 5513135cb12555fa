use rand::seq::SliceRandom;
use std::{collections::VecDeque, fmt};
use tracing::{debug, info};

use crate::error::{MusicError, MusicResult};
use crate::sources::SongRecord;

/// Qué hacer con la cabeza de la cola cuando termina su reproducción.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Se descarta la cabeza
    #[default]
    Off,
    /// La cabeza pasa al final
    Queue,
    /// La cabeza se queda delante y se repite
    Song,
}

impl LoopMode {
    /// Siguiente modo del ciclo de `/loop`: Off → Queue → Song → Off
    pub fn cycle(self) -> Self {
        match self {
            LoopMode::Off => LoopMode::Queue,
            LoopMode::Queue => LoopMode::Song,
            LoopMode::Song => LoopMode::Off,
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopMode::Off => "Desactivado",
            LoopMode::Queue => "Cola 🔁",
            LoopMode::Song => "Canción 🔂",
        })
    }
}

/// Cola de reproducción de una guild.
///
/// La cabeza es la canción que se está reproduciendo (o a punto de
/// reproducirse). Solo sale de la cola cuando su intento termina, vía
/// [`advance`](Self::advance) o [`drop_head`](Self::drop_head).
#[derive(Debug)]
pub struct PlaybackQueue {
    items: VecDeque<SongRecord>,
    max_size: usize,
}

impl PlaybackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega una canción al final
    pub fn enqueue(&mut self, song: SongRecord) -> MusicResult<()> {
        if self.items.len() >= self.max_size {
            return Err(MusicError::QueueFull(self.max_size));
        }

        info!("➕ Agregado a la cola: {}", song.title());
        self.items.push_back(song);
        Ok(())
    }

    /// Agrega varias canciones de una vez; devuelve cuántas entraron
    pub fn extend(&mut self, songs: Vec<SongRecord>) -> usize {
        let available = self.max_size.saturating_sub(self.items.len());
        let to_add = songs.len().min(available);

        self.items.extend(songs.into_iter().take(to_add));

        info!("➕ Agregadas {} canciones a la cola", to_add);
        to_add
    }

    pub fn peek_head(&self) -> Option<&SongRecord> {
        self.items.front()
    }

    /// Aplica el modo de loop a la cabeza tras terminar su reproducción
    pub fn advance(&mut self, mode: LoopMode) {
        match mode {
            LoopMode::Off => {
                if let Some(played) = self.items.pop_front() {
                    debug!("➡️ Terminada: {}", played.title());
                }
            }
            LoopMode::Queue => {
                if let Some(played) = self.items.pop_front() {
                    debug!("🔁 Al final de la cola: {}", played.title());
                    self.items.push_back(played);
                }
            }
            LoopMode::Song => {
                if let Some(current) = self.items.front() {
                    debug!("🔂 Repitiendo: {}", current.title());
                }
            }
        }
    }

    /// Descarta la cabeza sin importar el modo de loop (canción fallida)
    pub fn drop_head(&mut self) -> Option<SongRecord> {
        self.items.pop_front()
    }

    /// Mezcla todo excepto la cabeza, que puede estar sonando
    pub fn shuffle_tail(&mut self) -> bool {
        if self.items.len() < 2 {
            return false;
        }

        let mut rng = rand::thread_rng();
        self.items.make_contiguous()[1..].shuffle(&mut rng);
        info!("🔀 Cola mezclada");
        true
    }

    pub fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Cola limpiada");
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[allow(dead_code)]
    pub fn iter(&self) -> impl Iterator<Item = &SongRecord> {
        self.items.iter()
    }

    /// Primeras `limit` canciones y total, para mostrar la cola
    pub fn snapshot(&self, limit: usize) -> QueueSnapshot {
        QueueSnapshot {
            items: self.items.iter().take(limit).cloned().collect(),
            total_items: self.items.len(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    pub items: Vec<SongRecord>,
    pub total_items: usize,
}

impl QueueSnapshot {
    pub fn remaining(&self) -> usize {
        self.total_items.saturating_sub(self.items.len())
    }
}
