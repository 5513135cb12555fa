use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::queue::{LoopMode, QueueSnapshot},
    sources::SongRecord,
};

/// Canciones visibles en `/queue`
pub const QUEUE_DISPLAY_LIMIT: usize = 10;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Open Jukebox";

pub fn create_now_playing_embed(song: &SongRecord) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", song.title()))
        .url(song.locator())
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_song_added_embed(song: &SongRecord, position: usize) -> CreateEmbed {
    let footer = if position <= 1 {
        "🎵 Sonará enseguida".to_string()
    } else {
        format!("📋 Posición en la cola: {}", position)
    };

    CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}** se ha agregado a la cola de reproducción", song.title()))
        .url(song.locator())
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(footer))
}

pub fn create_queue_embed(snapshot: &QueueSnapshot, loop_mode: LoopMode) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now());

    if snapshot.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    let embed = embed
        .description(queue_lines(snapshot))
        .field("🔁 Loop", loop_mode.to_string(), true)
        .field("Total", format!("{} canciones", snapshot.total_items), true);

    match snapshot.remaining() {
        0 => embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER)),
        n => embed.footer(CreateEmbedFooter::new(format!("y {} canciones más", n))),
    }
}

/// La primera línea es la canción actual
fn queue_lines(snapshot: &QueueSnapshot) -> String {
    snapshot
        .items
        .iter()
        .enumerate()
        .map(|(i, song)| match i {
            0 => format!("▶️ **{}**", song.title()),
            _ => format!("**{}**. {}", i, song.title()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Open Jukebox - Comandos")
        .color(colors::INFO_BLUE)
        .description("Reproduce música de YouTube en tu canal de voz")
        .field(
            "🎵 Reproducción",
            "• `/play <canción|URL>` - Agrega a la cola (YouTube o Spotify)\n\
            • `/skip` - Salta la canción actual\n\
            • `/stop` - Detiene y limpia la cola\n\
            • `/leave` - Desconecta del canal de voz",
            false,
        )
        .field(
            "📜 Cola",
            "• `/queue` - Muestra la cola\n\
            • `/shuffle` - Mezcla las canciones pendientes\n\
            • `/loop` - Cambia el modo: desactivado → cola → canción",
            false,
        )
        .field(
            "🎵 Fuentes",
            "• Búsquedas de texto y URLs de YouTube\n\
            • Playlists, álbumes, artistas y pistas de Spotify",
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn queue_lines_mark_current_song() {
        let snapshot = QueueSnapshot {
            items: vec![SongRecord::new("u1", "Uno"), SongRecord::new("u2", "Dos"), SongRecord::new("u3", "Tres")],
            total_items: 14,
        };

        assert_eq!(queue_lines(&snapshot), "▶️ **Uno**\n**1**. Dos\n**2**. Tres");
        assert_eq!(snapshot.remaining(), 11);
    }
}
