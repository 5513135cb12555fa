use thiserror::Error;

/// Errores del dominio de reproducción.
///
/// Los comandos los muestran al usuario como mensaje de chat; dentro del
/// scheduler se convierten en recuperación (saltar la canción) y nunca
/// escapan del callback de fin de pista.
#[derive(Debug, Error)]
pub enum MusicError {
    /// La búsqueda no devolvió ninguna canción.
    #[error("no se encontró ninguna canción para '{0}'")]
    ResolutionNotFound(String),

    /// El locator ya no produce un stream reproducible.
    #[error("no se pudo obtener el stream de {locator}: {reason}")]
    StreamResolution { locator: String, reason: String },

    /// La conexión de voz no existe o se perdió.
    #[error("conexión de voz no disponible: {0}")]
    SinkUnavailable(String),

    /// Archivo de caché ilegible o corrupto.
    #[error("error de caché: {0}")]
    CacheIo(String),

    #[error("la cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    /// Fallo del servicio de catálogo (Spotify).
    #[error("error del catálogo: {0}")]
    Catalog(String),
}

impl MusicError {
    pub fn stream(locator: impl Into<String>, reason: impl ToString) -> Self {
        Self::StreamResolution {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }
}

pub type MusicResult<T> = std::result::Result<T, MusicError>;
