//! Taxonomía de errores del servicio.
//!
//! Los clientes externos (embeddings, LLM, Neo4j) devuelven `anyhow::Error`;
//! aquí se convierten en resultados tipados que cada capa sabe tratar.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Fallo al resolver un identificador de ruta contra el árbol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("identificador de ruta vacío")]
    EmptyPath,

    #[error("la ruta '{path_id}' se interrumpe en '{segment}' (nivel {depth})")]
    NotFound {
        path_id: String,
        segment: String,
        depth: usize,
    },
}

/// Motivo por el que una consulta no encontró contexto. No es un fallo del
/// servidor: se comunica al cliente como un mensaje dentro del stream.
#[derive(Debug, Error)]
pub enum RetrievalMiss {
    #[error("falló el embedding de la consulta: {0}")]
    EmbeddingFailed(String),

    #[error("el servicio de embeddings devolvió un vector vacío")]
    EmptyEmbedding,

    #[error("falló la búsqueda vectorial: {0}")]
    SearchFailed(String),

    #[error("la búsqueda vectorial no devolvió resultados")]
    NoMatches,

    #[error("el índice devolvió un identificador de ruta inválido: {0}")]
    InvalidPath(String),

    /// El índice vectorial y el árbol han divergido; hay que reindexar.
    #[error("el índice contiene '{path_id}' pero el árbol no ({cause})")]
    StaleIndex { path_id: String, cause: ResolveError },
}

/// Fallo fatal de una ejecución del indexador.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("el árbol no contiene nodos indexables")]
    NothingToIndex,

    #[error("no se pudieron generar los embeddings: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error("ningún embedding válido entre {documents} documentos; no se escribe nada")]
    NoValidEmbeddings { documents: usize },

    #[error("error escribiendo en el índice vectorial: {0}")]
    Store(#[source] anyhow::Error),
}

/// Errores del cliente detectados antes de empezar la recuperación.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Este endpoint sólo admite peticiones en streaming. Use 'stream: true'.")]
    StreamingRequired,

    #[error("No se encontró ningún mensaje de usuario en la petición.")]
    MissingQuestion,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": "invalid_request_error",
            }
        });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}
