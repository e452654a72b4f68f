//! Streaming de completados.
//!
//! `stream_completion` envuelve un `CompletionBackend` para que los fallos
//! nunca salgan del stream: se transforman en un último fragmento de
//! diagnóstico.
//!
//! El stream es perezoso y de un solo consumidor. Si el cliente HTTP se
//! desconecta, axum suelta el stream y con él la conexión con el proveedor.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tracing::error;

use crate::llm::{CompletionBackend, CompletionRequest, TextStream};

/// Texto del fragmento que cierra un stream fallido.
pub fn diagnostic_message(err: &anyhow::Error) -> String {
    format!("Error: no se pudo conectar con el modelo de lenguaje. Detalles: {err}")
}

enum StreamerState {
    Pending(Arc<dyn CompletionBackend>, CompletionRequest),
    Streaming(TextStream),
    Done,
}

/// Reenvía los fragmentos no vacíos del modelo. Ante cualquier fallo emite un
/// único fragmento de diagnóstico y termina; nunca devuelve error.
pub fn stream_completion(
    backend: Arc<dyn CompletionBackend>,
    request: CompletionRequest,
) -> BoxStream<'static, String> {
    stream::unfold(StreamerState::Pending(backend, request), |state| async move {
        let mut upstream = match state {
            StreamerState::Pending(backend, request) => match backend.stream(request).await {
                Ok(upstream) => upstream,
                Err(err) => {
                    error!("Fallo al llamar a la API del LLM: {err:#}");
                    return Some((diagnostic_message(&err), StreamerState::Done));
                }
            },
            StreamerState::Streaming(upstream) => upstream,
            StreamerState::Done => return None,
        };

        while let Some(item) = upstream.next().await {
            match item {
                Ok(text) if text.is_empty() => continue,
                Ok(text) => return Some((text, StreamerState::Streaming(upstream))),
                Err(err) => {
                    error!("El stream del LLM se interrumpió: {err:#}");
                    return Some((diagnostic_message(&err), StreamerState::Done));
                }
            }
        }
        None
    })
    .boxed()
}
