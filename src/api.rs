//! API HTTP compatible con OpenAI.
//!
//! `POST /v1/chat/completions` sólo admite `stream: true`. La respuesta es
//! siempre un stream SSE: fragmentos de contenido, un fragmento con
//! `finish_reason: "stop"` y `[DONE]`. Si no hay contexto, el contenido es un
//! único mensaje de disculpa.

use std::convert::Infallible;

use axum::{
    extract::{Json, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Router,
};
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    error::ApiError,
    llm::CompletionRequest,
    streaming::stream_completion,
};

/// Mensaje que recibe el cliente cuando no se encuentra contexto.
pub const NOT_FOUND_MESSAGE: &str =
    "Lo siento, no he encontrado información relacionada con tu pregunta en la base de conocimiento. Prueba a formularla de otra manera.";

// --- Payloads compatibles con OpenAI ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Contenido del último mensaje de usuario que no esté en blanco.
    pub fn last_user_question(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|msg| msg.role == Role::User)
            .map(|msg| msg.content.trim())
            .filter(|content| !content.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceDelta {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChoiceDelta>,
}

/// Datos comunes a todos los fragmentos de una misma respuesta.
#[derive(Debug, Clone)]
struct ChunkEnvelope {
    id: String,
    created: i64,
    model: String,
}

impl ChunkEnvelope {
    fn new(model: String) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
            created: Utc::now().timestamp(),
            model,
        }
    }

    fn chunk(&self, content: Option<String>, finish_reason: Option<&str>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChoiceDelta {
                index: 0,
                delta: Delta { content },
                finish_reason: finish_reason.map(str::to_string),
            }],
        }
    }

    fn content_event(&self, text: String) -> Event {
        to_event(&self.chunk(Some(text), None))
    }

    /// Fragmento con `finish_reason: "stop"` seguido de `[DONE]`.
    fn closing_events(&self) -> Vec<Result<Event, Infallible>> {
        vec![
            Ok(to_event(&self.chunk(None, Some("stop")))),
            Ok(Event::default().data("[DONE]")),
        ]
    }
}

fn to_event(chunk: &ChatCompletionChunk) -> Event {
    Event::default().json_data(chunk).unwrap_or_else(|err| {
        error!("No se pudo serializar el fragmento SSE: {err}");
        Event::default().comment("error de serialización")
    })
}

type EventStream = BoxStream<'static, Result<Event, Infallible>>;

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/v1/chat/completions", post(chat_completions_handler))
        .with_state(app_state)
}

// --- Handlers ---

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Bienvenido a la API RAG compatible con OpenAI. Use POST /v1/chat/completions."
    }))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[axum::debug_handler]
async fn chat_completions_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    if !payload.stream {
        return Err(ApiError::StreamingRequired);
    }
    let question = payload
        .last_user_question()
        .ok_or(ApiError::MissingQuestion)?
        .to_string();
    let model = payload
        .model
        .as_deref()
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .unwrap_or(state.config.llm_model.as_str())
        .to_string();

    info!("Pregunta recibida: {question}");
    let envelope = ChunkEnvelope::new(model.clone());

    let events = match state.retriever.retrieve(&question).await {
        Ok(context) => {
            info!("Contexto recuperado: {}", context.formatted_path);
            let prompt = state
                .prompt
                .render(&context.formatted_path, context.subtree, &question);
            debug!("Prompt construido:\n{prompt}");

            let request = CompletionRequest { model, prompt };
            answer_stream(envelope, stream_completion(state.completion.clone(), request))
        }
        Err(reason) => {
            warn!("No se pudo recuperar contexto de la base de conocimiento: {reason}");
            not_found_stream(envelope)
        }
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()).into_response())
}

fn answer_stream(envelope: ChunkEnvelope, chunks: BoxStream<'static, String>) -> EventStream {
    let closing = envelope.closing_events();
    chunks
        .map(move |text| Ok(envelope.content_event(text)))
        .chain(stream::iter(closing))
        .boxed()
}

fn not_found_stream(envelope: ChunkEnvelope) -> EventStream {
    let mut events = vec![Ok(envelope.content_event(NOT_FOUND_MESSAGE.to_string()))];
    events.extend(envelope.closing_events());
    stream::iter(events).boxed()
}
