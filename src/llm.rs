//! Clientes de los servicios externos de IA, ambos sobre el proveedor OpenAI de Rig.
//!
//! - Embeddings: `OPENAI_API_KEY` y `OPENAI_BASE_URL`.
//! - Chat en streaming: API Chat Completions en `LLM_API_BASE_URL`
//!   (vLLM, Ollama, OpenAI...).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use rig::embeddings::EmbeddingError;
use rig::providers::openai;
use rig::streaming::StreamedAssistantContent;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::AppConfig;

/// Servicio que convierte texto en vectores.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Calcula los embeddings de un lote. El servicio puede devolver menos
    /// vectores que textos; quien llama debe emparejarlos por posición.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>>;

    /// Embedding de un único texto; vector vacío si el servicio no devolvió nada.
    async fn embed_query(&self, text: &str) -> Result<Vec<f64>> {
        let mut vectors = self.embed_batch(vec![text.to_string()]).await?;
        Ok(if vectors.is_empty() {
            Vec::new()
        } else {
            vectors.swap_remove(0)
        })
    }
}

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Embeddings vía Rig (proveedor OpenAI o compatible).
///
/// Rig rechaza una respuesta con un número de vectores distinto al de textos
/// o con vectores nulos. En ese caso se repite la petición sin Rig y cada vector se coloca en la
/// posición que indica su `index`; los huecos quedan como vectores vacíos.
pub struct RigEmbedder {
    client: openai::Client,
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct EmbeddingsPayload {
    #[serde(default)]
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    embedding: Option<Vec<f64>>,
}

impl RigEmbedder {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = openai::Client::builder(api_key).base_url(&base_url).build();
        Self {
            client,
            http: reqwest::Client::new(),
            base_url,
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("Falta OPENAI_API_KEY en el entorno (servicio de embeddings)"))?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string());
        info!("[Embedding] Cliente Rig en {} con el modelo {}", base_url, cfg.embedding_model);
        Ok(Self::new(&api_key, &base_url, &cfg.embedding_model))
    }

    /// Llama a `/embeddings` directamente y ordena el resultado por `index`.
    async fn embed_by_index(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await?
            .error_for_status()?;
        let payload: EmbeddingsPayload = response.json().await?;
        Ok(place_by_index(payload.data, texts.len()))
    }
}

/// Coloca cada vector en su posición; sin `index` se usa el orden de llegada.
fn place_by_index(items: Vec<EmbeddingItem>, len: usize) -> Vec<Vec<f64>> {
    let mut vectors = vec![Vec::new(); len];
    for (position, item) in items.into_iter().enumerate() {
        let slot = item.index.unwrap_or(position);
        match (vectors.get_mut(slot), item.embedding) {
            (Some(target), Some(embedding)) => *target = embedding,
            (None, _) => warn!("[Embedding] Índice {slot} fuera de rango ({len} documentos)"),
            (Some(_), None) => {}
        }
    }
    vectors
}

#[async_trait]
impl Embedder for RigEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;
        use rig::embeddings::EmbeddingModel as _;

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("[Embedding] Enviando {} documento(s) al modelo {}", texts.len(), self.model);
        let embedding_model = self.client.embedding_model(&self.model);
        match embedding_model.embed_texts(texts.clone()).await {
            Ok(embeddings) => {
                debug!("[Embedding] Recibidos {} embedding(s)", embeddings.len());
                Ok(embeddings.into_iter().map(|e| e.vec).collect())
            }
            Err(err @ (EmbeddingError::ResponseError(_) | EmbeddingError::JsonError(_))) => {
                warn!("[Embedding] Respuesta incompleta ({err}); se emparejan los vectores por índice.");
                self.embed_by_index(&texts).await
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Petición de completado: el prompt ya construido y el modelo efectivo.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
}

/// Fragmentos de texto del modelo tal como llegan por la red.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Servicio de generación de texto en streaming.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Abre el stream. Un error aquí significa que no llegó ningún fragmento.
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream>;
}

/// Chat en streaming con la API Chat Completions vía Rig.
pub struct RigChatBackend {
    client: openai::Client,
    temperature: f64,
    max_tokens: u32,
    enable_thinking: Option<bool>,
}

impl RigChatBackend {
    pub fn new(api_key: &str, base_url: &str, temperature: f64, max_tokens: u32, enable_thinking: Option<bool>) -> Self {
        let client = openai::Client::builder(api_key)
            .base_url(base_url.trim_end_matches('/'))
            .build();
        Self {
            client,
            temperature,
            max_tokens,
            enable_thinking,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        info!("[LLM] Cliente de chat apuntando a {}", cfg.llm_api_base_url);
        Self::new(
            &cfg.llm_api_key,
            &cfg.llm_api_base_url,
            f64::from(cfg.llm_temperature),
            cfg.llm_max_tokens,
            cfg.llm_enable_thinking,
        )
    }

    /// Parámetros que Rig no serializa por sí mismo en Chat Completions.
    fn additional_params(&self) -> serde_json::Value {
        let mut params = json!({ "max_tokens": self.max_tokens });
        if let Some(enable_thinking) = self.enable_thinking {
            params["chat_template_kwargs"] = json!({ "enable_thinking": enable_thinking });
        }
        params
    }
}

#[async_trait]
impl CompletionBackend for RigChatBackend {
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream> {
        // Trait para client.completion_model(...)
        use rig::client::CompletionClient as _;
        use rig::completion::CompletionModel as _;

        let model = self.client.completion_model(&request.model).completions_api();
        let response = model
            .completion_request(request.prompt)
            .temperature(self.temperature)
            .additional_params(self.additional_params())
            .stream()
            .await?;

        let chunks = response.filter_map(|item| async move {
            match item {
                Ok(StreamedAssistantContent::Text(text)) => Some(Ok(text.text)),
                Ok(_) => None,
                Err(err) => Some(Err(anyhow::Error::new(err))),
            }
        });
        Ok(chunks.boxed())
    }
}
