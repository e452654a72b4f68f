#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use json_tree_rag::{
    api,
    app_state::AppState,
    config::{AppConfig, VectorBackend},
    llm::{CompletionBackend, CompletionRequest, Embedder, TextStream},
    models::TreeNode,
    prompt::PromptTemplate,
    rag::Retriever,
    tree::TreeStore,
    vector_store::VectorIndex,
};

/// Vector fijo según la primera palabra clave que aparezca en el texto.
pub struct KeywordEmbedder {
    pub rules: Vec<(&'static str, Vec<f64>)>,
    pub fallback: Vec<f64>,
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        Ok(texts
            .iter()
            .map(|text| {
                self.rules
                    .iter()
                    .find(|(keyword, _)| text.contains(keyword))
                    .map(|(_, vector)| vector.clone())
                    .unwrap_or_else(|| self.fallback.clone())
            })
            .collect())
    }
}

/// Devuelve siempre la misma lista de vectores, sin mirar cuántos textos recibe.
pub struct ScriptedEmbedder(pub Vec<Vec<f64>>);

#[async_trait]
impl Embedder for ScriptedEmbedder {
    async fn embed_batch(&self, _texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        Ok(self.0.clone())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_batch(&self, _texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        Err(anyhow!("embedding service unavailable"))
    }
}

/// Backend de completado que registra las peticiones y reproduce un guion.
#[derive(Default)]
pub struct RecordingCompletion {
    pub chunks: Vec<&'static str>,
    pub fail_after_chunks: Option<&'static str>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl RecordingCompletion {
    pub fn with_chunks(chunks: Vec<&'static str>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for RecordingCompletion {
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream> {
        self.requests.lock().unwrap().push(request);
        let mut items: Vec<Result<String>> = self.chunks.iter().map(|c| Ok(c.to_string())).collect();
        if let Some(msg) = self.fail_after_chunks {
            items.push(Err(anyhow!(msg)));
        }
        Ok(stream::iter(items).boxed())
    }
}

pub fn engine_tree() -> TreeStore {
    let roots: Vec<TreeNode> = serde_json::from_str(
        r#"[{"name":"Engine","child":[{"name":"Won't Start","desc":"Check battery"}]}]"#,
    )
    .unwrap();
    TreeStore::from_nodes(roots)
}

/// Embedder del escenario del motor: la consulta sobre arranque cae junto a
/// "Won't Start", el resto junto a "Engine".
pub fn engine_embedder() -> KeywordEmbedder {
    KeywordEmbedder {
        rules: vec![
            ("Won't Start", vec![1.0, 0.0]),
            ("arranca", vec![0.95, 0.05]),
        ],
        fallback: vec![0.0, 1.0],
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        server_addr: "127.0.0.1:0".to_string(),
        knowledge_base_file: PathBuf::from("unused.json"),
        vector_backend: VectorBackend::Memory,
        neo4j: None,
        embedding_model: "test-embedding".to_string(),
        embedding_dimensions: 2,
        llm_api_base_url: "http://localhost:1/v1".to_string(),
        llm_api_key: "dummy-key".to_string(),
        llm_model: "default-model".to_string(),
        llm_temperature: 0.7,
        llm_max_tokens: 256,
        llm_enable_thinking: None,
        top_k: 3,
        prompt_template_file: None,
        index_on_startup: false,
    }
}

pub fn app_state(
    tree: TreeStore,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    completion: Arc<dyn CompletionBackend>,
) -> AppState {
    let config = test_config();
    let retriever = Retriever::new(Arc::new(tree), embedder, index, config.top_k);
    AppState::new(config, retriever, completion, PromptTemplate::default())
}

/// Levanta el router en un puerto efímero y devuelve la URL base.
pub async fn spawn_app(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api::create_router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

/// Contenido de cada línea `data:` del cuerpo SSE.
pub fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim_start().to_string())
        .collect()
}
