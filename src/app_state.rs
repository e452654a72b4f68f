use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::info;

use crate::{
    config::{AppConfig, VectorBackend},
    ingest,
    llm::{CompletionBackend, Embedder, RigChatBackend, RigEmbedder},
    neo4j_client::Neo4jVectorIndex,
    prompt::PromptTemplate,
    rag::Retriever,
    tree::TreeStore,
    vector_store::{InMemoryVectorIndex, VectorIndex},
};

/// Servicios compartidos por todas las peticiones. Se construyen una vez al
/// arrancar y sólo se leen; para "reiniciarlos" se construye un estado nuevo.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub retriever: Arc<Retriever>,
    pub completion: Arc<dyn CompletionBackend>,
    pub prompt: Arc<PromptTemplate>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        retriever: Retriever,
        completion: Arc<dyn CompletionBackend>,
        prompt: PromptTemplate,
    ) -> Self {
        Self {
            config,
            retriever: Arc::new(retriever),
            completion,
            prompt: Arc::new(prompt),
        }
    }

    /// Conecta con los servicios reales según la configuración.
    pub async fn build(config: AppConfig) -> Result<Self> {
        let tree = Arc::new(TreeStore::load(&config.knowledge_base_file)?);
        let embedder: Arc<dyn Embedder> = Arc::new(RigEmbedder::from_config(&config)?);
        let index = connect_vector_index(&config).await?;

        if config.index_on_startup {
            info!("Indexando la base de conocimiento antes de aceptar peticiones...");
            ingest::index_tree(&tree, embedder.as_ref(), index.as_ref()).await?;
        }

        let completion: Arc<dyn CompletionBackend> = Arc::new(RigChatBackend::from_config(&config));
        let prompt = match &config.prompt_template_file {
            Some(path) => PromptTemplate::from_file(path)?,
            None => PromptTemplate::default(),
        };

        let retriever = Retriever::new(tree, embedder, index, config.top_k);
        Ok(Self::new(config, retriever, completion, prompt))
    }
}

/// Abre el índice vectorial configurado.
pub async fn connect_vector_index(config: &AppConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.vector_backend {
        VectorBackend::Neo4j => {
            let neo4j = config
                .neo4j
                .as_ref()
                .ok_or_else(|| anyhow!("Falta la configuración de Neo4j"))?;
            let index = Neo4jVectorIndex::connect(neo4j, config.embedding_dimensions).await?;
            Ok(Arc::new(index))
        }
        VectorBackend::Memory => {
            info!("Usando índice vectorial en memoria (no persistente).");
            Ok(Arc::new(InMemoryVectorIndex::new()))
        }
    }
}
