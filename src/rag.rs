//! Recuperación de contexto para una pregunta.
//!
//! Flujo:
//!   1. Embedding de la pregunta.
//!   2. Búsqueda de los `top_k` vecinos en el índice vectorial.
//!   3. Se queda sólo con el más cercano.
//!   4. Resuelve su `path_id` en el árbol; si no existe, el índice está
//!      desactualizado respecto al árbol.
//!
//! Cualquier fallo termina en un `RetrievalMiss`, nunca en un error del servidor.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    error::{ResolveError, RetrievalMiss},
    llm::Embedder,
    models::{format_path, TreeNode},
    tree::TreeStore,
    vector_store::VectorIndex,
};

/// Contexto recuperado para una petición. `subtree` apunta al nodo del árbol
/// compartido, no a una copia.
#[derive(Debug, Clone)]
pub struct RetrievalResult<'a> {
    pub path_id: String,
    pub formatted_path: String,
    pub subtree: &'a TreeNode,
    pub distance: f64,
}

/// Servicio de recuperación: árbol + embeddings + índice vectorial.
pub struct Retriever {
    tree: Arc<TreeStore>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        tree: Arc<TreeStore>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
    ) -> Self {
        Self {
            tree,
            embedder,
            index,
            top_k: top_k.max(1),
        }
    }

    pub fn tree(&self) -> &TreeStore {
        &self.tree
    }

    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult<'_>, RetrievalMiss> {
        let vector = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|err| miss(RetrievalMiss::EmbeddingFailed(format!("{err:#}"))))?;
        if vector.is_empty() {
            return Err(miss(RetrievalMiss::EmptyEmbedding));
        }

        let matches = self
            .index
            .query(&vector, self.top_k)
            .await
            .map_err(|err| miss(RetrievalMiss::SearchFailed(format!("{err:#}"))))?;

        let Some(best) = matches.first() else {
            info!("No se encontró contenido relacionado con la consulta '{query}'.");
            return Err(miss(RetrievalMiss::NoMatches));
        };

        let ranked: Vec<String> = matches
            .iter()
            .map(|m| format!("{} ({:.4}): {}", m.id, m.distance, m.document.replace('\n', " ")))
            .collect();
        info!("¡Acierto en la base de conocimiento! Consulta: '{query}'. Resultados: {ranked:?}");

        let subtree = match self.tree.resolve(&best.id) {
            Ok(node) => node,
            Err(ResolveError::EmptyPath) => {
                return Err(miss(RetrievalMiss::InvalidPath(best.id.clone())));
            }
            Err(cause @ ResolveError::NotFound { .. }) => {
                if let ResolveError::NotFound { segment, depth, .. } = &cause {
                    warn!(
                        path_id = %best.id,
                        segment = %segment,
                        depth = *depth as u64,
                        "Inconsistencia entre índice vectorial y árbol: la ruta no existe. Es necesario reindexar."
                    );
                }
                return Err(RetrievalMiss::StaleIndex {
                    path_id: best.id.clone(),
                    cause,
                });
            }
        };

        info!("Ruta más relevante: {}", best.id);
        Ok(RetrievalResult {
            path_id: best.id.clone(),
            formatted_path: format_path(&best.id),
            subtree,
            distance: best.distance,
        })
    }
}

fn miss(reason: RetrievalMiss) -> RetrievalMiss {
    warn!("No se pudo recuperar contexto: {reason}");
    reason
}
