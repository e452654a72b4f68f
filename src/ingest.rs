//! Indexación del árbol de conocimiento en el índice vectorial.
//!
//! Flujo:
//!   1. `flatten` del árbol en entradas (path_id, name, document).
//!   2. Embeddings de todos los documentos en una sola llamada.
//!   3. Emparejado por posición con los vectores devueltos; las entradas sin
//!      vector válido se descartan.
//!   4. Upsert por `path_id`. Si no queda ninguna entrada no se escribe nada.

use tracing::{error, info, warn};

use crate::{
    error::IndexError,
    llm::Embedder,
    models::{EmbeddedEntry, IndexEntry},
    tree::TreeStore,
    vector_store::VectorIndex,
};

/// Resumen de una ejecución del indexador.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub nodes: usize,
    pub embedded: usize,
    pub dropped: usize,
    pub written: usize,
}

impl std::fmt::Display for IndexReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} nodos, {} vectores recibidos, {} descartados, {} entradas escritas.",
            self.nodes, self.embedded, self.dropped, self.written
        )
    }
}

/// Un vector es válido si no está vacío y todos sus valores son finitos.
fn is_valid_vector(vector: &[f64]) -> bool {
    !vector.is_empty() && vector.iter().all(|v| v.is_finite())
}

/// Empareja entradas y vectores posición a posición. Si las longitudes no
/// coinciden sólo se emparejan las posiciones comunes; el resto se descarta.
pub fn pair_embeddings(entries: Vec<IndexEntry>, vectors: Vec<Vec<f64>>) -> (Vec<EmbeddedEntry>, usize) {
    let total = entries.len();
    if vectors.len() != total {
        warn!(
            "El número de embeddings ({}) no coincide con el de documentos ({}); se emparejan por posición.",
            vectors.len(),
            total
        );
    }

    let paired: Vec<EmbeddedEntry> = entries
        .into_iter()
        .zip(vectors)
        .filter(|(_, vector)| is_valid_vector(vector))
        .map(|(entry, embedding)| EmbeddedEntry { entry, embedding })
        .collect();

    let dropped = total - paired.len();
    if dropped > 0 {
        warn!("Entradas descartadas por vector inválido o ausente: {dropped}");
    }
    (paired, dropped)
}

/// Recorre el árbol, calcula los embeddings y los escribe en el índice.
pub async fn index_tree(
    tree: &TreeStore,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<IndexReport, IndexError> {
    let entries = tree.flatten();
    info!("Datos preparados: {} nodos a indexar.", entries.len());

    if entries.is_empty() {
        warn!("No se encontraron nodos indexables; no se escribe nada.");
        return Err(IndexError::NothingToIndex);
    }

    let nodes = entries.len();
    let documents: Vec<String> = entries.iter().map(|e| e.document.clone()).collect();
    let vectors = embedder.embed_batch(documents).await.map_err(|err| {
        error!("No se pudieron generar los embeddings: {err:#}");
        IndexError::Embedding(err)
    })?;
    let embedded = vectors.len();

    let (batch, dropped) = pair_embeddings(entries, vectors);
    if batch.is_empty() {
        error!("Todos los vectores son inválidos; no se escribe en el índice.");
        return Err(IndexError::NoValidEmbeddings { documents: nodes });
    }

    let written = index.upsert(&batch).await.map_err(|err| {
        error!("Error escribiendo en el índice vectorial: {err:#}");
        IndexError::Store(err)
    })?;

    let report = IndexReport {
        nodes,
        embedded,
        dropped,
        written,
    };
    info!("¡Indexación completada! {report}");
    Ok(report)
}
