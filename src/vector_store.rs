//! Índice vectorial de las entradas del árbol.
//!
//! API pública:
//!   - trait `VectorIndex` (`upsert`, `query`).
//!   - `InMemoryVectorIndex`, búsqueda exacta por coseno en memoria.
//!
//! La implementación sobre Neo4j vive en `neo4j_client`.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::models::{EmbeddedEntry, VectorMatch};

/// Búsqueda de vecinos más cercanos indexada por identificador de ruta.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserta o reemplaza cada entrada usando `path_id` como clave.
    /// Devuelve el número de entradas escritas.
    async fn upsert(&self, entries: &[EmbeddedEntry]) -> Result<usize>;

    /// Devuelve hasta `top_k` resultados ordenados de menor a mayor distancia.
    async fn query(&self, vector: &[f64], top_k: usize) -> Result<Vec<VectorMatch>>;
}

#[derive(Debug, Clone)]
struct StoredEntry {
    document: String,
    embedding: Vec<f64>,
}

/// Índice en memoria; pensado para pruebas y para `VECTOR_STORE=memory`.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<BTreeMap<String, StoredEntry>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    // Un pánico con el lock tomado no deja el mapa a medias: cada upsert
    // inserta entradas completas.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, entries: &[EmbeddedEntry]) -> Result<usize> {
        let mut store = self.write();
        for embedded in entries {
            store.insert(
                embedded.entry.path_id.clone(),
                StoredEntry {
                    document: embedded.entry.document.clone(),
                    embedding: embedded.embedding.clone(),
                },
            );
        }
        debug!("Upsert en memoria: {} entradas, {} en total", entries.len(), store.len());
        Ok(entries.len())
    }

    async fn query(&self, vector: &[f64], top_k: usize) -> Result<Vec<VectorMatch>> {
        let store = self.read();

        let mut matches: Vec<VectorMatch> = store
            .iter()
            .map(|(id, stored)| VectorMatch {
                id: id.clone(),
                distance: cosine_distance(vector, &stored.embedding),
                document: stored.document.clone(),
            })
            .collect();

        // BTreeMap ya itera por id, así que el sort estable desempata por id.
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(top_k);
        Ok(matches)
    }
}

/// `1 - similitud coseno`. Vectores nulos o de distinta dimensión quedan a distancia máxima.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 2.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexEntry;

    fn embedded(path_id: &str, embedding: Vec<f64>) -> EmbeddedEntry {
        EmbeddedEntry {
            entry: IndexEntry {
                path_id: path_id.to_string(),
                name: path_id.rsplit('>').next().unwrap_or(path_id).to_string(),
                document: path_id.to_string(),
            },
            embedding,
        }
    }

    #[test]
    fn cosine_distance_basics() {
        assert!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-12);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-12);
        assert_eq!(cosine_distance(&[1.0], &[1.0, 0.0]), 2.0);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 2.0);
    }

    #[tokio::test]
    async fn query_ranks_by_distance_and_truncates() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(&[
                embedded("A", vec![1.0, 0.0]),
                embedded("B", vec![0.0, 1.0]),
                embedded("C", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let matches = index.query(&[1.0, 0.1], 2).await.unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);
        assert!(matches[0].distance <= matches[1].distance);
    }

    #[tokio::test]
    async fn upsert_replaces_by_path_id() {
        let index = InMemoryVectorIndex::new();
        index.upsert(&[embedded("A>B", vec![1.0, 0.0])]).await.unwrap();
        index.upsert(&[embedded("A>B", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(index.len(), 1);

        let matches = index.query(&[0.0, 1.0], 5).await.unwrap();
        assert!(matches[0].distance.abs() < 1e-12);
    }

    #[tokio::test]
    async fn poisoned_lock_still_serves_every_operation() {
        let index = std::sync::Arc::new(InMemoryVectorIndex::new());
        index.upsert(&[embedded("A", vec![1.0, 0.0])]).await.unwrap();

        let writer = index.clone();
        let _ = std::thread::spawn(move || {
            let _guard = writer.entries.write().unwrap();
            panic!("pánico con el lock de escritura tomado");
        })
        .join();
        assert!(index.entries.is_poisoned());

        assert_eq!(index.len(), 1);
        assert_eq!(index.ids(), vec!["A"]);
        assert_eq!(index.query(&[1.0, 0.0], 3).await.unwrap().len(), 1);
        assert_eq!(index.upsert(&[embedded("B", vec![0.0, 1.0])]).await.unwrap(), 1);
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn empty_index_returns_no_matches() {
        let index = InMemoryVectorIndex::new();
        assert!(index.is_empty());
        assert!(index.query(&[1.0], 3).await.unwrap().is_empty());
    }
}
